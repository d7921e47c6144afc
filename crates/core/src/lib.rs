pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::answer::{Answer, Citation, Provided};
pub use domain::dispatch::{AttemptLog, AttemptOutcome, DispatchAttempt};
pub use domain::intent::{ClassificationResult, Intent, ProviderId, ScoredIntent};
pub use domain::query::{CustomerRef, Query, QueryId, QueryRequest};
pub use domain::session::{Session, SessionContext, SessionError, SessionId, Turn};
pub use errors::{
    DispatchError, FailureCause, FailureReport, NormalizeError, OrchestrationFailed,
    ProviderFailure, QueryError, Stage,
};
pub use lifecycle::{QueryEvent, QueryLifecycle, QueryState};
