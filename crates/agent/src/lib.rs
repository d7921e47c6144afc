//! Query orchestration for telecom customer support.
//!
//! A query flows through four stages:
//! 1. **Classification** (`classifier`) - text plus session context to a ranked intent
//! 2. **Dispatch** (`router`) - ranked intent to one provider at a time, with timeouts and fallback
//! 3. **Normalization** (`normalizer`) - native provider output to the canonical `Answer`
//! 4. **Recording** (`session`) - the answered turn is appended to its session
//!
//! `Orchestrator` composes the stages and owns the per-query lifecycle.

pub mod bootstrap;
pub mod classifier;
pub mod llm;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod router;
pub mod session;
pub mod telemetry;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use classifier::{IntentClassifier, IntentModel, KeywordIntentModel, LlmIntentModel};
pub use orchestrator::{HandledQuery, Orchestrator};
pub use providers::{CapabilityProvider, ProviderOutput, ProviderRegistry, ProviderRequest};
pub use router::{Router, RoutingPolicy};
pub use session::SessionManager;
pub use telemetry::TracingAuditSink;
