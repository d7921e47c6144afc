use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::dispatch::DispatchAttempt;
use crate::domain::intent::ProviderId;
use crate::domain::query::QueryId;
use crate::domain::session::SessionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Failure reported by a capability provider itself. Timeouts are imposed by the
/// router and recorded on the attempt, never raised by providers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("provider error: {0}")]
    Unavailable(String),
    #[error("provider rejected the query: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed output from provider `{provider_id}`: {reason}")]
    MalformedProviderOutput { provider_id: ProviderId, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("all {} candidate providers failed", attempts.len())]
    AllProvidersFailed { attempts: Vec<DispatchAttempt> },
}

impl DispatchError {
    pub fn attempts(&self) -> &[DispatchAttempt] {
        match self {
            Self::AllProvidersFailed { attempts } => attempts,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Classifying,
    Dispatching,
    Normalizing,
    Recording,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Classifying => "classifying",
            Self::Dispatching => "dispatching",
            Self::Normalizing => "normalizing",
            Self::Recording => "recording",
        })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FailureCause {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("session store failure: {0}")]
    Store(String),
    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(String),
}

impl FailureCause {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query(QueryError::InvalidQuery(_)) => "invalid_query",
            Self::Dispatch(DispatchError::AllProvidersFailed { .. }) => "all_providers_failed",
            Self::Normalize(NormalizeError::MalformedProviderOutput { .. }) => {
                "malformed_provider_output"
            }
            Self::Session(_) => "session_invariant",
            Self::Store(_) => "session_store",
            Self::Lifecycle(_) => "lifecycle",
        }
    }
}

/// Terminal failure of one query, always naming the stage that failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("orchestration failed during {stage}: {cause}")]
pub struct OrchestrationFailed {
    pub stage: Stage,
    pub cause: FailureCause,
    pub query_id: Option<QueryId>,
}

impl OrchestrationFailed {
    pub fn new(stage: Stage, cause: impl Into<FailureCause>, query_id: Option<QueryId>) -> Self {
        Self { stage, cause: cause.into(), query_id }
    }

    pub fn attempts(&self) -> &[DispatchAttempt] {
        match &self.cause {
            FailureCause::Dispatch(error) => error.attempts(),
            _ => &[],
        }
    }

    pub fn user_message(&self) -> &'static str {
        match &self.cause {
            FailureCause::Query(_) => "Please type a question so we can help you.",
            FailureCause::Dispatch(_) => {
                "Our support assistants are unavailable right now. Please try again in a few minutes."
            }
            FailureCause::Normalize(_) => {
                "We received an unexpected reply while preparing your answer. Please try again."
            }
            FailureCause::Session(_) | FailureCause::Store(_) | FailureCause::Lifecycle(_) => {
                "Something went wrong on our side. Please try again."
            }
        }
    }

    pub fn report(&self, correlation_id: impl Into<String>) -> FailureReport {
        FailureReport {
            stage: self.stage,
            error_class: self.cause.kind().to_owned(),
            cause: self.cause.to_string(),
            user_message: self.user_message().to_owned(),
            correlation_id: correlation_id.into(),
            query_id: self.query_id.clone(),
            attempts: self.attempts().to_vec(),
        }
    }
}

/// Transport-safe rendering of [`OrchestrationFailed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub stage: Stage,
    pub error_class: String,
    pub cause: String,
    pub user_message: String,
    pub correlation_id: String,
    pub query_id: Option<QueryId>,
    pub attempts: Vec<DispatchAttempt>,
}
