use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::ProviderId;
use crate::domain::query::QueryId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    ProviderError { message: String },
    Rejected { reason: String },
}

impl AttemptOutcome {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::ProviderError { .. } => "provider_error",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One call to one provider on behalf of one query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub query_id: QueryId,
    pub provider_id: ProviderId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl DispatchAttempt {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Append-only attempt log for a single query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptLog {
    attempts: Vec<DispatchAttempt>,
}

impl AttemptLog {
    pub fn record(&mut self, attempt: DispatchAttempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[DispatchAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn into_vec(self) -> Vec<DispatchAttempt> {
        self.attempts
    }
}
