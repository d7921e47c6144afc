use serde::{Deserialize, Serialize};

use crate::errors::Stage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Received,
    Classifying,
    Dispatching,
    Normalizing,
    Answered,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Failed)
    }

    /// The failure stage reported when a query fails while in this state.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Received => Some(Stage::Received),
            Self::Classifying => Some(Stage::Classifying),
            Self::Dispatching => Some(Stage::Dispatching),
            Self::Normalizing => Some(Stage::Normalizing),
            Self::Answered | Self::Failed => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryEvent {
    Accepted,
    Classified,
    ProviderAnswered,
    Normalized,
    StageFailed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: QueryState,
    pub to: QueryState,
    pub event: QueryEvent,
}
