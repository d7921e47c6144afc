use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::lifecycle::states::{QueryEvent, QueryState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: QueryState, event: QueryEvent },
}

pub fn transition(
    current: QueryState,
    event: &QueryEvent,
) -> Result<TransitionOutcome, LifecycleError> {
    use QueryEvent::{Accepted, Classified, Normalized, ProviderAnswered, StageFailed};
    use QueryState::{Answered, Classifying, Dispatching, Failed, Normalizing, Received};

    let to = match (current, event) {
        (Received, Accepted) => Classifying,
        (Classifying, Classified) => Dispatching,
        (Dispatching, ProviderAnswered) => Normalizing,
        (Normalizing, Normalized) => Answered,
        (state, StageFailed { .. }) if !state.is_terminal() => Failed,
        _ => {
            return Err(LifecycleError::InvalidTransition { state: current, event: event.clone() });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone() })
}

/// Tracks one query through `Received -> ... -> Answered | Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryLifecycle {
    state: QueryState,
    history: Vec<TransitionOutcome>,
}

impl Default for QueryLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryLifecycle {
    pub fn new() -> Self {
        Self { state: QueryState::Received, history: Vec::new() }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn history(&self) -> &[TransitionOutcome] {
        &self.history
    }

    pub fn apply(&mut self, event: QueryEvent) -> Result<QueryState, LifecycleError> {
        let outcome = transition(self.state, &event)?;
        self.state = outcome.to;
        self.history.push(outcome);
        Ok(self.state)
    }

    pub fn apply_with_audit<S>(
        &mut self,
        event: QueryEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<QueryState, LifecycleError>
    where
        S: AuditSink + ?Sized,
    {
        let from = self.state;
        match transition(from, &event) {
            Ok(outcome) => {
                let mut audit_event = audit
                    .event(
                        "lifecycle.transition_applied",
                        AuditCategory::Lifecycle,
                        if outcome.to == QueryState::Failed {
                            AuditOutcome::Failed
                        } else {
                            AuditOutcome::Success
                        },
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to));
                if let QueryEvent::StageFailed { reason } = &outcome.event {
                    audit_event = audit_event.with_metadata("reason", reason.clone());
                }
                sink.emit(audit_event);
                self.state = outcome.to;
                self.history.push(outcome);
                Ok(self.state)
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event(
                            "lifecycle.transition_rejected",
                            AuditCategory::Lifecycle,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::lifecycle::engine::{transition, LifecycleError, QueryLifecycle};
    use crate::lifecycle::states::{QueryEvent, QueryState};

    #[test]
    fn happy_path_reaches_answered() {
        let mut lifecycle = QueryLifecycle::new();
        for event in [
            QueryEvent::Accepted,
            QueryEvent::Classified,
            QueryEvent::ProviderAnswered,
            QueryEvent::Normalized,
        ] {
            lifecycle.apply(event).expect("valid transition");
        }

        assert_eq!(lifecycle.state(), QueryState::Answered);
        assert_eq!(lifecycle.history().len(), 4);
    }

    #[test]
    fn any_non_terminal_state_can_fail() {
        for state in [
            QueryState::Received,
            QueryState::Classifying,
            QueryState::Dispatching,
            QueryState::Normalizing,
        ] {
            let outcome =
                transition(state, &QueryEvent::StageFailed { reason: "boom".to_owned() })
                    .expect("failure is always allowed before a terminal state");
            assert_eq!(outcome.to, QueryState::Failed);
        }
    }

    #[test]
    fn terminal_states_reject_further_events() {
        let error = transition(QueryState::Answered, &QueryEvent::StageFailed {
            reason: "late".to_owned(),
        })
        .expect_err("answered is terminal");
        assert!(matches!(error, LifecycleError::InvalidTransition { .. }));

        assert!(transition(QueryState::Failed, &QueryEvent::Accepted).is_err());
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let error = transition(QueryState::Received, &QueryEvent::ProviderAnswered)
            .expect_err("cannot answer before classifying");
        assert!(matches!(
            error,
            LifecycleError::InvalidTransition {
                state: QueryState::Received,
                event: QueryEvent::ProviderAnswered
            }
        ));
    }

    #[test]
    fn audited_transitions_emit_one_event_each() {
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new("s1", Some("q-1".to_owned()), "req-7", "orchestrator");
        let mut lifecycle = QueryLifecycle::new();

        lifecycle.apply_with_audit(QueryEvent::Accepted, &sink, &audit).expect("accepted");
        let rejected = lifecycle.apply_with_audit(QueryEvent::Normalized, &sink, &audit);
        assert!(rejected.is_err());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "lifecycle.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("Classifying"));
        assert_eq!(events[1].event_type, "lifecycle.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-7");
        assert_eq!(lifecycle.state(), QueryState::Classifying);
    }
}
