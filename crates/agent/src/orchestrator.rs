//! Top-level query handling: classify, dispatch, normalize, record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use telroute_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use telroute_core::config::{AppConfig, ClassifierKind};
use telroute_core::domain::answer::Answer;
use telroute_core::domain::dispatch::DispatchAttempt;
use telroute_core::domain::intent::ClassificationResult;
use telroute_core::domain::query::{Query, QueryId, QueryRequest};
use telroute_core::domain::session::{SessionId, Turn};
use telroute_core::errors::{FailureCause, OrchestrationFailed, Stage};
use telroute_core::lifecycle::{LifecycleError, QueryEvent, QueryLifecycle, QueryState};
use telroute_db::repositories::{CustomerDirectory, SessionRepository};

use crate::classifier::{IntentClassifier, IntentModel, KeywordIntentModel, LlmIntentModel};
use crate::llm::LlmClient;
use crate::normalizer::normalize;
use crate::providers::ProviderRegistry;
use crate::router::{Router, RoutingPolicy};
use crate::session::SessionManager;

const ACTOR: &str = "orchestrator";

#[derive(Clone, Debug, PartialEq)]
pub struct HandledQuery {
    pub query_id: QueryId,
    pub session_id: SessionId,
    pub answer: Answer,
    pub classification: ClassificationResult,
    pub attempts: Vec<DispatchAttempt>,
}

pub struct Orchestrator {
    classifier: IntentClassifier,
    router: Router,
    sessions: Arc<SessionManager>,
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        router: Router,
        sessions: Arc<SessionManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { classifier, router, sessions, audit }
    }

    /// Wires the configured classifier, routing policy and session store together.
    /// `llm` is required only when the config selects the LLM classifier.
    pub fn from_config(
        config: &AppConfig,
        registry: ProviderRegistry,
        repository: Arc<dyn SessionRepository>,
        directory: Option<Arc<dyn CustomerDirectory>>,
        llm: Option<Arc<dyn LlmClient>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let model: Arc<dyn IntentModel> = match (config.routing.classifier, llm) {
            (ClassifierKind::Llm, Some(client)) => Arc::new(LlmIntentModel::new(client)),
            (ClassifierKind::Llm, None) => {
                warn!(
                    event_name = "orchestrator.classifier_fallback",
                    "llm classifier requested without an llm client, using keywords"
                );
                Arc::new(KeywordIntentModel::default())
            }
            (ClassifierKind::Keyword, _) => Arc::new(KeywordIntentModel::default()),
        };

        let router = Router::new(RoutingPolicy::from_config(config), registry);
        let router = match directory {
            Some(directory) => router.with_directory(directory),
            None => router,
        };

        Self::new(
            IntentClassifier::new(model, config.timeouts.classifier()),
            router,
            Arc::new(SessionManager::from_config(repository, &config.session)),
            audit,
        )
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub async fn handle(&self, request: QueryRequest) -> Result<Answer, OrchestrationFailed> {
        let correlation_id = Uuid::new_v4().to_string();
        self.handle_detailed(request, &correlation_id).await.map(|handled| handled.answer)
    }

    pub async fn handle_detailed(
        &self,
        request: QueryRequest,
        correlation_id: &str,
    ) -> Result<HandledQuery, OrchestrationFailed> {
        let mut query = Query::from_request(request, None);
        let audit = AuditContext::new(
            query.session_id.0.clone(),
            Some(query.id.0.clone()),
            correlation_id,
            ACTOR,
        );
        let mut lifecycle = QueryLifecycle::new();

        info!(
            event_name = "query.received",
            correlation_id,
            session_id = %query.session_id,
            query_id = %query.id.0,
            "query received"
        );

        if let Err(error) = query.validate() {
            return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Received, error.into()));
        }

        let mut session = match self.sessions.acquire(&query.session_id).await {
            Ok(session) => session,
            Err(error) => {
                let cause = FailureCause::Store(error.to_string());
                return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Received, cause));
            }
        };

        if !session.context().is_empty() {
            query.context = Some(session.context().clone());
        }
        if let Some(last) = session.turns().last() {
            query.submitted_at = query.submitted_at.max(last.query.submitted_at);
        }

        self.advance(&mut lifecycle, &audit, &query, QueryEvent::Accepted)?;
        let classification = match self.classifier.classify(&query).await {
            Ok(classification) => classification,
            Err(error) => {
                return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Classifying, error.into()))
            }
        };
        self.audit.emit(
            audit
                .event("classifier.classified", AuditCategory::Classification, AuditOutcome::Success)
                .with_metadata("intent", classification.intent.as_key())
                .with_metadata("confidence", format!("{:.3}", classification.confidence)),
        );

        self.advance(&mut lifecycle, &audit, &query, QueryEvent::Classified)?;
        let dispatched = self.router.dispatch(&classification, &query).await;
        let attempts = match &dispatched {
            Ok(outcome) => outcome.attempts.as_slice(),
            Err(error) => error.attempts(),
        };
        self.audit_attempts(&audit, attempts);
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(error) => {
                return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Dispatching, error.into()))
            }
        };

        self.advance(&mut lifecycle, &audit, &query, QueryEvent::ProviderAnswered)?;
        let answer = match normalize(&outcome.provider_id, &outcome.output) {
            Ok(answer) => answer.with_fallback_confidence(outcome.score),
            Err(error) => {
                self.audit.emit(
                    audit
                        .event(
                            "normalizer.malformed_output",
                            AuditCategory::Normalization,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("provider_id", outcome.provider_id.as_str())
                        .with_metadata("shape", outcome.output.shape()),
                );
                return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Normalizing, error.into()));
            }
        };

        let turn = Turn {
            query: query.clone(),
            intent: classification.intent,
            answer: answer.clone(),
            answered_at: Utc::now(),
        };
        if let Err(cause) = self.sessions.commit(&mut session, turn).await {
            return Err(self.fail(&mut lifecycle, &audit, &query, Stage::Recording, cause));
        }
        self.audit.emit(
            audit
                .event("session.turn_recorded", AuditCategory::Session, AuditOutcome::Success)
                .with_metadata("turns", session.turn_count().to_string()),
        );
        drop(session);

        self.advance(&mut lifecycle, &audit, &query, QueryEvent::Normalized)?;
        info!(
            event_name = "query.answered",
            correlation_id,
            session_id = %query.session_id,
            query_id = %query.id.0,
            intent = %classification.intent,
            provider_id = %answer.source_provider,
            attempts = outcome.attempts.len(),
            "query answered"
        );

        Ok(HandledQuery {
            query_id: query.id,
            session_id: query.session_id,
            answer,
            classification,
            attempts: outcome.attempts,
        })
    }

    fn advance(
        &self,
        lifecycle: &mut QueryLifecycle,
        audit: &AuditContext,
        query: &Query,
        event: QueryEvent,
    ) -> Result<QueryState, OrchestrationFailed> {
        lifecycle.apply_with_audit(event, self.audit.as_ref(), audit).map_err(|error| {
            let stage = lifecycle.state().stage().unwrap_or(Stage::Recording);
            lifecycle_failure(stage, error, query)
        })
    }

    fn fail(
        &self,
        lifecycle: &mut QueryLifecycle,
        audit: &AuditContext,
        query: &Query,
        stage: Stage,
        cause: FailureCause,
    ) -> OrchestrationFailed {
        let reason = cause.kind().to_string();
        if let Err(error) = lifecycle.apply_with_audit(
            QueryEvent::StageFailed { reason },
            self.audit.as_ref(),
            audit,
        ) {
            warn!(
                event_name = "lifecycle.failure_not_recorded",
                query_id = %query.id.0,
                error = %error,
                "query failed from a terminal state"
            );
        }

        warn!(
            event_name = "query.failed",
            correlation_id = %audit.correlation_id,
            session_id = %query.session_id,
            query_id = %query.id.0,
            stage = %stage,
            error_class = cause.kind(),
            error = %cause,
            "query failed"
        );
        OrchestrationFailed::new(stage, cause, Some(query.id.clone()))
    }

    fn audit_attempts(&self, audit: &AuditContext, attempts: &[DispatchAttempt]) {
        for attempt in attempts {
            let outcome =
                if attempt.outcome.is_success() { AuditOutcome::Success } else { AuditOutcome::Failed };
            self.audit.emit(
                audit
                    .event("dispatch.attempt_finished", AuditCategory::Dispatch, outcome)
                    .with_metadata("provider_id", attempt.provider_id.as_str())
                    .with_metadata("outcome", attempt.outcome.as_key())
                    .with_metadata("elapsed_ms", attempt.elapsed_ms().to_string()),
            );
        }
    }
}

fn lifecycle_failure(stage: Stage, error: LifecycleError, query: &Query) -> OrchestrationFailed {
    OrchestrationFailed::new(stage, FailureCause::Lifecycle(error.to_string()), Some(query.id.clone()))
}
