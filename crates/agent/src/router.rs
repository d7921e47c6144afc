use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use telroute_core::config::AppConfig;
use telroute_core::domain::customer::CustomerProfile;
use telroute_core::domain::dispatch::{AttemptLog, AttemptOutcome, DispatchAttempt};
use telroute_core::domain::intent::{ClassificationResult, Intent, ProviderId};
use telroute_core::domain::query::{CustomerRef, Query};
use telroute_core::errors::{DispatchError, ProviderFailure};
use telroute_db::repositories::CustomerDirectory;

use crate::providers::{uses_account_data, ProviderOutput, ProviderRegistry, ProviderRequest};

/// Billing periods loaded into a customer profile.
const USAGE_PERIODS: usize = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingPolicy {
    pub confidence_threshold: f64,
    pub max_alternates: usize,
    pub default_provider: ProviderId,
    pub intent_providers: BTreeMap<Intent, ProviderId>,
    pub provider_timeout: Duration,
}

impl RoutingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.routing.confidence_threshold,
            max_alternates: config.routing.max_alternates,
            default_provider: config.routing.default_provider.clone(),
            intent_providers: config.routing.intent_providers.clone(),
            provider_timeout: config.timeouts.provider(),
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub provider_id: ProviderId,
    pub intent: Intent,
    /// Classifier score for `intent`, 0 when the classifier gave it none.
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    pub provider_id: ProviderId,
    pub intent: Intent,
    /// Score of the candidate that answered.
    pub score: f64,
    pub output: ProviderOutput,
    pub attempts: Vec<DispatchAttempt>,
}

/// Selects providers for a classified query and tries them one at a time.
#[derive(Clone)]
pub struct Router {
    policy: RoutingPolicy,
    registry: ProviderRegistry,
    directory: Option<Arc<dyn CustomerDirectory>>,
}

impl Router {
    pub fn new(policy: RoutingPolicy, registry: ProviderRegistry) -> Self {
        Self { policy, registry, directory: None }
    }

    /// Billing, plan and support requests carry the customer's profile from `directory`.
    pub fn with_directory(mut self, directory: Arc<dyn CustomerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Ordered, duplicate-free candidate list. Confident intents come first (top, then
    /// up to `max_alternates` alternates); the default provider always closes the list.
    pub fn candidates(&self, classification: &ClassificationResult) -> Vec<Candidate> {
        let threshold = self.policy.confidence_threshold;
        let eligible: Vec<Candidate> = classification
            .ranked()
            .into_iter()
            .filter(|scored| scored.intent.is_routable() && scored.score >= threshold)
            .filter_map(|scored| {
                let provider_id = self.policy.intent_providers.get(&scored.intent)?;
                Some(Candidate {
                    provider_id: provider_id.clone(),
                    intent: scored.intent,
                    score: scored.score,
                })
            })
            .collect();

        let mut candidates: Vec<Candidate> = Vec::new();
        if let Some(top) = eligible.first().filter(|first| first.intent == classification.intent) {
            candidates.push(top.clone());
        }
        candidates.extend(
            eligible
                .iter()
                .filter(|candidate| candidate.intent != classification.intent)
                .take(self.policy.max_alternates)
                .cloned(),
        );
        let default_intent = self.default_intent(classification);
        candidates.push(Candidate {
            provider_id: self.policy.default_provider.clone(),
            intent: default_intent,
            score: classification
                .ranked()
                .iter()
                .find(|scored| scored.intent == default_intent)
                .map_or(0.0, |scored| scored.score),
        });

        let mut seen = Vec::new();
        candidates.retain(|candidate| {
            if seen.contains(&candidate.provider_id) {
                false
            } else {
                seen.push(candidate.provider_id.clone());
                true
            }
        });
        candidates
    }

    fn default_intent(&self, classification: &ClassificationResult) -> Intent {
        self.policy
            .intent_providers
            .iter()
            .find(|(_, provider_id)| **provider_id == self.policy.default_provider)
            .map(|(intent, _)| *intent)
            .unwrap_or(if classification.intent.is_routable() {
                classification.intent
            } else {
                Intent::TechnicalSupport
            })
    }

    /// Tries candidates sequentially, each bounded by the provider timeout. A timed-out
    /// call is dropped, which cancels it, and the next candidate starts immediately.
    pub async fn dispatch(
        &self,
        classification: &ClassificationResult,
        query: &Query,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut log = AttemptLog::default();
        let candidates = self.candidates(classification);
        let profile = if candidates.iter().any(|candidate| uses_account_data(candidate.intent)) {
            self.customer_profile(query).await
        } else {
            None
        };

        for candidate in candidates {
            let started_at = Utc::now();
            let Some(provider) = self.registry.get(&candidate.provider_id) else {
                warn!(
                    event_name = "dispatch.provider_missing",
                    query_id = %query.id.0,
                    provider_id = %candidate.provider_id,
                    "no provider registered under this id"
                );
                log.record(DispatchAttempt {
                    query_id: query.id.clone(),
                    provider_id: candidate.provider_id,
                    started_at,
                    finished_at: Utc::now(),
                    outcome: AttemptOutcome::Rejected {
                        reason: "provider is not registered".to_string(),
                    },
                });
                continue;
            };

            let mut request = ProviderRequest::from_query(query, candidate.intent);
            if uses_account_data(candidate.intent) {
                request.profile = profile.clone();
            }
            let result =
                tokio::time::timeout(self.policy.provider_timeout, provider.answer(&request)).await;
            let finished_at = Utc::now();

            let (outcome, output) = match result {
                Ok(Ok(output)) => (AttemptOutcome::Success, Some(output)),
                Ok(Err(ProviderFailure::Unavailable(message))) => {
                    (AttemptOutcome::ProviderError { message }, None)
                }
                Ok(Err(ProviderFailure::Rejected(reason))) => {
                    (AttemptOutcome::Rejected { reason }, None)
                }
                Err(_) => (AttemptOutcome::Timeout, None),
            };

            let attempt = DispatchAttempt {
                query_id: query.id.clone(),
                provider_id: candidate.provider_id.clone(),
                started_at,
                finished_at,
                outcome,
            };
            info!(
                event_name = "dispatch.attempt_finished",
                query_id = %query.id.0,
                provider_id = %attempt.provider_id,
                intent = %candidate.intent,
                outcome = attempt.outcome.as_key(),
                elapsed_ms = attempt.elapsed_ms(),
                attempt = log.len() + 1,
                "provider attempt finished"
            );
            log.record(attempt);

            if let Some(output) = output {
                return Ok(DispatchOutcome {
                    provider_id: candidate.provider_id,
                    intent: candidate.intent,
                    score: candidate.score,
                    output,
                    attempts: log.into_vec(),
                });
            }
        }

        warn!(
            event_name = "dispatch.exhausted",
            query_id = %query.id.0,
            attempts = log.len(),
            "every candidate provider failed"
        );
        Err(DispatchError::AllProvidersFailed { attempts: log.into_vec() })
    }

    /// Loads the asker's profile once per query, bounded by the provider timeout.
    /// A failed lookup degrades to ungrounded answers.
    async fn customer_profile(&self, query: &Query) -> Option<CustomerProfile> {
        let directory = self.directory.as_ref()?;
        let identifier = query.customer.as_ref().and_then(CustomerRef::identifier);

        let lookup = directory.profile(identifier, USAGE_PERIODS);
        match tokio::time::timeout(self.policy.provider_timeout, lookup).await {
            Ok(Ok(profile)) => {
                debug!(
                    event_name = "dispatch.profile_loaded",
                    query_id = %query.id.0,
                    known_customer = profile.customer.is_some(),
                    usage_periods = profile.usage.len(),
                    plans = profile.plans.len(),
                    "customer profile loaded"
                );
                (!profile.is_empty()).then_some(profile)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "dispatch.profile_unavailable",
                    query_id = %query.id.0,
                    error = %error,
                    "customer directory lookup failed"
                );
                None
            }
            Err(_) => {
                warn!(
                    event_name = "dispatch.profile_unavailable",
                    query_id = %query.id.0,
                    error = "timeout",
                    "customer directory lookup timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use telroute_core::domain::customer::{Customer, CustomerId, ServicePlan, UsageRecord};
    use telroute_core::domain::dispatch::AttemptOutcome;
    use telroute_core::domain::intent::{ClassificationResult, Intent, ProviderId};
    use telroute_core::domain::query::{CustomerRef, Query, QueryRequest};
    use telroute_core::errors::{DispatchError, ProviderFailure};
    use telroute_db::repositories::{CustomerDirectory, RepositoryError};

    use super::{Router, RoutingPolicy};
    use crate::providers::{CapabilityProvider, ProviderOutput, ProviderRegistry, ProviderRequest};

    enum Behaviour {
        Answer,
        ReportProfile,
        Sleep(Duration),
        Fail,
        Reject,
    }

    struct FakeProvider {
        id: ProviderId,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn new(id: &str, behaviour: Behaviour) -> Self {
            Self { id: ProviderId::new(id), behaviour, calls: Arc::new(AtomicUsize::new(0)) }
        }
    }

    #[async_trait]
    impl CapabilityProvider for FakeProvider {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        async fn answer(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Answer => Ok(ProviderOutput::plain(format!("answer from {}", self.id))),
                Behaviour::ReportProfile => Ok(ProviderOutput::plain(format!(
                    "profile={}",
                    request.profile.is_some()
                ))),
                Behaviour::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(ProviderOutput::plain("too late"))
                }
                Behaviour::Fail => Err(ProviderFailure::Unavailable("backend down".to_string())),
                Behaviour::Reject => Err(ProviderFailure::Rejected("out of scope".to_string())),
            }
        }
    }

    fn policy() -> RoutingPolicy {
        RoutingPolicy { provider_timeout: Duration::from_millis(50), ..RoutingPolicy::default() }
    }

    fn all_answering() -> ProviderRegistry {
        ProviderRegistry::default()
            .with(FakeProvider::new("billing", Behaviour::Answer))
            .with(FakeProvider::new("network", Behaviour::Answer))
            .with(FakeProvider::new("plan_recommendation", Behaviour::Answer))
            .with(FakeProvider::new("technical_support", Behaviour::Answer))
    }

    fn query(text: &str) -> Query {
        Query::from_request(QueryRequest::new("s1", text), None)
    }

    fn ids(router: &Router, classification: &ClassificationResult) -> Vec<String> {
        router
            .candidates(classification)
            .into_iter()
            .map(|candidate| candidate.provider_id.0)
            .collect()
    }

    #[test]
    fn confident_top_intent_is_tried_first() {
        let router = Router::new(policy(), all_answering());
        let classification = ClassificationResult::single(Intent::Billing, 0.92)
            .with_alternate(Intent::PlanRecommendation, 0.6);

        assert_eq!(
            ids(&router, &classification),
            vec!["billing", "plan_recommendation", "technical_support"]
        );
    }

    #[test]
    fn low_confidence_goes_straight_to_default() {
        let router = Router::new(policy(), all_answering());
        let classification = ClassificationResult::single(Intent::Network, 0.4)
            .with_alternate(Intent::TechnicalSupport, 0.35);

        assert_eq!(ids(&router, &classification), vec!["technical_support"]);
    }

    #[test]
    fn confident_alternates_are_tried_when_top_is_weak() {
        let router = Router::new(policy(), all_answering());
        let classification = ClassificationResult::single(Intent::Network, 0.45)
            .with_alternate(Intent::Billing, 0.55)
            .with_alternate(Intent::PlanRecommendation, 0.5);

        // from_scores would have put billing on top; a hand-built result keeps network.
        assert_eq!(
            ids(&router, &classification),
            vec!["billing", "plan_recommendation", "technical_support"]
        );
    }

    #[test]
    fn alternates_are_capped_and_unknown_is_never_routed() {
        let mut policy = policy();
        policy.max_alternates = 1;
        let router = Router::new(policy, all_answering());
        let classification = ClassificationResult::single(Intent::Unknown, 0.9)
            .with_alternate(Intent::Billing, 0.8)
            .with_alternate(Intent::Network, 0.7);

        assert_eq!(ids(&router, &classification), vec!["billing", "technical_support"]);
    }

    #[test]
    fn shared_providers_are_not_retried() {
        let mut policy = policy();
        policy.intent_providers.insert(Intent::Network, ProviderId::new("technical_support"));
        let router = Router::new(policy, all_answering());
        let classification = ClassificationResult::single(Intent::Network, 0.9);

        assert_eq!(ids(&router, &classification), vec!["technical_support"]);
    }

    #[tokio::test]
    async fn timeout_moves_to_the_next_candidate() {
        let slow = FakeProvider::new("billing", Behaviour::Sleep(Duration::from_secs(5)));
        let slow_calls = Arc::clone(&slow.calls);
        let registry = ProviderRegistry::default()
            .with(slow)
            .with(FakeProvider::new("technical_support", Behaviour::Answer));
        let router = Router::new(policy(), registry);

        let outcome = router
            .dispatch(&ClassificationResult::single(Intent::Billing, 0.92), &query("charged twice"))
            .await
            .expect("fallback answers");

        assert_eq!(outcome.provider_id, ProviderId::new("technical_support"));
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Timeout);
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(slow_calls.load(Ordering::SeqCst), 1);
        assert!(outcome.attempts[0].elapsed_ms() < 1_000);
    }

    #[tokio::test]
    async fn exhausted_candidates_report_every_attempt() {
        let registry = ProviderRegistry::default()
            .with(FakeProvider::new("billing", Behaviour::Fail))
            .with(FakeProvider::new("plan_recommendation", Behaviour::Reject))
            .with(FakeProvider::new("technical_support", Behaviour::Sleep(Duration::from_secs(5))));
        let router = Router::new(policy(), registry);
        let classification = ClassificationResult::single(Intent::Billing, 0.9)
            .with_alternate(Intent::PlanRecommendation, 0.7);

        let error = router
            .dispatch(&classification, &query("bill"))
            .await
            .expect_err("every provider fails");

        let DispatchError::AllProvidersFailed { attempts } = error;
        let candidates = router.candidates(&classification);
        assert_eq!(attempts.len(), candidates.len());
        let outcomes: Vec<&str> = attempts.iter().map(|attempt| attempt.outcome.as_key()).collect();
        assert_eq!(outcomes, vec!["provider_error", "rejected", "timeout"]);
    }

    #[tokio::test]
    async fn unregistered_provider_is_recorded_as_rejected() {
        let registry = ProviderRegistry::default()
            .with(FakeProvider::new("technical_support", Behaviour::Answer));
        let router = Router::new(policy(), registry);

        let outcome = router
            .dispatch(&ClassificationResult::single(Intent::Network, 0.8), &query("no signal"))
            .await
            .expect("default answers");

        assert_eq!(outcome.attempts.len(), 2);
        assert!(matches!(outcome.attempts[0].outcome, AttemptOutcome::Rejected { .. }));
        assert_eq!(outcome.attempts[0].provider_id, ProviderId::new("network"));
    }

    #[test]
    fn candidates_carry_their_classifier_score() {
        let router = Router::new(policy(), all_answering());
        let classification = ClassificationResult::single(Intent::Billing, 0.92)
            .with_alternate(Intent::PlanRecommendation, 0.6);

        let scores: Vec<f64> =
            router.candidates(&classification).iter().map(|candidate| candidate.score).collect();

        assert_eq!(scores, vec![0.92, 0.6, 0.0]);
    }

    struct BrokenDirectory;

    #[async_trait]
    impl CustomerDirectory for BrokenDirectory {
        async fn find_customer(&self, _identifier: &str) -> Result<Option<Customer>, RepositoryError> {
            Err(RepositoryError::Decode("customers table is missing".to_string()))
        }

        async fn service_plans(&self) -> Result<Vec<ServicePlan>, RepositoryError> {
            Err(RepositoryError::Decode("service_plans table is missing".to_string()))
        }

        async fn recent_usage(
            &self,
            _customer_id: &CustomerId,
            _periods: usize,
        ) -> Result<Vec<UsageRecord>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_directory_lookup_still_dispatches() {
        let registry = ProviderRegistry::default()
            .with(FakeProvider::new("billing", Behaviour::ReportProfile))
            .with(FakeProvider::new("technical_support", Behaviour::Answer));
        let router = Router::new(policy(), registry).with_directory(Arc::new(BrokenDirectory));
        let query = Query::from_request(
            QueryRequest::new("s1", "bill").with_customer(CustomerRef::with_email("ana@example.com")),
            None,
        );

        let outcome = router
            .dispatch(&ClassificationResult::single(Intent::Billing, 0.8), &query)
            .await
            .expect("billing answers without account data");

        assert_eq!(outcome.output, ProviderOutput::plain("profile=false"));
        assert_eq!(outcome.score, 0.8);
        assert_eq!(outcome.attempts.len(), 1);
    }
}
