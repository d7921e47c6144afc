use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use telroute_core::domain::answer::Citation;
use telroute_core::domain::intent::{Intent, ProviderId};
use telroute_core::errors::ProviderFailure;

use super::{CapabilityProvider, PlanOption, ProviderOutput, ProviderRequest, Section};
use crate::llm::{extract_json_object, CompletionRequest, LlmClient, LlmError};

const BILLING_SPECIALIST_PROMPT: &str = "You are a telecom billing specialist. You understand \
billing cycles, taxes, discounts, data/voice/SMS usage and pro-rating rules. Investigate the \
customer's question and write a concise technical summary of the most likely reasons for the \
charges, citing the account data you were given. If no account data is available, say which \
records you would need. This summary is internal and not shown to the customer.";

const BILLING_ADVISOR_PROMPT: &str = "You are a customer service advisor. Turn the billing \
specialist's findings into a clear, friendly explanation: answer the question directly, explain \
the main reasons for the charges, mention one-time fees, extra usage or discounts if present, \
and suggest at most two plan changes or tips.";

const NETWORK_DIAGNOSTICS_PROMPT: &str = "You are a telecom network diagnostics specialist. \
Analyse issues such as slow internet, no signal, call drops, VoLTE or 5G problems and SIM \
registration failures. Identify possible root causes, whether the issue is device or area \
related, and which parameters to check (signal strength, APN, VoLTE toggle). Write a technical \
summary that is not customer facing.";

const NETWORK_RESOLUTION_PROMPT: &str = "You are a telecom network resolution specialist. \
Convert the technical diagnostics into a friendly explanation with 3 to 5 clear steps the \
customer can follow, the likely root cause, and optional tips to prevent it.";

const PLAN_PROMPT: &str = "You are a telecom plan optimisation expert. Recommend 1 to 3 plans or \
add-on packs for the customer's request, considering cost savings, usage and whether the \
current plan is already ideal. Only recommend plans listed in the available plans when a \
catalogue is given. Reply with JSON only: {\"summary\": string, \"plans\": \
[{\"name\": string, \"monthly_price\": string, \"rationale\": string}], \"reasoning\": [string]}";

const SUPPORT_PROMPT: &str = "You are a telecom technical support agent. Answer how-to and \
device configuration questions (APN, VoLTE, eSIM, roaming, hotspot) with short, accurate steps. \
If you are not sure, say so and suggest contacting support.";

/// LLM-backed domain backend. Each domain keeps its own prompt flow and output shape.
pub struct LlmCapabilityProvider {
    id: ProviderId,
    domain: Intent,
    client: Arc<dyn LlmClient>,
}

impl LlmCapabilityProvider {
    pub fn new(id: ProviderId, domain: Intent, client: Arc<dyn LlmClient>) -> Self {
        Self { id, domain, client }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderFailure> {
        self.client.complete(&request).await.map_err(failure_from_llm)
    }

    async fn billing(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        let findings = self
            .complete(CompletionRequest::new(BILLING_SPECIALIST_PROMPT, customer_message(request)))
            .await?;
        let explanation = self
            .complete(
                CompletionRequest::new(
                    BILLING_ADVISOR_PROMPT,
                    format!(
                        "Customer question: {}\n\nSpecialist findings:\n{findings}",
                        request.text
                    ),
                )
                .with_temperature(0.4),
            )
            .await?;

        Ok(ProviderOutput::Structured {
            summary: explanation,
            details: Vec::new(),
            citations: vec![Citation::new("billing-specialist").with_excerpt(findings)],
            follow_ups: Vec::new(),
            confidence: None,
        })
    }

    async fn network(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        let diagnostics = self
            .complete(CompletionRequest::new(NETWORK_DIAGNOSTICS_PROMPT, customer_message(request)))
            .await?;
        let resolution = self
            .complete(
                CompletionRequest::new(
                    NETWORK_RESOLUTION_PROMPT,
                    format!(
                        "Technical diagnostics summary:\n\n{diagnostics}\n\n\
                         Convert this into a helpful customer-facing explanation with steps."
                    ),
                )
                .with_temperature(0.4),
            )
            .await?;

        Ok(ProviderOutput::Sectioned {
            sections: vec![
                Section { title: "Diagnostics".to_string(), body: diagnostics, customer_facing: false },
                Section { title: "Resolution".to_string(), body: resolution, customer_facing: true },
            ],
        })
    }

    async fn plans(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        let completion = self
            .complete(
                CompletionRequest::new(PLAN_PROMPT, customer_message(request))
                    .with_temperature(0.3)
                    .expecting_json(),
            )
            .await?;
        Ok(parse_recommendation(&completion))
    }

    async fn support(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        let text = self.complete(CompletionRequest::new(SUPPORT_PROMPT, customer_message(request))).await?;
        Ok(ProviderOutput::plain(text))
    }
}

#[async_trait]
impl CapabilityProvider for LlmCapabilityProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn answer(&self, request: &ProviderRequest) -> Result<ProviderOutput, ProviderFailure> {
        match self.domain {
            Intent::Billing => self.billing(request).await,
            Intent::Network => self.network(request).await,
            Intent::PlanRecommendation => self.plans(request).await,
            Intent::TechnicalSupport => self.support(request).await,
            Intent::Unknown => Err(ProviderFailure::Rejected(
                "llm provider has no domain for unclassified questions".to_string(),
            )),
        }
    }
}

fn failure_from_llm(error: LlmError) -> ProviderFailure {
    match error {
        LlmError::Offline => ProviderFailure::Rejected(error.to_string()),
        other => ProviderFailure::Unavailable(other.to_string()),
    }
}

fn customer_message(request: &ProviderRequest) -> String {
    let mut message = String::new();
    if let Some(identifier) = request.customer_identifier() {
        message.push_str(&format!("Customer identifier: {identifier}\n"));
    }
    if let Some(profile) = &request.profile {
        message.push_str("Account data from the customer database:\n");
        message.push_str(&profile.render());
        message.push_str("\n\n");
    }
    if let Some(context) = request.context.as_ref().filter(|context| !context.is_empty()) {
        message.push_str("Earlier in this conversation:\n");
        message.push_str(&context.transcript());
        message.push('\n');
    }
    message.push_str(&format!("Customer question: {}", request.text));
    message
}

#[derive(Deserialize)]
struct RecommendationVerdict {
    summary: String,
    #[serde(default)]
    plans: Vec<PlanOption>,
    #[serde(default)]
    reasoning: Vec<String>,
}

/// Unparseable recommendations are passed through for the normalizer to judge.
fn parse_recommendation(completion: &str) -> ProviderOutput {
    extract_json_object(completion)
        .and_then(|value| serde_json::from_value::<RecommendationVerdict>(value).ok())
        .map(|verdict| ProviderOutput::Recommendation {
            summary: verdict.summary,
            plans: verdict.plans,
            reasoning: verdict.reasoning,
        })
        .unwrap_or_else(|| ProviderOutput::Unrecognized {
            payload: Value::String(completion.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use telroute_core::domain::customer::{CustomerProfile, ServicePlan};
    use telroute_core::domain::intent::{Intent, ProviderId};
    use telroute_core::domain::query::{Query, QueryRequest};
    use telroute_core::errors::ProviderFailure;

    use super::{parse_recommendation, LlmCapabilityProvider};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};
    use crate::providers::{CapabilityProvider, ProviderOutput, ProviderRequest};

    #[derive(Default)]
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        fn replying(replies: Vec<Result<String, LlmError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self { replies: Mutex::new(replies), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompts").push(request.clone());
            self.replies.lock().expect("replies").pop().unwrap_or(Err(LlmError::EmptyCompletion))
        }
    }

    fn request(text: &str, intent: Intent) -> ProviderRequest {
        ProviderRequest::from_query(&Query::from_request(QueryRequest::new("s1", text), None), intent)
    }

    #[tokio::test]
    async fn network_flow_runs_diagnostics_then_resolution() {
        let llm = Arc::new(ScriptedLlm::replying(vec![
            Ok("weak LTE band 3 coverage".to_string()),
            Ok("1. Restart\n2. Enable VoLTE".to_string()),
        ]));
        let provider =
            LlmCapabilityProvider::new(ProviderId::new("network"), Intent::Network, llm.clone());

        let output = provider.answer(&request("calls drop", Intent::Network)).await.expect("answer");

        match output {
            ProviderOutput::Sectioned { sections } => {
                assert_eq!(sections.len(), 2);
                assert!(!sections[0].customer_facing);
                assert!(sections[1].body.contains("Enable VoLTE"));
            }
            other => panic!("unexpected output {other:?}"),
        }
        let prompts = llm.prompts.lock().expect("prompts");
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].messages[1].content.contains("weak LTE band 3 coverage"));
    }

    #[tokio::test]
    async fn billing_flow_keeps_findings_as_evidence() {
        let llm = Arc::new(ScriptedLlm::replying(vec![
            Ok("roaming fee on 3 May".to_string()),
            Ok("You were charged a roaming fee.".to_string()),
        ]));
        let provider = LlmCapabilityProvider::new(ProviderId::new("billing"), Intent::Billing, llm);

        match provider.answer(&request("why charged", Intent::Billing)).await.expect("answer") {
            ProviderOutput::Structured { summary, citations, .. } => {
                assert_eq!(summary, "You were charged a roaming fee.");
                assert_eq!(citations[0].excerpt.as_deref(), Some("roaming fee on 3 May"));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn plan_prompt_carries_the_catalogue_and_usage() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            r#"{"summary": "Move up", "plans": [{"name": "Smart 25GB"}]}"#.to_string(),
        )]));
        let provider = LlmCapabilityProvider::new(
            ProviderId::new("plan_recommendation"),
            Intent::PlanRecommendation,
            llm.clone(),
        );
        let profile = CustomerProfile {
            plans: vec![ServicePlan {
                plan_id: "P25".to_string(),
                name: "Smart 25GB".to_string(),
                monthly_cost: 449.0,
                data_limit_gb: Some(25.0),
                voice_minutes: None,
                sms_count: None,
            }],
            ..CustomerProfile::default()
        };

        let output = provider
            .answer(&request("cheaper plan?", Intent::PlanRecommendation).with_profile(profile))
            .await
            .expect("answer");

        assert_eq!(output.shape(), "recommendation");
        let prompts = llm.prompts.lock().expect("prompts");
        let user_message = &prompts[0].messages[1].content;
        assert!(user_message.contains("Available plans:\n- Smart 25GB (P25): 449.00/month"));
        assert!(user_message.contains("No usage data available."));
    }

    #[tokio::test]
    async fn llm_errors_surface_as_provider_failures() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Err(LlmError::Http("503".to_string()))]));
        let provider =
            LlmCapabilityProvider::new(ProviderId::new("support"), Intent::TechnicalSupport, llm);

        let result = provider.answer(&request("apn?", Intent::TechnicalSupport)).await;
        assert!(matches!(result, Err(ProviderFailure::Unavailable(_))));
    }

    #[test]
    fn recommendation_json_is_parsed_and_prose_passes_through() {
        let parsed = parse_recommendation(
            r#"{"summary": "Go unlimited", "plans": [{"name": "Unlimited", "rationale": "streams a lot"}]}"#,
        );
        assert_eq!(parsed.shape(), "recommendation");

        let prose = parse_recommendation("Try the family plan.");
        assert_eq!(prose.shape(), "unrecognized");
    }
}
