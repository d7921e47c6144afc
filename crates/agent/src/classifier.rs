//! Intent classification.
//!
//! [`IntentClassifier`] owns input validation and the timeout; the scoring itself is
//! delegated to an [`IntentModel`]. A model that is slow or fails degrades the
//! result to `Unknown` with confidence 0 so the router can fall back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use telroute_core::domain::intent::{ClassificationResult, Intent, ScoredIntent};
use telroute_core::domain::query::{validate_text, Query};
use telroute_core::domain::session::SessionContext;
use telroute_core::errors::QueryError;

use crate::llm::{extract_json_object, CompletionRequest, LlmClient};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("intent model failed: {0}")]
    Model(String),
}

#[async_trait]
pub trait IntentModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(
        &self,
        text: &str,
        context: Option<&SessionContext>,
    ) -> Result<ClassificationResult, ClassifierError>;
}

#[derive(Clone)]
pub struct IntentClassifier {
    model: Arc<dyn IntentModel>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn IntentModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn keyword(timeout: Duration) -> Self {
        Self::new(Arc::new(KeywordIntentModel::default()), timeout)
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub async fn classify(&self, query: &Query) -> Result<ClassificationResult, QueryError> {
        validate_text(&query.text)?;

        let scoring = self.model.score(&query.text, query.context.as_ref());
        match tokio::time::timeout(self.timeout, scoring).await {
            Ok(Ok(result)) => {
                debug!(
                    event_name = "classifier.scored",
                    query_id = %query.id.0,
                    model = self.model.name(),
                    intent = %result.intent,
                    confidence = result.confidence,
                    "query classified"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "classifier.model_failed",
                    query_id = %query.id.0,
                    model = self.model.name(),
                    error = %error,
                    "intent model failed, treating query as unknown"
                );
                Ok(ClassificationResult::unknown())
            }
            Err(_) => {
                warn!(
                    event_name = "classifier.timeout",
                    query_id = %query.id.0,
                    model = self.model.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "intent model timed out, treating query as unknown"
                );
                Ok(ClassificationResult::unknown())
            }
        }
    }
}

const BILLING_KEYWORDS: &[&str] = &[
    "bill", "billing", "billed", "charge", "charged", "charges", "payment", "pay", "paid",
    "account", "due date", "invoice", "refund", "balance", "overcharged", "fee", "fees",
];
const NETWORK_KEYWORDS: &[&str] = &[
    "network", "signal", "connection", "call", "calls", "data", "slow", "internet", "5g", "4g",
    "drop", "dropping", "drops", "outage", "coverage", "speed", "no service", "tower",
];
const PLAN_KEYWORDS: &[&str] = &[
    "plan", "plans", "recommend", "recommendation", "upgrade", "downgrade", "best", "family",
    "pack", "add-on", "addon", "cheaper", "unlimited", "prepaid", "postpaid", "switch plan",
];
const SUPPORT_KEYWORDS: &[&str] = &[
    "how", "what", "configure", "setup", "set up", "apn", "volte", "roaming", "esim", "sim",
    "settings", "activate", "voicemail", "hotspot", "wifi calling", "reset",
];

/// Pseudo-hits granted to the previous turn's intent.
const CONTEXT_PRIOR_HITS: f64 = 0.5;

/// Deterministic keyword scorer.
///
/// Each intent scores `(1 - 0.5^h) * (h / total)` where `h` is its keyword hit count:
/// the first factor rewards evidence, the second its share of all evidence.
#[derive(Clone, Debug)]
pub struct KeywordIntentModel {
    vocabulary: Vec<(Intent, Vec<String>)>,
}

impl Default for KeywordIntentModel {
    fn default() -> Self {
        let vocabulary = [
            (Intent::Billing, BILLING_KEYWORDS),
            (Intent::Network, NETWORK_KEYWORDS),
            (Intent::PlanRecommendation, PLAN_KEYWORDS),
            (Intent::TechnicalSupport, SUPPORT_KEYWORDS),
        ]
        .into_iter()
        .map(|(intent, words)| (intent, words.iter().map(|word| normalize_text(word)).collect()))
        .collect();
        Self { vocabulary }
    }
}

impl KeywordIntentModel {
    pub fn with_vocabulary(vocabulary: Vec<(Intent, Vec<String>)>) -> Self {
        let vocabulary = vocabulary
            .into_iter()
            .filter(|(intent, _)| intent.is_routable())
            .map(|(intent, words)| {
                (intent, words.iter().map(|word| normalize_text(word)).collect())
            })
            .collect();
        Self { vocabulary }
    }

    pub fn score_text(&self, text: &str, context: Option<&SessionContext>) -> ClassificationResult {
        let padded = format!(" {} ", normalize_text(text));
        let prior = context.and_then(SessionContext::last_intent);

        let hits: Vec<(Intent, f64)> = self
            .vocabulary
            .iter()
            .map(|(intent, words)| {
                let count = words
                    .iter()
                    .filter(|word| !word.is_empty() && padded.contains(&format!(" {word} ")))
                    .count() as f64;
                let bonus = if prior == Some(*intent) { CONTEXT_PRIOR_HITS } else { 0.0 };
                (*intent, count + bonus)
            })
            .filter(|(_, hits)| *hits > 0.0)
            .collect();

        let total: f64 = hits.iter().map(|(_, hits)| hits).sum();
        if total <= 0.0 {
            return ClassificationResult::unknown();
        }

        ClassificationResult::from_scores(hits.into_iter().map(|(intent, hits)| {
            ScoredIntent::new(intent, (1.0 - 0.5_f64.powf(hits)) * (hits / total))
        }))
    }
}

#[async_trait]
impl IntentModel for KeywordIntentModel {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn score(
        &self,
        text: &str,
        context: Option<&SessionContext>,
    ) -> Result<ClassificationResult, ClassifierError> {
        Ok(self.score_text(text, context))
    }
}

const CLASSIFIER_PROMPT: &str = "You classify telecom customer questions. \
Categories: billing (charges, invoices, payments, account balance), \
network (signal, coverage, slow data, dropped calls), \
plan_recommendation (choosing, upgrading or downgrading plans and packs), \
technical_support (device settings, APN, VoLTE, eSIM, roaming setup, how-to questions), \
unknown (anything else). Reply with JSON only: \
{\"intent\": <category>, \"confidence\": <0..1>, \
\"alternates\": [{\"intent\": <category>, \"score\": <0..1>}]}";

/// Asks an LLM for a JSON verdict. Unparseable verdicts classify as `Unknown`.
pub struct LlmIntentModel {
    client: Arc<dyn LlmClient>,
}

impl LlmIntentModel {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentModel for LlmIntentModel {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn score(
        &self,
        text: &str,
        context: Option<&SessionContext>,
    ) -> Result<ClassificationResult, ClassifierError> {
        let mut prompt = String::new();
        if let Some(context) = context.filter(|context| !context.is_empty()) {
            prompt.push_str("Conversation so far:\n");
            prompt.push_str(&context.transcript());
            prompt.push_str("\n\n");
        }
        prompt.push_str("Question: ");
        prompt.push_str(text);

        let request = CompletionRequest::new(CLASSIFIER_PROMPT, prompt)
            .with_temperature(0.0)
            .expecting_json();
        let completion = self
            .client
            .complete(&request)
            .await
            .map_err(|error| ClassifierError::Model(error.to_string()))?;

        Ok(parse_verdict(&completion).unwrap_or_else(ClassificationResult::unknown))
    }
}

fn parse_verdict(completion: &str) -> Option<ClassificationResult> {
    let verdict = extract_json_object(completion)?;
    let intent = verdict.get("intent")?.as_str()?.parse::<Intent>().ok()?;
    let confidence = verdict.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);

    let mut result = ClassificationResult::single(intent, confidence);
    if let Some(alternates) = verdict.get("alternates").and_then(Value::as_array) {
        for alternate in alternates {
            let parsed = alternate
                .get("intent")
                .and_then(Value::as_str)
                .and_then(|key| key.parse::<Intent>().ok());
            let score = alternate.get("score").and_then(Value::as_f64);
            if let (Some(alt_intent), Some(score)) = (parsed, score) {
                result = result.with_alternate(alt_intent, score);
            }
        }
    }
    Some(result)
}

fn normalize_text(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '-' {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().collect::<Vec<_>>().join(" ")
}
