use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Billing,
    Network,
    PlanRecommendation,
    TechnicalSupport,
    Unknown,
}

impl Intent {
    /// Every routable intent, in declaration order. `Unknown` is never routable.
    pub const ROUTABLE: [Intent; 4] =
        [Intent::Billing, Intent::Network, Intent::PlanRecommendation, Intent::TechnicalSupport];

    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Network => "network",
            Self::PlanRecommendation => "plan_recommendation",
            Self::TechnicalSupport => "technical_support",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_routable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownIntentKey(pub String);

impl fmt::Display for UnknownIntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown intent `{}` (expected billing|network|plan_recommendation|technical_support|unknown)",
            self.0
        )
    }
}

impl std::error::Error for UnknownIntentKey {}

impl FromStr for Intent {
    type Err = UnknownIntentKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(&['-', ' '][..], "_").as_str() {
            "billing" | "billing_account" => Ok(Self::Billing),
            "network" | "network_troubleshooting" => Ok(Self::Network),
            "plan_recommendation" | "service_recommendation" | "plan" => {
                Ok(Self::PlanRecommendation)
            }
            "technical_support" | "knowledge_retrieval" | "support" => Ok(Self::TechnicalSupport),
            "unknown" | "fallback" => Ok(Self::Unknown),
            _ => Err(UnknownIntentKey(value.to_owned())),
        }
    }
}

/// Identifier of a capability provider in the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredIntent {
    pub intent: Intent,
    pub score: f64,
}

impl ScoredIntent {
    pub fn new(intent: Intent, score: f64) -> Self {
        Self { intent, score: clamp_unit(score) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub confidence: f64,
    pub alternates: Vec<ScoredIntent>,
}

impl ClassificationResult {
    /// Builds a result from arbitrary scores: the highest score becomes the top
    /// intent, the rest become alternates sorted descending. Ties keep input order.
    pub fn from_scores(scores: impl IntoIterator<Item = ScoredIntent>) -> Self {
        let mut ranked: Vec<ScoredIntent> = Vec::new();
        for scored in scores {
            let scored = ScoredIntent::new(scored.intent, scored.score);
            match ranked.iter_mut().find(|existing| existing.intent == scored.intent) {
                Some(existing) if existing.score < scored.score => existing.score = scored.score,
                Some(_) => {}
                None => ranked.push(scored),
            }
        }
        ranked.sort_by(|left, right| right.score.total_cmp(&left.score));

        let mut ranked = ranked.into_iter();
        match ranked.next() {
            Some(top) => Self {
                intent: top.intent,
                confidence: top.score,
                alternates: ranked.filter(|alt| alt.intent != top.intent).collect(),
            },
            None => Self::unknown(),
        }
    }

    pub fn unknown() -> Self {
        Self { intent: Intent::Unknown, confidence: 0.0, alternates: Vec::new() }
    }

    pub fn single(intent: Intent, confidence: f64) -> Self {
        Self { intent, confidence: clamp_unit(confidence), alternates: Vec::new() }
    }

    pub fn with_alternate(mut self, intent: Intent, score: f64) -> Self {
        if intent != self.intent {
            self.alternates.retain(|alt| alt.intent != intent);
            self.alternates.push(ScoredIntent::new(intent, score));
            self.alternates.sort_by(|left, right| right.score.total_cmp(&left.score));
        }
        self
    }

    /// Top intent followed by the alternates, highest score first.
    pub fn ranked(&self) -> Vec<ScoredIntent> {
        let mut ranked = Vec::with_capacity(self.alternates.len() + 1);
        ranked.push(ScoredIntent { intent: self.intent, score: self.confidence });
        ranked.extend(self.alternates.iter().copied());
        ranked
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
