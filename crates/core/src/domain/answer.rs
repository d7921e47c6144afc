use serde::{Deserialize, Serialize};

use crate::domain::intent::{clamp_unit, ProviderId};

/// Explicit presence marker for optional answer fields. Consumers always see the
/// field, either carrying a value or marked as not provided by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Provided<T> {
    Provided(T),
    NotProvided,
}

impl<T> Provided<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Provided(value) => Some(value),
            Self::NotProvided => None,
        }
    }

    pub fn is_provided(&self) -> bool {
        matches!(self, Self::Provided(_))
    }
}

impl<T> From<Option<T>> for Provided<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Provided(value),
            None => Self::NotProvided,
        }
    }
}

impl<T> Provided<Vec<T>> {
    /// Empty collections count as absent.
    pub fn non_empty(values: Vec<T>) -> Self {
        if values.is_empty() {
            Self::NotProvided
        } else {
            Self::Provided(values)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub excerpt: Option<String>,
}

impl Citation {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), excerpt: None }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }
}

/// Canonical answer shape handed back to every transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source_provider: ProviderId,
    pub confidence: Provided<f64>,
    pub citations: Provided<Vec<Citation>>,
    pub follow_ups: Provided<Vec<String>>,
}

impl Answer {
    pub fn text_only(source_provider: ProviderId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_provider,
            confidence: Provided::NotProvided,
            citations: Provided::NotProvided,
            follow_ups: Provided::NotProvided,
        }
    }

    /// Fills a confidence the backend left out. A reported confidence is kept.
    pub fn with_fallback_confidence(mut self, confidence: f64) -> Self {
        if !self.confidence.is_provided() {
            self.confidence = Provided::Provided(clamp_unit(confidence));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Answer, Provided};
    use crate::domain::intent::ProviderId;

    #[test]
    fn absent_fields_serialize_with_explicit_marker() {
        let answer = Answer::text_only(ProviderId::new("network"), "Restart your router.");
        let value = serde_json::to_value(&answer).expect("answer serializes");

        assert_eq!(value["citations"], json!({ "status": "not_provided" }));
        assert_eq!(value["follow_ups"], json!({ "status": "not_provided" }));
        assert_eq!(value["source_provider"], json!("network"));
    }

    #[test]
    fn fallback_confidence_never_replaces_a_reported_one() {
        let routed = Answer::text_only(ProviderId::new("billing"), "ok").with_fallback_confidence(0.92);
        assert_eq!(routed.confidence, Provided::Provided(0.92));

        let mut reported = Answer::text_only(ProviderId::new("billing"), "ok");
        reported.confidence = Provided::Provided(0.4);
        assert_eq!(reported.with_fallback_confidence(0.92).confidence, Provided::Provided(0.4));
    }

    #[test]
    fn empty_vectors_are_not_provided() {
        assert_eq!(Provided::<Vec<String>>::non_empty(Vec::new()), Provided::NotProvided);
        assert!(Provided::non_empty(vec!["x".to_owned()]).is_provided());
    }
}
