//! Maps every native provider output shape onto the canonical [`Answer`].
//!
//! Mapping is pure: the same output always normalizes to the same answer.

use serde_json::{Map, Value};

use telroute_core::domain::answer::{Answer, Citation, Provided};
use telroute_core::domain::intent::{clamp_unit, ProviderId};
use telroute_core::errors::NormalizeError;

use crate::providers::{PlanOption, ProviderOutput, Section};

const TEXT_KEYS: &[&str] = &["text", "answer", "response", "message", "content"];
const FOLLOW_UP_KEYS: &[&str] = &["follow_ups", "followups", "suggestions"];

pub fn normalize(provider_id: &ProviderId, output: &ProviderOutput) -> Result<Answer, NormalizeError> {
    let malformed = |reason: &str| NormalizeError::MalformedProviderOutput {
        provider_id: provider_id.clone(),
        reason: reason.to_string(),
    };

    let answer = match output {
        ProviderOutput::PlainText { text } => {
            let text = required_text(text).ok_or_else(|| malformed("plain text answer is empty"))?;
            Answer::text_only(provider_id.clone(), text)
        }
        ProviderOutput::Structured { summary, details, citations, follow_ups, confidence } => {
            let summary =
                required_text(summary).ok_or_else(|| malformed("structured answer has no summary"))?;
            Answer {
                text: with_bullets(summary, details),
                source_provider: provider_id.clone(),
                confidence: confidence.filter(|value| value.is_finite()).map(clamp_unit).into(),
                citations: Provided::non_empty(citations.clone()),
                follow_ups: Provided::non_empty(non_blank(follow_ups)),
            }
        }
        ProviderOutput::Recommendation { summary, plans, reasoning } => {
            let text = recommendation_text(summary, plans, reasoning)
                .ok_or_else(|| malformed("recommendation has neither summary nor plans"))?;
            Answer::text_only(provider_id.clone(), text)
        }
        ProviderOutput::Sectioned { sections } => sectioned_answer(provider_id, sections)
            .ok_or_else(|| malformed("no customer-facing section has text"))?,
        ProviderOutput::Unrecognized { payload } => coerce_unrecognized(provider_id, payload)
            .ok_or_else(|| malformed("payload has no recognizable text field"))?,
    };

    Ok(answer)
}

fn required_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn non_blank(values: &[String]) -> Vec<String> {
    values.iter().filter_map(|value| required_text(value)).collect()
}

fn with_bullets(summary: String, details: &[String]) -> String {
    let details = non_blank(details);
    if details.is_empty() {
        return summary;
    }
    let bullets = details.iter().map(|detail| format!("- {detail}")).collect::<Vec<_>>();
    format!("{summary}\n\n{}", bullets.join("\n"))
}

fn recommendation_text(summary: &str, plans: &[PlanOption], reasoning: &[String]) -> Option<String> {
    let summary = required_text(summary);
    let plans: Vec<&PlanOption> = plans.iter().filter(|plan| !plan.name.trim().is_empty()).collect();
    if summary.is_none() && plans.is_empty() {
        return None;
    }

    let mut blocks = Vec::new();
    if let Some(summary) = summary {
        blocks.push(summary);
    }
    if !plans.is_empty() {
        let lines = plans
            .iter()
            .enumerate()
            .map(|(index, plan)| {
                let mut line = format!("{}. {}", index + 1, plan.name.trim());
                if let Some(price) = plan.monthly_price.as_deref().and_then(required_text) {
                    line.push_str(&format!(" ({price}/month)"));
                }
                if let Some(rationale) = required_text(&plan.rationale) {
                    line.push_str(&format!(": {rationale}"));
                }
                line
            })
            .collect::<Vec<_>>();
        blocks.push(format!("Recommended:\n{}", lines.join("\n")));
    }
    let reasoning = non_blank(reasoning);
    if !reasoning.is_empty() {
        let bullets = reasoning.iter().map(|reason| format!("- {reason}")).collect::<Vec<_>>();
        blocks.push(format!("Why:\n{}", bullets.join("\n")));
    }
    Some(blocks.join("\n\n"))
}

fn sectioned_answer(provider_id: &ProviderId, sections: &[Section]) -> Option<Answer> {
    let visible: Vec<String> = sections
        .iter()
        .filter(|section| section.customer_facing)
        .filter_map(|section| required_text(&section.body))
        .collect();
    if visible.is_empty() {
        return None;
    }

    let evidence: Vec<Citation> = sections
        .iter()
        .filter(|section| !section.customer_facing)
        .filter_map(|section| {
            required_text(&section.body)
                .map(|body| Citation::new(section.title.trim()).with_excerpt(body))
        })
        .collect();

    let mut answer = Answer::text_only(provider_id.clone(), visible.join("\n\n"));
    answer.citations = Provided::non_empty(evidence);
    Some(answer)
}

fn coerce_unrecognized(provider_id: &ProviderId, payload: &Value) -> Option<Answer> {
    match payload {
        Value::String(text) => {
            required_text(text).map(|text| Answer::text_only(provider_id.clone(), text))
        }
        Value::Object(object) => coerce_object(provider_id, object),
        _ => None,
    }
}

fn coerce_object(provider_id: &ProviderId, object: &Map<String, Value>) -> Option<Answer> {
    let text = TEXT_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find_map(required_text)?;

    let citations: Vec<Citation> = object
        .get("citations")
        .or_else(|| object.get("sources"))
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(citation_from_value).collect())
        .unwrap_or_default();
    let follow_ups: Vec<String> = FOLLOW_UP_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array))
        .map(|values| {
            values.iter().filter_map(Value::as_str).filter_map(required_text).collect()
        })
        .unwrap_or_default();
    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .map(clamp_unit);

    Some(Answer {
        text,
        source_provider: provider_id.clone(),
        confidence: confidence.into(),
        citations: Provided::non_empty(citations),
        follow_ups: Provided::non_empty(follow_ups),
    })
}

fn citation_from_value(value: &Value) -> Option<Citation> {
    match value {
        Value::String(source) => required_text(source).map(Citation::new),
        Value::Object(object) => {
            let source = object
                .get("source")
                .or_else(|| object.get("title"))
                .and_then(Value::as_str)
                .and_then(required_text)?;
            let citation = Citation::new(source);
            Some(
                match object.get("excerpt").and_then(Value::as_str).and_then(required_text) {
                    Some(excerpt) => citation.with_excerpt(excerpt),
                    None => citation,
                },
            )
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use telroute_core::domain::answer::{Citation, Provided};
    use telroute_core::domain::intent::ProviderId;
    use telroute_core::errors::NormalizeError;

    use super::normalize;
    use crate::providers::{PlanOption, ProviderOutput, Section};

    fn provider() -> ProviderId {
        ProviderId::new("billing")
    }

    #[test]
    fn plain_text_marks_every_optional_field_not_provided() {
        let answer = normalize(&provider(), &ProviderOutput::plain("  Your bill is due on the 5th. "))
            .expect("normalize");

        assert_eq!(answer.text, "Your bill is due on the 5th.");
        assert_eq!(answer.source_provider, provider());
        assert_eq!(answer.confidence, Provided::NotProvided);
        assert_eq!(answer.citations, Provided::NotProvided);
        assert_eq!(answer.follow_ups, Provided::NotProvided);
    }

    #[test]
    fn structured_output_keeps_evidence_and_follow_ups() {
        let output = ProviderOutput::Structured {
            summary: "You were charged twice for the roaming pack.".to_string(),
            details: vec!["Pack added on 3 May".to_string(), " ".to_string()],
            citations: vec![Citation::new("invoice-2291")],
            follow_ups: vec!["Request a refund?".to_string()],
            confidence: Some(1.4),
        };

        let answer = normalize(&provider(), &output).expect("normalize");

        assert!(answer.text.ends_with("- Pack added on 3 May"));
        assert_eq!(answer.confidence, Provided::Provided(1.0));
        assert_eq!(answer.citations.as_option().map(Vec::len), Some(1));
        assert_eq!(answer.follow_ups, Provided::Provided(vec!["Request a refund?".to_string()]));
    }

    #[test]
    fn recommendation_lists_plans_in_rank_order() {
        let output = ProviderOutput::Recommendation {
            summary: "Two options fit.".to_string(),
            plans: vec![
                PlanOption {
                    name: "Unlimited".to_string(),
                    monthly_price: Some("$45".to_string()),
                    rationale: "heavy data use".to_string(),
                },
                PlanOption { name: "Saver".to_string(), monthly_price: None, rationale: String::new() },
            ],
            reasoning: vec!["You exceed 20GB most months".to_string()],
        };

        let answer = normalize(&ProviderId::new("plan_recommendation"), &output).expect("normalize");

        assert!(answer.text.contains("1. Unlimited ($45/month): heavy data use"));
        assert!(answer.text.contains("2. Saver"));
        assert!(answer.text.contains("- You exceed 20GB most months"));
    }

    #[test]
    fn sectioned_output_shows_resolution_and_cites_diagnostics() {
        let output = ProviderOutput::Sectioned {
            sections: vec![
                Section { title: "Diagnostics".to_string(), body: "band 3 congestion".to_string(), customer_facing: false },
                Section { title: "Resolution".to_string(), body: "Restart your phone.".to_string(), customer_facing: true },
            ],
        };

        let answer = normalize(&ProviderId::new("network"), &output).expect("normalize");

        assert_eq!(answer.text, "Restart your phone.");
        assert_eq!(
            answer.citations,
            Provided::Provided(vec![Citation::new("Diagnostics").with_excerpt("band 3 congestion")])
        );
    }

    #[test]
    fn unrecognized_object_with_text_field_is_coerced() {
        let output = ProviderOutput::Unrecognized {
            payload: json!({
                "response": "Enable VoLTE in settings.",
                "sources": ["kb/volte", {"title": "Device guide", "excerpt": "Settings > Mobile"}],
                "suggestions": ["Did that fix it?"],
                "confidence": 0.7
            }),
        };

        let answer = normalize(&ProviderId::new("technical_support"), &output).expect("normalize");

        assert_eq!(answer.text, "Enable VoLTE in settings.");
        assert_eq!(answer.confidence, Provided::Provided(0.7));
        assert_eq!(answer.citations.as_option().map(Vec::len), Some(2));
        assert!(answer.follow_ups.is_provided());
    }

    #[test]
    fn missing_mandatory_text_is_malformed() {
        let cases = [
            ProviderOutput::plain("   "),
            ProviderOutput::Unrecognized { payload: json!({"status": "ok"}) },
            ProviderOutput::Unrecognized { payload: json!(42) },
            ProviderOutput::Sectioned {
                sections: vec![Section {
                    title: "Diagnostics".to_string(),
                    body: "internal only".to_string(),
                    customer_facing: false,
                }],
            },
            ProviderOutput::Recommendation { summary: String::new(), plans: vec![], reasoning: vec![] },
        ];

        for output in cases {
            let result = normalize(&provider(), &output);
            assert!(
                matches!(result, Err(NormalizeError::MalformedProviderOutput { ref provider_id, .. }) if *provider_id == provider()),
                "expected malformed for {output:?}"
            );
        }
    }

    #[test]
    fn normalizing_twice_yields_equal_answers() {
        let outputs = [
            ProviderOutput::plain("same"),
            ProviderOutput::Unrecognized { payload: json!({"answer": "same", "citations": ["a"]}) },
            ProviderOutput::Structured {
                summary: "s".to_string(),
                details: vec!["d".to_string()],
                citations: vec![],
                follow_ups: vec![],
                confidence: None,
            },
        ];

        for output in outputs {
            let first = normalize(&provider(), &output).expect("first");
            let second = normalize(&provider(), &output).expect("second");
            assert_eq!(first, second);
        }
    }
}
