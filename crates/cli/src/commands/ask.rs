use std::sync::Arc;

use telroute_agent::{bootstrap, TracingAuditSink};
use telroute_core::config::LoadOptions;
use telroute_core::domain::answer::{Answer, Provided};
use telroute_core::domain::query::{CustomerRef, QueryRequest};
use uuid::Uuid;

use crate::commands::{bootstrap_failure, exit, runtime, to_json, CommandResult};

pub fn run(text: &str, session: &str, email: Option<&str>, json_output: bool) -> CommandResult {
    let runtime = match runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match bootstrap(LoadOptions::default(), Arc::new(TracingAuditSink)).await {
            Ok(app) => app,
            Err(error) => return bootstrap_failure("ask", &error),
        };

        let correlation_id = Uuid::new_v4().to_string();
        let result =
            app.orchestrator.handle_detailed(request(session, text, email), &correlation_id).await;
        if let Some(pool) = &app.db_pool {
            pool.close().await;
        }

        match result {
            Ok(handled) if json_output => CommandResult::plain(0, to_json(&handled.answer)),
            Ok(handled) => CommandResult::plain(0, render_answer(&handled.answer)),
            Err(failure) => {
                let report = failure.report(correlation_id);
                if json_output {
                    CommandResult::plain(exit::QUERY_FAILED, to_json(&report))
                } else {
                    CommandResult::failure(
                        "ask",
                        &report.error_class,
                        format!("{} (stage: {})", report.user_message, report.stage),
                        exit::QUERY_FAILED,
                    )
                }
            }
        }
    })
}

pub(crate) fn request(session: &str, text: &str, email: Option<&str>) -> QueryRequest {
    let request = QueryRequest::new(session, text);
    match email {
        Some(email) => request.with_customer(CustomerRef::with_email(email)),
        None => request,
    }
}

pub fn render_answer(answer: &Answer) -> String {
    let mut lines = vec![answer.text.clone()];

    let confidence = match &answer.confidence {
        Provided::Provided(value) => format!("{value:.2}"),
        Provided::NotProvided => "n/a".to_string(),
    };
    lines.push(String::new());
    lines.push(format!("source: {} (confidence: {confidence})", answer.source_provider));

    if let Some(citations) = answer.citations.as_option() {
        lines.push("citations:".to_string());
        for citation in citations {
            match &citation.excerpt {
                Some(excerpt) => lines.push(format!("  - {}: {excerpt}", citation.source)),
                None => lines.push(format!("  - {}", citation.source)),
            }
        }
    }
    if let Some(follow_ups) = answer.follow_ups.as_option() {
        lines.push("you could also ask:".to_string());
        lines.extend(follow_ups.iter().map(|follow_up| format!("  - {follow_up}")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use telroute_core::domain::answer::{Answer, Citation, Provided};
    use telroute_core::domain::intent::ProviderId;

    use super::{render_answer, request};

    #[test]
    fn render_marks_missing_confidence() {
        let answer = Answer::text_only(ProviderId::new("technical_support"), "Toggle airplane mode.");
        let rendered = render_answer(&answer);

        assert!(rendered.starts_with("Toggle airplane mode."));
        assert!(rendered.contains("source: technical_support (confidence: n/a)"));
        assert!(!rendered.contains("citations:"));
    }

    #[test]
    fn render_lists_citations_and_follow_ups() {
        let mut answer = Answer::text_only(ProviderId::new("billing"), "Two roaming packs were billed.");
        answer.confidence = Provided::Provided(0.8);
        answer.citations =
            Provided::Provided(vec![Citation::new("invoice 2026-09").with_excerpt("roaming x2")]);
        answer.follow_ups = Provided::Provided(vec!["Can I get a refund?".to_string()]);

        let rendered = render_answer(&answer);
        assert!(rendered.contains("confidence: 0.80"));
        assert!(rendered.contains("  - invoice 2026-09: roaming x2"));
        assert!(rendered.contains("  - Can I get a refund?"));
    }

    #[test]
    fn email_becomes_customer_reference() {
        let with_email = request("s1", "hi", Some("pat@example.com"));
        assert!(with_email.customer.is_some());
        assert!(request("s1", "hi", None).customer.is_none());
    }
}
