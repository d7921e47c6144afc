use std::sync::Arc;

use telroute_agent::{bootstrap, Orchestrator, TracingAuditSink};
use telroute_core::config::LoadOptions;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::commands::ask::{render_answer, request};
use crate::commands::{bootstrap_failure, exit, runtime, CommandResult};

const PROMPT: &str = "you> ";

pub fn run(session: Option<String>, email: Option<String>) -> CommandResult {
    let runtime = match runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let session = session.unwrap_or_else(|| format!("chat-{}", Uuid::new_v4()));

    runtime.block_on(async {
        let app = match bootstrap(LoadOptions::default(), Arc::new(TracingAuditSink)).await {
            Ok(app) => app,
            Err(error) => return bootstrap_failure("chat", &error),
        };

        let input = BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        let result =
            converse(&app.orchestrator, &session, email.as_deref(), input, &mut output).await;
        if let Some(pool) = &app.db_pool {
            pool.close().await;
        }

        match result {
            Ok(answered) => CommandResult::success(
                "chat",
                format!("session `{session}` closed after {answered} answered turn(s)"),
            ),
            Err(error) => CommandResult::failure(
                "chat",
                "io",
                format!("chat terminal failed: {error}"),
                exit::RUNTIME,
            ),
        }
    })
}

/// Runs the read-answer loop until EOF or `/quit`. Returns the number of answered turns.
pub async fn converse<R, W>(
    orchestrator: &Orchestrator,
    session: &str,
    email: Option<&str>,
    input: R,
    output: &mut W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("session `{session}`; type /quit to leave\n").as_bytes())
        .await?;
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            break;
        }

        let reply = match orchestrator.handle(request(session, text, email)).await {
            Ok(answer) => {
                answered += 1;
                render_answer(&answer)
            }
            Err(failure) => format!("{} [{}]", failure.user_message(), failure.cause.kind()),
        };
        output.write_all(format!("{reply}\n\n").as_bytes()).await?;
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use telroute_agent::bootstrap_with_config;
    use telroute_core::audit::NoopAuditSink;
    use telroute_core::config::AppConfig;
    use telroute_core::domain::session::SessionId;

    use super::converse;

    #[tokio::test]
    async fn chat_answers_each_line_within_one_session() {
        let app = bootstrap_with_config(AppConfig::default(), Arc::new(NoopAuditSink))
            .await
            .expect("bootstrap");
        let input: &[u8] = b"why was I charged twice on my bill\n\nmy internet signal keeps dropping\n/quit\nnever read\n";
        let mut output = Vec::new();

        let answered =
            converse(&app.orchestrator, "chat-test", None, input, &mut output).await.expect("converse");

        assert_eq!(answered, 2);
        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("source: billing"));
        assert!(transcript.contains("source: network"));

        let session = app
            .orchestrator
            .sessions()
            .snapshot(&SessionId::new("chat-test"))
            .await
            .expect("snapshot")
            .expect("session exists");
        assert_eq!(session.turn_count(), 2);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped_until_eof() {
        let app = bootstrap_with_config(AppConfig::default(), Arc::new(NoopAuditSink))
            .await
            .expect("bootstrap");
        let input: &[u8] = b"\n   \n";
        let mut output = Vec::new();

        let answered =
            converse(&app.orchestrator, "chat-idle", None, input, &mut output).await.expect("converse");

        assert_eq!(answered, 0);
        let transcript = String::from_utf8(output).expect("utf8");
        assert_eq!(transcript.matches("you> ").count(), 3);
        assert_eq!(app.orchestrator.sessions().live_sessions().await, 0);
    }
}
