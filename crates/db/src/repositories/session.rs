use chrono::{DateTime, Utc};
use sqlx::Row;

use telroute_core::domain::session::{Session, SessionId, Turn};

use super::{storable_turn, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, RepositoryError> {
    let payload: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let Some(state) = sqlx::query(
            "SELECT id, context_window, created_at, last_active_at
             FROM session_state WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let context_window: i64 =
            state.try_get("context_window").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let created_at_str: String =
            state.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let last_active_at_str: String =
            state.try_get("last_active_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT payload_json FROM session_turn
             WHERE session_id = ? ORDER BY turn_number ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;
        let turns = rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()?;

        let window = usize::try_from(context_window)
            .map_err(|e| RepositoryError::Decode(format!("context_window: {e}")))?;
        Session::restore(
            id.clone(),
            turns,
            window,
            parse_timestamp("created_at", &created_at_str)?,
            parse_timestamp("last_active_at", &last_active_at_str)?,
        )
        .map(Some)
        .map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn record_turn(&self, session: &Session, turn: &Turn) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&storable_turn(turn))
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let window = i64::try_from(session.context().window())
            .map_err(|e| RepositoryError::Decode(format!("context_window: {e}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO session_state (id, context_window, created_at, last_active_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 context_window = excluded.context_window,
                 last_active_at = excluded.last_active_at",
        )
        .bind(&session.id.0)
        .bind(window)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_active_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let next_turn: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(turn_number) + 1, 0) FROM session_turn WHERE session_id = ?",
        )
        .bind(&session.id.0)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO session_turn (session_id, turn_number, query_id, intent, source_provider,
                                       submitted_at, answered_at, payload_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(next_turn)
        .bind(&turn.query.id.0)
        .bind(turn.intent.as_key())
        .bind(turn.answer.source_provider.as_str())
        .bind(turn.query.submitted_at.to_rfc3339())
        .bind(turn.answered_at.to_rfc3339())
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM session_state WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use telroute_core::domain::answer::Answer;
    use telroute_core::domain::intent::{Intent, ProviderId};
    use telroute_core::domain::query::{Query, QueryRequest};
    use telroute_core::domain::session::{Session, SessionContext, SessionId, Turn};

    use super::SqlSessionRepository;
    use crate::repositories::{InMemorySessionRepository, SessionRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn answered_turn(session: &Session, text: &str, intent: Intent, offset_secs: i64) -> Turn {
        let mut request = QueryRequest::new(session.id.0.clone(), text);
        request.timestamp = session.created_at + Duration::seconds(offset_secs);
        let query = Query::from_request(request, Some(session.context().clone()));
        Turn {
            query,
            intent,
            answer: Answer::text_only(ProviderId::new(intent.as_key()), format!("re: {text}")),
            answered_at: session.created_at + Duration::seconds(offset_secs + 1),
        }
    }

    async fn append(repo: &dyn SessionRepository, session: &mut Session, turn: Turn) {
        session.append_turn(turn.clone()).expect("append in memory");
        repo.record_turn(session, &turn).await.expect("record turn");
    }

    #[tokio::test]
    async fn recorded_turns_restore_in_order() {
        let repo = SqlSessionRepository::new(setup().await);
        let mut session = Session::new(SessionId::new("sess-1"), 3, Utc::now());

        let first = answered_turn(&session, "why is my bill so high", Intent::Billing, 0);
        append(&repo, &mut session, first).await;
        let second = answered_turn(&session, "my data is slow", Intent::Network, 10);
        append(&repo, &mut session, second).await;

        let restored = repo
            .load(&SessionId::new("sess-1"))
            .await
            .expect("load")
            .expect("session should exist");

        assert_eq!(restored.turn_count(), 2);
        assert_eq!(restored.turns()[0].query.text, "why is my bill so high");
        assert_eq!(restored.turns()[1].intent, Intent::Network);
        assert_eq!(restored.context().window(), 3);
        assert_eq!(restored.context().last_intent(), Some(Intent::Network));
        assert!(restored.turns().iter().all(|turn| turn.query.context.is_none()));
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let repo = SqlSessionRepository::new(setup().await);
        let loaded = repo.load(&SessionId::new("nobody")).await.expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn duplicate_query_id_is_rejected_by_the_store() {
        let repo = SqlSessionRepository::new(setup().await);
        let mut session = Session::new(SessionId::new("sess-dup"), 4, Utc::now());
        let turn = answered_turn(&session, "which plan is best", Intent::PlanRecommendation, 0);
        append(&repo, &mut session, turn.clone()).await;

        let result = repo.record_turn(&session, &turn).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_cascades_to_turns() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool.clone());
        let mut session = Session::new(SessionId::new("sess-del"), 4, Utc::now());
        let turn = answered_turn(&session, "how do I set up esim", Intent::TechnicalSupport, 0);
        append(&repo, &mut session, turn).await;

        assert!(repo.delete(&SessionId::new("sess-del")).await.expect("delete"));
        assert!(!repo.delete(&SessionId::new("sess-del")).await.expect("second delete"));

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_turn")
            .fetch_one(&pool)
            .await
            .expect("count turns");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn in_memory_repository_matches_sql_behaviour() {
        let repo = InMemorySessionRepository::default();
        let mut session = Session::new(SessionId::new("sess-mem"), 1, Utc::now());
        let first = answered_turn(&session, "bill question", Intent::Billing, 0);
        append(&repo, &mut session, first).await;
        let second = answered_turn(&session, "signal drops", Intent::Network, 5);
        append(&repo, &mut session, second).await;

        let restored = repo.load(&session.id).await.expect("load").expect("exists");
        assert_eq!(restored.turn_count(), 2);
        assert_eq!(restored.context().len(), 1);
        assert_eq!(repo.len().await, 1);

        let context: &SessionContext = restored.context();
        assert_eq!(context.recent().next().map(|entry| entry.query_text.as_str()), Some("signal drops"));
    }
}
