use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use telroute_core::config::SessionConfig;
use telroute_core::domain::session::{Session, SessionId, Turn};
use telroute_core::errors::FailureCause;
use telroute_db::repositories::{InMemorySessionRepository, RepositoryError, SessionRepository};

/// Owns every live session. Each session sits behind its own mutex; holding the
/// guard for a whole query serialises queries within a session while other
/// sessions proceed independently.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    repository: Arc<dyn SessionRepository>,
    context_window: usize,
    idle_timeout: chrono::Duration,
}

impl SessionManager {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        context_window: usize,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            repository,
            context_window: context_window.max(1),
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    pub fn from_config(repository: Arc<dyn SessionRepository>, config: &SessionConfig) -> Self {
        Self::new(repository, config.context_window, Duration::from_secs(config.idle_timeout_secs))
    }

    pub fn in_memory(context_window: usize, idle_timeout: Duration) -> Self {
        Self::new(Arc::new(InMemorySessionRepository::default()), context_window, idle_timeout)
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Locks the session for exclusive use, loading it from the store or creating it
    /// on first sight. Waiters are served in arrival order. The session map is never
    /// locked across a store call.
    pub async fn acquire(&self, id: &SessionId) -> Result<OwnedMutexGuard<Session>, RepositoryError> {
        loop {
            let existing = self.sessions.read().await.get(id).cloned();
            let slot = match existing {
                Some(slot) => slot,
                None => {
                    let loaded = self.load_or_create(id).await?;
                    let mut sessions = self.sessions.write().await;
                    Arc::clone(
                        sessions.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(loaded))),
                    )
                }
            };

            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_live(id, &slot).await {
                return Ok(guard);
            }
            debug!(event_name = "session.acquire_retry", session_id = %id, "session evicted while waiting");
        }
    }

    async fn load_or_create(&self, id: &SessionId) -> Result<Session, RepositoryError> {
        Ok(match self.repository.load(id).await? {
            Some(mut stored) => {
                stored.set_context_window(self.context_window);
                debug!(
                    event_name = "session.restored",
                    session_id = %id,
                    turns = stored.turn_count(),
                    "session restored from store"
                );
                stored
            }
            None => {
                debug!(event_name = "session.created", session_id = %id, "new session");
                Session::new(id.clone(), self.context_window, Utc::now())
            }
        })
    }

    async fn is_live(&self, id: &SessionId, slot: &Arc<Mutex<Session>>) -> bool {
        self.sessions.read().await.get(id).is_some_and(|live| Arc::ptr_eq(live, slot))
    }

    /// Appends an answered turn and persists it. The live session only changes once
    /// the store has accepted the turn.
    pub async fn commit(&self, session: &mut Session, turn: Turn) -> Result<(), FailureCause> {
        let mut next = session.clone();
        next.append_turn(turn.clone())?;
        next.touch(turn.answered_at);
        self.repository
            .record_turn(&next, &turn)
            .await
            .map_err(|error| FailureCause::Store(error.to_string()))?;
        *session = next;
        Ok(())
    }

    /// Copy of the session as it stands, waiting for any in-flight query to finish.
    pub async fn snapshot(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let existing = self.sessions.read().await.get(id).cloned();
        match existing {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => self.repository.load(id).await,
        }
    }

    pub async fn live_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ends sessions idle longer than the configured timeout, dropping them from
    /// the store and then from memory. Sessions with a query in flight are kept.
    /// Expired sessions stay locked until both are gone, so a query that was
    /// waiting on one starts a fresh session instead.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<(SessionId, Arc<Mutex<Session>>, OwnedMutexGuard<Session>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter_map(|(id, slot)| {
                    let guard = Arc::clone(slot).try_lock_owned().ok()?;
                    guard
                        .is_idle(now, self.idle_timeout)
                        .then(|| (id.clone(), Arc::clone(slot), guard))
                })
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        for (id, _, _) in &expired {
            if let Err(error) = self.repository.delete(id).await {
                warn!(
                    event_name = "session.evict_store_failed",
                    session_id = %id,
                    error = %error,
                    "evicted session could not be removed from the store"
                );
            }
        }

        {
            let mut sessions = self.sessions.write().await;
            for (id, slot, _) in &expired {
                if sessions.get(id).is_some_and(|live| Arc::ptr_eq(live, slot)) {
                    sessions.remove(id);
                }
            }
        }

        let count = expired.len();
        drop(expired);
        info!(event_name = "session.evicted", count, "idle sessions evicted");
        count
    }
}
