use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::answer::Answer;
use crate::domain::intent::{Intent, ProviderId};
use crate::domain::query::Query;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Longest answer excerpt carried forward into classifier context.
pub const CONTEXT_EXCERPT_CHARS: usize = 280;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub query_text: String,
    pub intent: Intent,
    pub source_provider: ProviderId,
    pub answer_excerpt: String,
}

/// Bounded window of recent turns fed to the classifier and providers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    window: usize,
    recent: VecDeque<ContextEntry>,
    last_intent: Option<Intent>,
}

impl SessionContext {
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1), recent: VecDeque::new(), last_intent: None }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn recent(&self) -> impl Iterator<Item = &ContextEntry> {
        self.recent.iter()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    pub fn last_intent(&self) -> Option<Intent> {
        self.last_intent
    }

    pub fn push(&mut self, entry: ContextEntry) {
        if entry.intent.is_routable() {
            self.last_intent = Some(entry.intent);
        }
        self.recent.push_back(entry);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
    }

    /// Re-applies a (possibly smaller) window, evicting the oldest entries.
    pub fn resize(&mut self, window: usize) {
        self.window = window.max(1);
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
    }

    /// Plain-text transcript used as prompt context by model-backed components.
    pub fn transcript(&self) -> String {
        self.recent
            .iter()
            .map(|entry| format!("Customer: {}\nAssistant: {}", entry.query_text, entry.answer_excerpt))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: Query,
    pub intent: Intent,
    pub answer: Answer,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("query belongs to session `{found}` but was appended to `{expected}`")]
    SessionMismatch { expected: SessionId, found: SessionId },
    #[error("turn submitted at {submitted_at} precedes the last turn at {last_submitted_at}")]
    OutOfOrder { submitted_at: DateTime<Utc>, last_submitted_at: DateTime<Utc> },
    #[error("query `{0}` already has an answer in this session")]
    DuplicateQuery(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    turns: Vec<Turn>,
    context: SessionContext,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, context_window: usize, now: DateTime<Utc>) -> Self {
        Self {
            id,
            turns: Vec::new(),
            context: SessionContext::new(context_window),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Rebuilds a session from persisted turns, replaying them through the context window.
    pub fn restore(
        id: SessionId,
        turns: Vec<Turn>,
        context_window: usize,
        created_at: DateTime<Utc>,
        last_active_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(id, context_window, created_at);
        for turn in turns {
            session.append_turn(turn)?;
        }
        session.last_active_at = last_active_at.max(session.last_active_at);
        Ok(session)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn set_context_window(&mut self, window: usize) {
        self.context.resize(window);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = self.last_active_at.max(now);
    }

    pub fn is_idle(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> bool {
        now - self.last_active_at > max_idle
    }

    /// Appends an answered turn. The log is append-only and ordered by submission time.
    pub fn append_turn(&mut self, turn: Turn) -> Result<(), SessionError> {
        if turn.query.session_id != self.id {
            return Err(SessionError::SessionMismatch {
                expected: self.id.clone(),
                found: turn.query.session_id.clone(),
            });
        }
        if let Some(last) = self.turns.last() {
            if turn.query.submitted_at < last.query.submitted_at {
                return Err(SessionError::OutOfOrder {
                    submitted_at: turn.query.submitted_at,
                    last_submitted_at: last.query.submitted_at,
                });
            }
        }
        if self.turns.iter().any(|existing| existing.query.id == turn.query.id) {
            return Err(SessionError::DuplicateQuery(turn.query.id.0.clone()));
        }

        self.context.push(ContextEntry {
            query_text: turn.query.text.clone(),
            intent: turn.intent,
            source_provider: turn.answer.source_provider.clone(),
            answer_excerpt: excerpt(&turn.answer.text, CONTEXT_EXCERPT_CHARS),
        });
        self.touch(turn.answered_at);
        self.turns.push(turn);
        Ok(())
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}
