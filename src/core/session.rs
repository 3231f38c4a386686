//! Session store
//!
//! Maps an opaque session identifier to conversation state: per-agent-app
//! provider session tokens and the omni dialog history. Sessions are created
//! implicitly on first use and live until the embedder evicts them together
//! with the caller's own session; there is no explicit deletion API.
//!
//! The store is safe for concurrent use across different sessions. Requests
//! for the *same* session are assumed to be serialized by the surrounding
//! transport layer, so no per-entry locking beyond the map shard lock is
//! needed.

use crate::core::types::ConversationTurn;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

/// State held for one caller session
#[derive(Debug, Clone, Default)]
pub struct SessionEntry {
    /// Provider-issued session tokens, keyed by agent app name
    pub tokens: HashMap<String, String>,
    /// Omni dialog history; append-only, never reordered or truncated
    pub history: Vec<ConversationTurn>,
    /// Creation time of the entry
    pub created_at: Option<DateTime<Utc>>,
}

/// Thread-safe session-id-keyed store
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: DashMap<String, SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider session token for the given agent app, if one was issued
    pub fn agent_token(&self, session_id: &str, app: &str) -> Option<String> {
        self.entries
            .get(session_id)
            .and_then(|e| e.tokens.get(app).cloned())
    }

    /// Store a freshly issued provider session token
    pub fn set_agent_token(&self, session_id: &str, app: &str, token: String) {
        let mut entry = self.entries.entry(session_id.to_string()).or_insert_with(|| {
            SessionEntry {
                created_at: Some(Utc::now()),
                ..Default::default()
            }
        });
        entry.tokens.insert(app.to_string(), token);
    }

    /// Snapshot of the session's dialog history
    pub fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.entries
            .get(session_id)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    /// Append one turn to the session's dialog history
    pub fn append_history(&self, session_id: &str, turn: ConversationTurn) {
        let mut entry = self.entries.entry(session_id.to_string()).or_insert_with(|| {
            SessionEntry {
                created_at: Some(Utc::now()),
                ..Default::default()
            }
        });
        entry.history.push(turn);
    }

    /// Number of turns currently recorded for the session
    pub fn history_len(&self, session_id: &str) -> usize {
        self.entries
            .get(session_id)
            .map(|e| e.history.len())
            .unwrap_or(0)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
