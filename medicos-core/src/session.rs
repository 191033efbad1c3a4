use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::gateway::ChatHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
    System,
}

/// One displayed chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub message: String,
}

impl HistoryEntry {
    pub fn new(role: Role, message: impl Into<String>) -> Self {
        Self {
            role,
            message: message.into(),
        }
    }
}

/// Per-user conversation memory.
#[derive(Debug)]
pub struct ConversationState {
    pub chat: ChatHandle,
    history: Vec<HistoryEntry>,
    pub current_symptom: Option<String>,
    last_active: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(chat: ChatHandle) -> Self {
        Self {
            chat,
            history: Vec::new(),
            current_symptom: None,
            last_active: Utc::now(),
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Appends a completed turn: the user's message followed by the reply.
    pub fn record_turn(&mut self, user_input: &str, reply_role: Role, reply: &str) {
        self.history.push(HistoryEntry::new(Role::User, user_input));
        self.history.push(HistoryEntry::new(reply_role, reply));
        self.last_active = Utc::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chat_history: self.history.clone(),
            current_symptom: self.current_symptom.clone(),
        }
    }
}

/// Read-only copy of a user's history and context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub chat_history: Vec<HistoryEntry>,
    pub current_symptom: Option<String>,
}

pub type SharedConversation = Arc<Mutex<ConversationState>>;

/// Process-wide map from user id to conversation state.
///
/// Each state sits behind its own async mutex so turns for the same user run
/// one at a time while different users proceed concurrently. Nothing is
/// persisted; all state is lost when the process exits.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SharedConversation>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's state, creating it with `create` on first use.
    pub fn get_or_create(
        &self,
        user_id: &str,
        create: impl FnOnce() -> ConversationState,
    ) -> SharedConversation {
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id = %user_id, "Creating conversation state");
                Arc::new(Mutex::new(create()))
            })
            .clone()
    }

    pub fn get(&self, user_id: &str) -> Option<SharedConversation> {
        self.sessions.get(user_id).map(|entry| entry.clone())
    }

    /// History and context for `user_id`; empty for unknown users.
    pub async fn snapshot(&self, user_id: &str) -> SessionSnapshot {
        match self.get(user_id) {
            Some(state) => state.lock().await.snapshot(),
            None => SessionSnapshot::default(),
        }
    }

    /// Drops the user's state. Returns whether anything was removed.
    pub fn clear(&self, user_id: &str) -> bool {
        let removed = self.sessions.remove(user_id).is_some();
        if removed {
            info!(user_id = %user_id, "Conversation state cleared");
        }
        removed
    }

    /// Removes sessions idle for at least `max_idle`. Sessions with a turn in
    /// flight are skipped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();

        self.sessions.retain(|_, state| match state.try_lock() {
            Ok(state) => (now - state.last_active()).to_std().unwrap_or_default() < max_idle,
            Err(_) => true,
        });

        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayOptions, ModelGateway};
    use crate::testing::ScriptedBackend;

    fn new_state() -> ConversationState {
        let gateway = ModelGateway::new(Arc::new(ScriptedBackend::new()), GatewayOptions::default());
        ConversationState::new(gateway.create_session())
    }

    #[tokio::test]
    async fn creates_state_lazily_and_reuses_it() {
        let store = SessionStore::new();
        assert!(store.get("alice").is_none());

        let first = store.get_or_create("alice", new_state);
        first.lock().await.record_turn("hi", Role::Bot, "hello");

        let second = store.get_or_create("alice", || panic!("state should already exist"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_snapshot_is_empty() {
        let store = SessionStore::new();
        let snapshot = store.snapshot("nobody").await;
        assert!(snapshot.chat_history.is_empty());
        assert!(snapshot.current_symptom.is_none());
    }

    #[tokio::test]
    async fn clear_removes_history_and_context() {
        let store = SessionStore::new();
        {
            let state = store.get_or_create("bob", new_state);
            let mut state = state.lock().await;
            state.record_turn("I have a cough", Role::Bot, "canned");
            state.current_symptom = Some("cough".to_string());
        }

        assert!(store.clear("bob"));
        assert!(!store.clear("bob"));
        assert_eq!(store.snapshot("bob").await, SessionSnapshot::default());
    }

    #[tokio::test]
    async fn evicts_only_idle_unlocked_sessions() {
        let store = SessionStore::new();
        store.get_or_create("idle", new_state);
        let busy = store.get_or_create("busy", new_state);
        let _guard = busy.lock().await;

        assert_eq!(store.evict_idle(Duration::ZERO), 1);
        assert!(store.get("idle").is_none());
        assert!(store.get("busy").is_some());

        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
    }

    #[test]
    fn history_round_trips_through_json() {
        let history = vec![
            HistoryEntry::new(Role::User, "I have a fever"),
            HistoryEntry::new(Role::Bot, "Rest."),
            HistoryEntry::new(Role::User, "and now?"),
            HistoryEntry::new(Role::System, "Error: timeout"),
        ];

        let json = serde_json::to_string(&history).unwrap();
        assert!(json.contains(r#""role":"bot""#));
        let parsed: Vec<HistoryEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, history);
    }
}
