//! Per-session conversation state.
//!
//! Each session key owns exactly one transcript. A transcript always starts
//! with the system persona turn and otherwise grows by appending in call
//! order. Entries live until removed (ephemeral connections) or until the
//! process exits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message within a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered conversation history for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Start a transcript seeded with the system persona.
    pub fn seeded(persona: &str) -> Self {
        Self {
            turns: vec![Turn::new(Role::System, persona)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Truncate to `len` turns, never dropping the system turn.
    fn truncate(&mut self, len: usize) {
        self.turns.truncate(len.max(1));
    }
}

/// Identity isolating one client's transcript from another's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    /// Fresh random key for a connection that did not name a session.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide map of session key to transcript.
///
/// The map itself is behind a `RwLock`; every transcript has its own `Mutex`,
/// so writes to one session are serialized without blocking other sessions.
pub struct SessionStore {
    persona: String,
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<Transcript>>>>,
}

impl SessionStore {
    /// Create an empty store whose transcripts start with `persona`.
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    async fn existing(&self, key: &SessionKey) -> Option<Arc<Mutex<Transcript>>> {
        self.sessions.read().await.get(key).cloned()
    }

    async fn entry(&self, key: &SessionKey) -> Arc<Mutex<Transcript>> {
        if let Some(transcript) = self.existing(key).await {
            return transcript;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(session = %key, "Transcript created");
                Arc::new(Mutex::new(Transcript::seeded(&self.persona)))
            })
            .clone()
    }

    /// Return the transcript for `key`, creating a seeded one if needed.
    pub async fn get_or_create(&self, key: &SessionKey) -> Transcript {
        let transcript = self.entry(key).await;
        let guard = transcript.lock().await;
        guard.clone()
    }

    /// Append a turn in call order, creating the transcript first if needed.
    pub async fn append(&self, key: &SessionKey, role: Role, content: impl Into<String>) {
        let transcript = self.entry(key).await;
        transcript.lock().await.push(Turn::new(role, content));
    }

    /// Copy of the current turns; empty for an unknown key.
    pub async fn snapshot(&self, key: &SessionKey) -> Vec<Turn> {
        match self.existing(key).await {
            Some(transcript) => transcript.lock().await.turns.clone(),
            None => Vec::new(),
        }
    }

    /// Number of turns; 0 for an unknown key.
    pub async fn len(&self, key: &SessionKey) -> usize {
        match self.existing(key).await {
            Some(transcript) => transcript.lock().await.len(),
            None => 0,
        }
    }

    /// Discard turns appended after a checkpoint taken with [`len`](Self::len).
    pub async fn rollback(&self, key: &SessionKey, len: usize) {
        if let Some(transcript) = self.existing(key).await {
            let mut guard = transcript.lock().await;
            let before = guard.len();
            guard.truncate(len);
            tracing::debug!(session = %key, from = before, to = guard.len(), "Transcript rolled back");
        }
    }

    /// Drop a session; returns whether it existed.
    pub async fn remove(&self, key: &SessionKey) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSONA: &str = "You are a tutor.";

    #[tokio::test]
    async fn test_get_or_create_seeds_system_turn() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("A");

        let transcript = store.get_or_create(&key).await;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.turns()[0], Turn::new(Role::System, PERSONA));

        store.append(&key, Role::User, "hi").await;
        let again = store.get_or_create(&key).await;
        assert_eq!(again.len(), 2);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_append_preserves_call_order() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("A");
        store.get_or_create(&key).await;

        store.append(&key, Role::User, "one").await;
        store.append(&key, Role::Assistant, "two").await;
        store.append(&key, Role::User, "one").await;

        let contents: Vec<_> = store
            .snapshot(&key)
            .await
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec![PERSONA, "one", "two", "one"]);
    }

    #[tokio::test]
    async fn test_append_without_create_seeds_first() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("late");
        store.append(&key, Role::User, "hello").await;

        let snapshot = store.snapshot(&key).await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_snapshot_is_idempotent() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("A");
        store.append(&key, Role::User, "q").await;

        let first = store.snapshot(&key).await;
        let second = store.snapshot(&key).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_key_snapshot_is_empty_and_not_created() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("ghost");
        assert!(store.snapshot(&key).await.is_empty());
        assert_eq!(store.len(&key).await, 0);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(PERSONA);
        let a = SessionKey::from("A");
        let b = SessionKey::from("B");

        store.append(&a, Role::User, "from a").await;
        store.append(&b, Role::User, "from b").await;

        let a_turns = store.snapshot(&a).await;
        let b_turns = store.snapshot(&b).await;
        assert!(a_turns.iter().all(|t| t.content != "from b"));
        assert!(b_turns.iter().all(|t| t.content != "from a"));
        assert_eq!(a_turns.len(), 2);
        assert_eq!(b_turns.len(), 2);
    }

    #[tokio::test]
    async fn test_rollback_never_drops_system_turn() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::from("A");
        store.append(&key, Role::User, "q").await;
        let checkpoint = store.len(&key).await;
        store.append(&key, Role::User, "q2").await;
        store.append(&key, Role::Assistant, "partial").await;

        store.rollback(&key, checkpoint).await;
        assert_eq!(store.len(&key).await, checkpoint);

        store.rollback(&key, 0).await;
        let snapshot = store.snapshot(&key).await;
        assert_eq!(snapshot, vec![Turn::new(Role::System, PERSONA)]);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new(PERSONA);
        let key = SessionKey::generate();
        store.get_or_create(&key).await;
        assert!(store.remove(&key).await);
        assert!(!store.remove(&key).await);
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_on_distinct_keys() {
        let store = Arc::new(SessionStore::new(PERSONA));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = SessionKey::from(format!("s{i}"));
                for n in 0..25 {
                    store.append(&key, Role::User, format!("{n}")).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.session_count().await, 8);
        for i in 0..8 {
            assert_eq!(store.len(&SessionKey::from(format!("s{i}"))).await, 26);
        }
    }

    #[test]
    fn test_role_serialization() {
        let turn = Turn::new(Role::Assistant, "x");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
        assert_eq!(Role::System.to_string(), "system");
    }

    #[test]
    fn test_generated_keys_are_unique() {
        assert_ne!(SessionKey::generate(), SessionKey::generate());
    }
}
