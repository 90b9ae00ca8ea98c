//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the bot with in-memory implementations.

use crate::db::Database;
use crate::dialog::SessionState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage for suspended sessions, keyed by conversation id
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the saved session, if the conversation has one
    async fn load(&self, conv_id: &str) -> Result<Option<SessionState>, String>;

    /// Replace the saved session
    async fn save(&self, conv_id: &str, state: &SessionState) -> Result<(), String>;

    /// Forget the conversation
    async fn delete(&self, conv_id: &str) -> Result<(), String>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load(&self, conv_id: &str) -> Result<Option<SessionState>, String> {
        (**self).load(conv_id).await
    }

    async fn save(&self, conv_id: &str, state: &SessionState) -> Result<(), String> {
        (**self).save(conv_id, state).await
    }

    async fn delete(&self, conv_id: &str) -> Result<(), String> {
        (**self).delete(conv_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `StateStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for DatabaseStorage {
    async fn load(&self, conv_id: &str) -> Result<Option<SessionState>, String> {
        self.db
            .get_session(conv_id)
            .map(|stored| stored.map(|s| s.state))
            .map_err(|e| e.to_string())
    }

    async fn save(&self, conv_id: &str, state: &SessionState) -> Result<(), String> {
        self.db
            .save_session(conv_id, state)
            .map_err(|e| e.to_string())
    }

    async fn delete(&self, conv_id: &str) -> Result<(), String> {
        self.db
            .delete_session(conv_id)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Process-local store. Sessions are kept serialized so every load goes
/// through the same round trip a real store would.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw serialized form of a conversation's session
    pub fn raw(&self, conv_id: &str) -> Option<String> {
        self.sessions.lock().unwrap().get(conv_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, conv_id: &str) -> Result<Option<SessionState>, String> {
        self.raw(conv_id)
            .map(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
            .transpose()
    }

    async fn save(&self, conv_id: &str, state: &SessionState) -> Result<(), String> {
        let json = serde_json::to_string(state).map_err(|e| e.to_string())?;
        self.sessions
            .lock()
            .unwrap()
            .insert(conv_id.to_string(), json);
        Ok(())
    }

    async fn delete(&self, conv_id: &str) -> Result<(), String> {
        self.sessions.lock().unwrap().remove(conv_id);
        Ok(())
    }
}
