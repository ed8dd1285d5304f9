//! Session module - Session registry and conversation state
//!
//! This module provides the session registry for Colloquy, including:
//! - In-memory session map with async access
//! - Lazy loading of prior history from a [`SessionStore`]
//! - Session lookup, listing, and eviction
//!
//! # Example
//!
//! ```
//! use colloquy::session::{Message, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new_memory();
//!
//!     let session = registry.get_or_create("user-1").await;
//!     session.lock().await.push(Message::user("Hello!"));
//!
//!     let again = registry.get_or_create("user-1").await;
//!     assert_eq!(again.snapshot().await.len(), 1);
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, ToolCall, SUMMARY_MESSAGE_FLAG};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::{MemoryStore, SessionStore};

/// Registry mapping session ids to live sessions.
///
/// # Locking
///
/// The registry lock guards only the id → session map. It is never held
/// while a store read runs or while a session lock is taken, so slow
/// persistence or a long exchange on one session cannot stall lookups for
/// the others.
///
/// # Thread Safety
///
/// The registry uses `Arc<RwLock>` internally, making it cheap to clone and
/// share across async tasks.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    store: Arc<dyn SessionStore>,
}

impl SessionRegistry {
    /// Create a registry that loads and persists through `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Create a registry over a fresh [`MemoryStore`].
    pub fn new_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The persistence capability sessions are loaded from.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Get an existing session or create a new one.
    ///
    /// If the session is in memory it is returned immediately. Otherwise the
    /// store is asked for prior history; a miss or a read failure yields an
    /// empty session (failures are logged). When two callers race on the same
    /// new id, the first one to install wins and both get that session.
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return Arc::clone(session);
            }
        }

        let history = match self.store.read(id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to load session history, starting empty");
                Vec::new()
            }
        };
        debug!(session_id = %id, messages = history.len(), "Session loaded");

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Session::with_messages(id, history)));
        Arc::clone(session)
    }

    /// Get an in-memory session without creating or loading it.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Drop the in-memory entry for `id`. Persisted state is untouched.
    ///
    /// Returns `true` if a session was removed.
    pub async fn clear(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Drop every in-memory session (does not affect the store).
    pub async fn clear_all(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    /// Snapshot of the ids currently in memory, sorted.
    pub async fn list(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of sessions in memory.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are in memory.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionRegistry {
    /// Creates a registry over an in-memory store.
    fn default() -> Self {
        Self::new_memory()
    }
}
