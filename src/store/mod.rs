//! Session persistence
//!
//! The conversation core only relies on the read/write contract defined by
//! [`SessionStore`]. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local map, useful for tests and ephemeral use
//! - [`FileStore`]: one JSON document per session in a directory
//!
//! # Example
//!
//! ```
//! use colloquy::session::Message;
//! use colloquy::store::{MemoryStore, SessionStore};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.write("user-1", &[Message::user("hi")]).await.unwrap();
//! assert_eq!(store.read("user-1").await.unwrap().len(), 1);
//! assert!(store.read("missing").await.unwrap().is_empty());
//! # });
//! ```

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{expand_home, Config, MemoryConfig, StoreBackend};
use crate::error::Result;
use crate::session::Message;

/// Persistence capability for session histories.
///
/// Implementations must round-trip the full [`Message`] shape, including tool
/// calls and the `extra` annotations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replace the stored history for `id`.
    async fn write(&self, id: &str, messages: &[Message]) -> Result<()>;

    /// Read the stored history for `id`.
    ///
    /// A session that was never written yields an empty list, not an error.
    async fn read(&self, id: &str) -> Result<Vec<Message>>;

    /// Ids of every stored session, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Build the store selected by the `memory` config section.
///
/// The file backend defaults to `~/.colloquy/sessions` when no path is set.
pub fn create_store(cfg: &MemoryConfig) -> Result<Arc<dyn SessionStore>> {
    match cfg.backend {
        StoreBackend::Memory => {
            info!(backend = "memory", "Session store initialized");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::File => {
            let path = cfg
                .path
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(|| Config::dir().join("sessions"));
            let store = FileStore::new(path.clone())?;
            info!(backend = "file", path = %path.display(), "Session store initialized");
            Ok(Arc::new(store))
        }
    }
}
