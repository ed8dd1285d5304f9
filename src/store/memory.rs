//! In-memory session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::error::Result;
use crate::session::Message;

/// Process-local [`SessionStore`] backed by a map.
///
/// Every write stores a copy and every read hands one out, so callers never
/// share history buffers with the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn write(&self, id: &str, messages: &[Message]) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Vec<Message>> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned().unwrap_or_default())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut keys: Vec<String> = records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
