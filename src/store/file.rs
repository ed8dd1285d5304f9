//! File-backed session store.
//!
//! Each session is one pretty-printed JSON document named after the
//! percent-encoded session id, so any id maps to exactly one file and back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SessionStore;
use crate::error::{ColloquyError, Result};
use crate::session::Message;

/// On-disk record for one session.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    key: String,
    messages: Vec<Message>,
    updated_at: DateTime<Utc>,
}

/// [`SessionStore`] that keeps one JSON file per session in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    ///
    /// # Example
    /// ```no_run
    /// use colloquy::store::FileStore;
    /// use std::path::PathBuf;
    ///
    /// let store = FileStore::new(PathBuf::from("/tmp/sessions")).unwrap();
    /// ```
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the session files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn write(&self, id: &str, messages: &[Message]) -> Result<()> {
        let record = SessionRecord {
            key: id.to_string(),
            messages: messages.to_vec(),
            updated_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&record)?;

        // Write-then-rename so a crash never leaves a truncated record behind.
        let path = self.record_path(id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(session_id = %id, messages = messages.len(), "Session written");
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Vec<Message>> {
        let path = self.record_path(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let record: SessionRecord = serde_json::from_str(&content).map_err(|e| {
            ColloquyError::Persistence(format!("corrupt record {}: {}", path.display(), e))
        })?;
        Ok(record.messages)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            // Prefer the key stored in the record; fall back to the file name.
            let key = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<SessionRecord>(&content)
                    .map(|r| r.key)
                    .ok(),
                Err(_) => None,
            };
            let key = key.or_else(|| {
                path.file_stem()
                    .map(|stem| unsanitize_key(&stem.to_string_lossy()))
            });
            if let Some(key) = key {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Sanitize a session key for use as a filename.
///
/// Uses percent-encoding so the mapping is bijective and distinct keys never
/// collide on disk.
///
/// For example:
/// - "web:user123" → "web%3Auser123"
/// - "team/alice" → "team%2Falice"
fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '.' => result.push_str("%2E"),
            '%' => result.push_str("%25"),
            c => result.push(c),
        }
    }
    result
}

/// Inverse of [`sanitize_key`].
fn unsanitize_key(sanitized: &str) -> String {
    let mut result = String::with_capacity(sanitized.len());
    let mut chars = sanitized.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        match u8::from_str_radix(&hex, 16) {
            Ok(byte) if hex.len() == 2 => result.push(byte as char),
            _ => {
                result.push('%');
                result.push_str(&hex);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_key_roundtrip() {
        for key in [
            "plain",
            "web:user123",
            "team/alice",
            "100%",
            "a.b",
            "..",
            "weird<>|?*\"\\",
        ] {
            let sanitized = sanitize_key(key);
            assert!(!sanitized.contains('/'));
            assert!(!sanitized.contains(':'));
            assert_eq!(unsanitize_key(&sanitized), key);
        }
    }

    #[test]
    fn test_sanitize_key_is_injective_on_percent() {
        assert_ne!(sanitize_key("a:b"), sanitize_key("a%3Ab"));
    }

    #[tokio::test]
    async fn test_read_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.read("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let messages = vec![
            Message::user("look up rust"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("t1", "search", r#"{"q":"rust"}"#)],
            ),
            Message::tool_result("t1", "Rust is a language"),
            Message::tool_output("synthetic"),
            Message::summary("earlier: greetings"),
        ];
        store.write("web:user/1", &messages).await.unwrap();

        let back = store.read("web:user/1").await.unwrap();
        assert_eq!(back, messages);
        assert!(back[4].is_summary());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::new(dir.path().to_path_buf()).unwrap();
            store.write("s", &[Message::user("hello")]).await.unwrap();
        }
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.read("s").await.unwrap()[0].content, "hello");
    }

    #[tokio::test]
    async fn test_keys_recover_original_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        store.write("b:2", &[]).await.unwrap();
        store.write("a/1", &[]).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a/1", "b:2"]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let err = store.read("bad").await.unwrap_err();
        assert!(matches!(err, ColloquyError::Persistence(_)));
    }
}
