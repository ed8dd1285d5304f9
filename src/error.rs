//! Error types for Colloquy
//!
//! This module defines all error types used throughout the crate. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! The conversation core distinguishes three failure classes:
//!
//! - [`ColloquyError::Precondition`]: a capability broke its contract (e.g. a
//!   token counter returned the wrong number of estimates). Fatal to the
//!   operation that observed it.
//! - [`ColloquyError::Execution`]: the agent executor failed to start or never
//!   produced a terminal reply. The session is left intact for a retry.
//! - [`ColloquyError::Persistence`]: a store read/write failed. The
//!   orchestrator logs these and carries on; they are only surfaced by the
//!   store API itself.

use thiserror::Error;

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Colloquy operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A capability violated its contract.
    #[error("Precondition violation: {0}")]
    Precondition(String),

    /// The agent executor failed or yielded no terminal response.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Session store read/write failures
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Summary generation failures during compaction
    #[error("Summarizer error: {0}")]
    Summarizer(String),

    /// Resource not found (sessions, config files, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ColloquyError {
    /// Returns `true` for contract violations that must abort the current
    /// operation instead of degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ColloquyError::Precondition(_))
    }

    /// Re-classify any error as an [`ColloquyError::Execution`] failure,
    /// keeping existing execution errors as they are.
    pub fn into_execution(self) -> Self {
        match self {
            ColloquyError::Execution(_) => self,
            other => ColloquyError::Execution(other.to_string()),
        }
    }
}

/// A specialized `Result` type for Colloquy operations.
pub type Result<T> = std::result::Result<T, ColloquyError>;
