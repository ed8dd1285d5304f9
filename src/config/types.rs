//! Configuration type definitions for Colloquy
//!
//! All types implement serde traits for JSON/YAML serialization and have
//! sensible defaults, so a partial config file only needs the fields it
//! changes.

use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};

/// Main configuration struct for Colloquy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor endpoint and model parameters
    pub model: ModelConfig,
    /// Conversation behavior (system prompt, history window, streaming)
    pub agent: AgentConfig,
    /// Session persistence
    pub memory: MemoryConfig,
    /// History compaction
    pub compaction: CompactionConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI-compatible API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Executor endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API key; usually supplied via `COLLOQUY_MODEL_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Maximum tokens per reply (provider default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature (provider default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            temperature: None,
        }
    }
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Conversation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt sent ahead of history; empty sends none
    pub system_prompt: String,
    /// Conversation turns sent to the executor; 0 sends the full history
    pub max_history: usize,
    /// Capacity of the streamed reply queue
    pub stream_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: crate::agent::DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history: 0,
            stream_buffer: crate::agent::DEFAULT_STREAM_CAPACITY,
        }
    }
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Session store backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// One JSON file per session.
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(ColloquyError::Config(format!(
                "unknown memory backend '{}' (expected 'memory' or 'file')",
                other
            ))),
        }
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Store backend to use.
    pub backend: StoreBackend,
    /// Directory for the file backend (defaults to `~/.colloquy/sessions`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// History compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Compact automatically before each exchange.
    pub enabled: bool,
    /// Total history tokens above which compaction runs.
    pub max_tokens_before_summary: u64,
    /// Token budget for history kept verbatim.
    pub max_tokens_for_recent_messages: u64,
    /// Replace summarized history with the summary.
    pub splice_summary: bool,
    /// System prompt for the summarizer (built-in prompt when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_prompt: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens_before_summary: 2000,
            max_tokens_for_recent_messages: 500,
            splice_summary: true,
            summary_prompt: None,
        }
    }
}

impl CompactionConfig {
    /// Reject budgets a compactor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_before_summary == 0 {
            return Err(ColloquyError::Config(
                "compaction.max_tokens_before_summary must be positive".into(),
            ));
        }
        if self.max_tokens_for_recent_messages == 0 {
            return Err(ColloquyError::Config(
                "compaction.max_tokens_for_recent_messages must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Compact single-line output with a `component` field.
    #[default]
    Component,
    /// JSON lines.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "component" => Ok(Self::Component),
            "json" => Ok(Self::Json),
            other => Err(ColloquyError::Config(format!(
                "unknown log format '{}'",
                other
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `colloquy=debug`. `RUST_LOG` wins.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Component,
            file: None,
        }
    }
}
