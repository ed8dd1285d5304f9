//! Logging initialization for Colloquy.
//!
//! Supports three formats:
//! - `pretty`: multi-line, human-readable output
//! - `component`: compact `[timestamp] [LEVEL] target message {fields}` lines;
//!   use the [`log_component!`] macro to add a `component` field for
//!   per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{expand_home, LogFormat, LoggingConfig};
use crate::error::{ColloquyError, Result};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` takes precedence over `cfg.level`. When `cfg.file` is set,
/// events are appended to that file without ANSI colours.
///
/// # Errors
///
/// Fails if the level directive does not parse, the log file cannot be
/// opened, or a global subscriber is already installed.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level).map_err(|e| {
            ColloquyError::Config(format!("invalid logging.level '{}': {}", cfg.level, e))
        })?,
    };

    let file = match &cfg.file {
        Some(path) => {
            let path = expand_home(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Some(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)?,
            )
        }
        None => None,
    };

    install(cfg.format, filter, file)
        .map_err(|e| ColloquyError::Config(format!("failed to install log subscriber: {}", e)))
}

type InitResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn install(format: LogFormat, filter: EnvFilter, file: Option<File>) -> InitResult {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match (format, file) {
        (LogFormat::Json, Some(file)) => builder
            .json()
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(file)) => builder
            .pretty()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        // Component-tagged events come from `log_component!`, which adds a
        // structured `component` field; the compact formatter prints it.
        (LogFormat::Component, Some(file)) => builder
            .compact()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (LogFormat::Component, None) => builder.compact().with_writer(std::io::stderr).try_init(),
    }
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use colloquy::log_component;
/// log_component!(info, "orchestrator", "exchange complete");
/// log_component!(warn, "compaction", "summary skipped", tokens = 8000u64, limit = 2000u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
