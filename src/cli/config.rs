//! Config init/check command handlers.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use colloquy::config::validate::DiagnosticLevel;
use colloquy::config::Config;

use super::ConfigAction;

/// Create or validate a configuration file.
///
/// `global_path` is the `--config` flag, used when the action names no file.
pub(crate) async fn cmd_config(action: ConfigAction, global_path: Option<PathBuf>) -> Result<()> {
    match action {
        ConfigAction::Init { path } => {
            let path = path.or(global_path).unwrap_or_else(Config::path);
            Config::save_default(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Generated default configuration file: {}", path.display());
            println!("Set model.api_key (or export COLLOQUY_MODEL_API_KEY) before chatting.");
        }
        ConfigAction::Check { path } => {
            let path = path.or(global_path).unwrap_or_else(Config::path);
            println!("Config file: {}", path.display());

            if !path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let diagnostics = match Config::check_file(&path) {
                Ok(d) => d,
                Err(e) => {
                    println!("[ERROR] Unreadable config: {}", e);
                    bail!("invalid configuration file");
                }
            };
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
            if errors > 0 {
                bail!("configuration has {} error(s)", errors);
            }
        }
    }
    Ok(())
}
