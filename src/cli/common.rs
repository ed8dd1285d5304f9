//! Shared CLI helpers used across multiple command handlers.

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use colloquy::agent::{HistoryCompactor, Orchestrator};
use colloquy::config::Config;
use colloquy::executor::{AgentExecutor, ExecutorSummarizer, OpenAiExecutor};

/// Read a line from stdin, trimming whitespace. `None` on EOF.
pub(crate) fn read_line() -> Result<Option<String>> {
    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .with_context(|| "Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Load the config from `path`, or from `~/.colloquy/config.json`.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::load().with_context(|| "Failed to load configuration"),
    }
}

/// Build an orchestrator backed by the configured OpenAI-compatible executor.
///
/// With `with_compactor` the compactor is attached even when automatic
/// compaction is disabled, so explicit compaction still works.
pub(crate) fn create_orchestrator(config: &Config, with_compactor: bool) -> Result<Orchestrator> {
    let executor: Arc<dyn AgentExecutor> = Arc::new(
        OpenAiExecutor::from_config(&config.model)
            .with_context(|| format!("No API key; add it to {:?}", Config::path()))?,
    );

    let mut orchestrator = Orchestrator::from_config(config, executor.clone())?;
    if with_compactor && !config.compaction.enabled {
        let summarizer = ExecutorSummarizer::from_config(&config.compaction, executor);
        let compactor = HistoryCompactor::new(config.compaction.clone(), Arc::new(summarizer))
            .with_context(|| "Invalid compaction settings")?;
        orchestrator = orchestrator.with_compactor(compactor, false);
    }
    Ok(orchestrator)
}

/// Warn when the memory backend means nothing outlives this process.
pub(crate) fn warn_if_ephemeral(config: &Config) {
    if config.memory.backend == colloquy::config::StoreBackend::Memory {
        eprintln!("Note: memory.backend is 'memory'; sessions are not kept between runs.");
        eprintln!("Set memory.backend to 'file' (or COLLOQUY_MEMORY_BACKEND=file) to persist them.");
        eprintln!();
    }
}
