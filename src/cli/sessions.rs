//! Session inspection and maintenance commands.

use anyhow::{Context, Result};

use colloquy::config::Config;
use colloquy::session::{Message, SessionRegistry};
use colloquy::store::create_store;

use super::common::{create_orchestrator, warn_if_ephemeral};

fn print_message(index: usize, message: &Message) {
    let tag = if message.is_summary() {
        format!("{} (summary)", message.role)
    } else {
        message.role.to_string()
    };
    println!("#{} [{}]", index, tag);
    if !message.content.is_empty() {
        println!("{}", message.content);
    }
    for call in message.tool_calls.iter().flatten() {
        println!("  tool_call {} {}({})", call.id, call.name, call.arguments);
    }
    if let Some(id) = &message.tool_call_id {
        println!("  answers {}", id);
    }
    println!();
}

/// Print a session's stored history.
pub(crate) async fn cmd_history(config: &Config, session_id: &str) -> Result<()> {
    warn_if_ephemeral(config);
    let store = create_store(&config.memory)?;
    let registry = SessionRegistry::new(store);
    let session = registry.get_or_create(session_id).await;
    let messages = session.snapshot().await;

    if messages.is_empty() {
        println!("No history for session '{}'", session_id);
        return Ok(());
    }
    for (i, message) in messages.iter().enumerate() {
        print_message(i, message);
    }
    println!("{} message(s)", messages.len());
    Ok(())
}

/// List stored session ids.
pub(crate) async fn cmd_sessions(config: &Config) -> Result<()> {
    warn_if_ephemeral(config);
    let store = create_store(&config.memory)?;
    let keys = store.keys().await.with_context(|| "Failed to list sessions")?;

    if keys.is_empty() {
        println!("No stored sessions");
        return Ok(());
    }
    for key in &keys {
        let count = store.read(key).await.map(|m| m.len()).unwrap_or(0);
        println!("{}  ({} messages)", key, count);
    }
    Ok(())
}

/// Compact a session's history now.
pub(crate) async fn cmd_compact(config: &Config, session_id: &str) -> Result<()> {
    warn_if_ephemeral(config);
    let orchestrator = create_orchestrator(config, true)?;
    let report = orchestrator
        .compact(session_id)
        .await
        .with_context(|| format!("Failed to compact session '{}'", session_id))?;

    println!("Session:        {}", session_id);
    println!("Tokens (est.):  {}", report.total_tokens);
    if report.changed {
        println!(
            "Summarized {} block(s), kept {} block(s); {} message(s) remain",
            report.older_blocks,
            report.recent_blocks,
            report.messages.len()
        );
    } else if let Some(summary) = &report.summary {
        println!("Summary (history left unchanged):");
        println!("{}", summary.content);
    } else {
        println!(
            "Nothing to compact (threshold {} tokens)",
            config.compaction.max_tokens_before_summary
        );
    }
    Ok(())
}
