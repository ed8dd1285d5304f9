//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod common;
pub mod config;
pub mod sessions;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use colloquy::utils::init_logging;

use common::load_config;

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(version)]
#[command(about = "Multi-turn conversations with streaming and history compaction", long_about = None)]
struct Cli {
    /// Config file (JSON or YAML); defaults to ~/.colloquy/config.json
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat in a session (interactive without MESSAGE)
    Chat {
        /// Session id to use or resume (a new one is generated if omitted)
        #[arg(short, long)]
        session: Option<String>,
        /// Stream the response token-by-token
        #[arg(long)]
        stream: bool,
        /// Single message to send (non-interactive mode)
        message: Option<String>,
    },
    /// Print the stored history of a session
    History {
        /// Session id
        session: String,
    },
    /// List stored sessions
    Sessions,
    /// Summarize the older part of a session's history now
    Compact {
        /// Session id
        session: String,
    },
    /// Create or validate a configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Target file; `.yaml`/`.yml` writes YAML (defaults to ~/.colloquy/config.json)
        path: Option<PathBuf>,
    },
    /// Check a configuration file for unknown fields and bad values
    Check {
        /// File to check (defaults to the active config file)
        path: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Config commands must work on files that do not load; everything else
    // needs a config, and its logging section, up front.
    let needs_config = !matches!(
        cli.command,
        None | Some(Commands::Config { .. }) | Some(Commands::Version)
    );
    let config = if needs_config {
        Some(load_config(cli.config.as_deref())?)
    } else {
        None
    };

    let mut logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if cli.debug {
        logging.level = "debug".to_string();
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match (cli.command, config) {
        (None, _) => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        (Some(Commands::Version), _) => cmd_version(),
        (Some(Commands::Config { action }), _) => {
            config::cmd_config(action, cli.config).await?;
        }
        (Some(command), Some(config)) => match command {
            Commands::Chat {
                session,
                stream,
                message,
            } => chat::cmd_chat(&config, session, stream, message).await?,
            Commands::History { session } => sessions::cmd_history(&config, &session).await?,
            Commands::Sessions => sessions::cmd_sessions(&config).await?,
            Commands::Compact { session } => sessions::cmd_compact(&config, &session).await?,
            Commands::Config { .. } | Commands::Version => {}
        },
        (Some(_), None) => {}
    }

    Ok(())
}

fn cmd_version() {
    println!("colloquy {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Multi-turn conversations with streaming and history compaction");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_with_global_flags() {
        let cli = Cli::try_parse_from([
            "colloquy", "chat", "--session", "s1", "--stream", "hello", "--debug", "-c", "x.yaml",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
        match cli.command {
            Some(Commands::Chat {
                session,
                stream,
                message,
            }) => {
                assert_eq!(session.as_deref(), Some("s1"));
                assert!(stream);
                assert_eq!(message.as_deref(), Some("hello"));
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn test_parse_config_init_path() {
        let cli = Cli::try_parse_from(["colloquy", "config", "init", "conf.yml"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Init { path: Some(_) }
            })
        ));
    }

    #[test]
    fn test_history_requires_session() {
        assert!(Cli::try_parse_from(["colloquy", "history"]).is_err());
    }
}
