//! Colloquy - Multi-turn conversation sessions over pluggable LLM executors
//!
//! Sessions are kept in a [`SessionRegistry`], persisted through a
//! [`store::SessionStore`], and driven by an [`agent::Orchestrator`] that
//! calls an [`executor::AgentExecutor`]. Long histories are condensed by the
//! [`agent::HistoryCompactor`].

pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod session;
pub mod store;
pub mod utils;

pub use agent::{HistoryCompactor, Orchestrator, ResponseStream};
pub use config::Config;
pub use error::{ColloquyError, Result};
pub use executor::{AgentExecutor, EventSource, OpenAiExecutor, StreamEvent, Summarizer};
pub use session::{Message, Role, Session, SessionRegistry, ToolCall};
