//! Agent module - Conversation orchestration
//!
//! This module ties sessions, persistence and an executor together. The
//! agent is responsible for:
//!
//! - Appending user turns to session history under the session lock
//! - Building executor input with a system prompt and history window
//! - Streaming executor output back to callers in order
//! - Normalizing tool output before it is stored
//! - Compacting long histories into summaries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │   Caller    │────>│ Orchestrator │────>│ AgentExecutor │
//! │ (CLI, app)  │     │              │     │   (OpenAI)    │
//! └─────────────┘     └──────────────┘     └───────────────┘
//!                       │          │               │
//!                       ▼          ▼               ▼
//!              ┌────────────┐ ┌───────────┐ ┌────────────┐
//!              │  Session   │ │ History   │ │  fan_in    │
//!              │  Registry  │ │ Compactor │ │ (stream)   │
//!              └────────────┘ └───────────┘ └────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use colloquy::agent::Orchestrator;
//! use colloquy::config::Config;
//! use colloquy::executor::OpenAiExecutor;
//!
//! async fn run() -> colloquy::Result<()> {
//!     let config = Config::load()?;
//!     let executor = Arc::new(OpenAiExecutor::from_config(&config.model)?);
//!     let orchestrator = Orchestrator::from_config(&config, executor)?;
//!
//!     let mut stream = orchestrator.chat_stream("user-1", "Tell me a story").await?;
//!     let mut reply = String::new();
//!     while let Some(chunk) = stream.recv().await {
//!         print!("{}", chunk.content);
//!         reply.push_str(&chunk.content);
//!     }
//!     orchestrator
//!         .append_assistant_message("user-1", colloquy::Message::assistant(&reply))
//!         .await
//! }
//! ```

pub mod compaction;
mod context;
mod orchestrator;
pub mod stream;
pub mod tool_result;

pub use compaction::{
    CompactionReport, HeuristicCounter, HistoryCompactor, MessageBlock, TokenCounter,
};
pub use context::{truncate_messages, ContextBuilder, DEFAULT_SYSTEM_PROMPT};
pub use orchestrator::Orchestrator;
pub use stream::{fan_in, ResponseStream, DEFAULT_STREAM_CAPACITY};
pub use tool_result::{format_tool_message, format_tool_result};
