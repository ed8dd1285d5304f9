//! Agent executor capability
//!
//! The conversation core never talks to a model directly. Generation,
//! token streaming and tool execution belong to an [`AgentExecutor`]; history
//! summaries are requested through a [`Summarizer`]. Both are injected at
//! construction so tests can substitute scripted implementations.
//!
//! # Streaming events
//!
//! A streaming executor hands back an [`EventSource`] yielding
//! [`StreamEvent`]s:
//!
//! - `Message`: a complete message (e.g. a tool result, or an assistant reply
//!   that carries tool calls)
//! - `Delta`: a token-level content fragment
//! - `Error`: a per-event failure; the source may keep producing afterwards
//!
//! The source ends when its sender is dropped.

pub mod openai;

pub use openai::OpenAiExecutor;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::CompactionConfig;
use crate::error::{ColloquyError, Result};
use crate::session::{Message, Role};

/// Prompt given to the executor when it is asked to summarize history.
pub const DEFAULT_SUMMARY_PROMPT: &str = "You are a conversation summarizer. Your task is to create a concise summary of the conversation history.

Guidelines:
1. Preserve key information, decisions, and context
2. Maintain the chronological flow of the conversation
3. Include important facts, user preferences, and action items
4. Keep the summary concise but informative
5. Use clear, structured format

Output format:
- Start with \"Summary of previous conversation:\"
- Use bullet points for key points
- Include any pending questions or action items";

/// User-turn template for summary requests. `{older_messages}` is the only
/// input variable.
pub const SUMMARY_REQUEST_TEMPLATE: &str =
    "Please summarize the following conversation history:\n\n{older_messages}";

// ============================================================================
// Events
// ============================================================================

/// One event produced by a streaming executor.
#[derive(Debug)]
pub enum StreamEvent {
    /// A complete message.
    Message(Message),
    /// A content fragment of the assistant reply.
    Delta(String),
    /// A per-event failure. Not terminal by itself.
    Error(ColloquyError),
}

/// Receiving end of an executor stream.
pub type EventSource = mpsc::Receiver<StreamEvent>;

// ============================================================================
// Executor
// ============================================================================

/// Model invocation capability.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run a non-streaming generation and return the terminal message.
    async fn generate(&self, messages: Vec<Message>) -> Result<Message>;

    /// Start a streaming generation.
    ///
    /// The default implementation runs [`generate`](Self::generate) and
    /// delivers the result as a single `Message` event.
    async fn stream(&self, messages: Vec<Message>) -> Result<EventSource> {
        let reply = self.generate(messages).await?;
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh receiver: this send cannot block or fail.
        let _ = tx.send(StreamEvent::Message(reply)).await;
        Ok(rx)
    }
}

// ============================================================================
// Summarizer
// ============================================================================

/// Input to a [`Summarizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Rendered text of the history being summarized.
    pub older_messages: String,
}

/// Stateless summary generation capability.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn invoke(&self, request: SummaryRequest) -> Result<Message>;
}

/// [`Summarizer`] that asks an [`AgentExecutor`] for the summary.
///
/// The request is a system prompt followed by one user turn built from
/// [`SUMMARY_REQUEST_TEMPLATE`].
pub struct ExecutorSummarizer {
    executor: Arc<dyn AgentExecutor>,
    system_prompt: String,
}

impl ExecutorSummarizer {
    /// Create a summarizer using [`DEFAULT_SUMMARY_PROMPT`].
    pub fn new(executor: Arc<dyn AgentExecutor>) -> Self {
        Self::with_prompt(executor, DEFAULT_SUMMARY_PROMPT)
    }

    /// Create a summarizer with a custom system prompt.
    pub fn with_prompt(executor: Arc<dyn AgentExecutor>, system_prompt: &str) -> Self {
        Self {
            executor,
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Create a summarizer from the `compaction` config section, using its
    /// `summary_prompt` when one is set.
    pub fn from_config(config: &CompactionConfig, executor: Arc<dyn AgentExecutor>) -> Self {
        match config.summary_prompt.as_deref() {
            Some(prompt) if !prompt.is_empty() => Self::with_prompt(executor, prompt),
            _ => Self::new(executor),
        }
    }

    /// The system prompt sent with every summary request.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Build the executor input for a summary request.
    pub fn build_prompt(&self, request: &SummaryRequest) -> Vec<Message> {
        vec![
            Message::system(&self.system_prompt),
            Message::user(
                &SUMMARY_REQUEST_TEMPLATE.replace("{older_messages}", &request.older_messages),
            ),
        ]
    }
}

#[async_trait]
impl Summarizer for ExecutorSummarizer {
    async fn invoke(&self, request: SummaryRequest) -> Result<Message> {
        debug!(
            executor = self.executor.name(),
            chars = request.older_messages.len(),
            "Requesting history summary"
        );
        let reply = self
            .executor
            .generate(self.build_prompt(&request))
            .await
            .map_err(|e| ColloquyError::Summarizer(e.to_string()))?;
        if reply.role != Role::Assistant {
            return Err(ColloquyError::Summarizer(format!(
                "expected assistant reply, got {}",
                reply.role
            )));
        }
        Ok(reply)
    }
}
