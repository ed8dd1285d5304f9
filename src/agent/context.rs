//! Context builder for executor calls
//!
//! Turns a session's stored history into the message list an executor sees:
//! the configured system prompt followed by a window of recent history.
//! Neither the prompt nor the windowing touches what is stored.

use crate::session::{Message, Role};

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Builds executor input from session history.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// Prepended as a system message; empty disables it
    system_prompt: String,
    /// Conversation turns to keep; 0 keeps everything
    max_history: usize,
}

impl ContextBuilder {
    /// Create a builder with [`DEFAULT_SYSTEM_PROMPT`] and unlimited history.
    ///
    /// # Example
    /// ```rust
    /// use colloquy::agent::ContextBuilder;
    ///
    /// let builder = ContextBuilder::new();
    /// assert_eq!(builder.system_prompt(), "You are a helpful AI assistant.");
    /// ```
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history: 0,
        }
    }

    /// Set a custom system prompt. An empty prompt sends none.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Limit executor input to the last `turns` exchanges (two messages each).
    ///
    /// # Example
    /// ```rust
    /// use colloquy::agent::ContextBuilder;
    /// use colloquy::session::Message;
    ///
    /// let builder = ContextBuilder::new().with_max_history(1);
    /// let history = vec![
    ///     Message::user("one"),
    ///     Message::assistant("1"),
    ///     Message::user("two"),
    ///     Message::assistant("2"),
    /// ];
    /// let messages = builder.build_messages(history);
    /// assert_eq!(messages.len(), 3); // system + last exchange
    /// assert_eq!(messages[1].content, "two");
    /// ```
    pub fn with_max_history(mut self, turns: usize) -> Self {
        self.max_history = turns;
        self
    }

    /// Get the current system prompt.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Configured history window in turns (0 means unlimited).
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Build the full message list for an executor call.
    pub fn build_messages(&self, history: Vec<Message>) -> Vec<Message> {
        let history = if self.max_history == 0 {
            history
        } else {
            truncate_messages(history, self.max_history.saturating_mul(2))
        };

        if self.system_prompt.is_empty() {
            return history;
        }
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history);
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate messages to keep only the N most recent.
///
/// Always preserves the first system message if present: the result is that
/// system message plus the `keep_recent` most recent messages after it.
///
/// # Examples
/// ```
/// use colloquy::session::Message;
/// use colloquy::agent::truncate_messages;
///
/// let msgs = vec![
///     Message::system("You are helpful."),
///     Message::user("Hi"),
///     Message::assistant("Hello!"),
///     Message::user("How are you?"),
///     Message::assistant("Great!"),
/// ];
/// let result = truncate_messages(msgs, 2);
/// assert_eq!(result.len(), 3); // system + 2 recent
/// ```
pub fn truncate_messages(messages: Vec<Message>, keep_recent: usize) -> Vec<Message> {
    let has_system_prefix = messages
        .first()
        .map(|m| m.role == Role::System)
        .unwrap_or(false);
    let body_len = messages.len() - usize::from(has_system_prefix);
    if body_len <= keep_recent {
        return messages;
    }

    let skip = body_len - keep_recent;
    let mut iter = messages.into_iter();
    let mut result = Vec::with_capacity(keep_recent + usize::from(has_system_prefix));
    if has_system_prefix {
        result.extend(iter.next());
    }
    result.extend(iter.skip(skip));
    result
}
