//! Session types for Colloquy
//!
//! This module defines the core types for session and conversation management,
//! including messages, roles, and tool calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// Annotation key marking an assistant message as a generated history summary.
pub const SUMMARY_MESSAGE_FLAG: &str = "_summary_message";

/// A live conversation session.
///
/// The message list sits behind an async mutex which doubles as the
/// per-session lock: at most one mutating exchange runs at a time, and
/// readers take a copy while holding it.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    messages: Mutex<Vec<Message>>,
}

impl Session {
    /// Create a new empty session with the given id.
    ///
    /// # Example
    /// ```
    /// use colloquy::session::Session;
    ///
    /// let session = Session::new("user-42");
    /// assert_eq!(session.id(), "user-42");
    /// ```
    pub fn new(id: &str) -> Self {
        Self::with_messages(id, Vec::new())
    }

    /// Create a session seeded with previously persisted history.
    pub fn with_messages(id: &str, messages: Vec<Message>) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
            messages: Mutex::new(messages),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When this session was installed in memory.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Acquire the per-session lock.
    ///
    /// Holding the guard gives exclusive access to the history. Never hold it
    /// while waiting on the registry lock.
    pub async fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().await
    }

    /// Copy the full history under the session lock.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }
}

/// A single message in a conversation.
///
/// Messages can be from users, assistants, system prompts, or tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message (may be empty)
    #[serde(default)]
    pub content: String,
    /// Tool calls made by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (for tool results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Free-form annotations, e.g. [`SUMMARY_MESSAGE_FLAG`]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Message {
    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use colloquy::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message attributed to a specific call.
    ///
    /// # Example
    /// ```
    /// use colloquy::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "Tool executed successfully");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    /// ```
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    /// Create synthetic tool output that is not attributed to any call.
    pub fn tool_output(content: &str) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Create an assistant message with tool calls.
    ///
    /// # Example
    /// ```
    /// use colloquy::session::{Message, ToolCall};
    ///
    /// let call = ToolCall::new("call_1", "search", r#"{"query": "rust"}"#);
    /// let msg = Message::assistant_with_tools("Let me search for that.", vec![call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create an assistant message tagged as a history summary.
    pub fn summary(content: &str) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.extra
            .insert(SUMMARY_MESSAGE_FLAG.to_string(), serde_json::Value::Bool(true));
        msg
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// Check if this is an assistant message tagged as a history summary.
    ///
    /// Only the presence of the flag matters, not its value.
    pub fn is_summary(&self) -> bool {
        self.role == Role::Assistant && self.extra.contains_key(SUMMARY_MESSAGE_FLAG)
    }

    /// Tool call ids requested by this message, in order.
    pub fn tool_call_ids(&self) -> impl Iterator<Item = &str> {
        self.tool_calls
            .iter()
            .flatten()
            .map(|tc| tc.id.as_str())
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl Role {
    /// Lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call made by the assistant.
///
/// Arguments are opaque text; they are carried and rendered but never parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    ///
    /// # Example
    /// ```
    /// use colloquy::session::ToolCall;
    ///
    /// let call = ToolCall::new("call_123", "web_search", r#"{"query": "rust programming"}"#);
    /// assert_eq!(call.name, "web_search");
    /// ```
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}
