//! OpenAI-compatible executor
//!
//! Implements [`AgentExecutor`] against the Chat Completions API. Works with
//! any endpoint that speaks the same wire format (OpenAI, Azure, vLLM,
//! Ollama, ...). Tool calls requested by the model are surfaced as
//! assistant messages; they are never executed here.
//!
//! # Example
//!
//! ```rust,ignore
//! use colloquy::executor::{AgentExecutor, OpenAiExecutor};
//! use colloquy::session::Message;
//!
//! async fn example() {
//!     let executor = OpenAiExecutor::new("your-api-key", "gpt-4o");
//!     let reply = executor
//!         .generate(vec![Message::user("Hello!")])
//!         .await
//!         .unwrap();
//!     println!("{}", reply.content);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{ColloquyError, Result};
use crate::session::{Message, ToolCall};

use super::{AgentExecutor, EventSource, StreamEvent};

/// The OpenAI API endpoint URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Buffer between the SSE reader task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Request Types
// ============================================================================

/// Chat Completions request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// A message in wire format.
#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    /// Null for assistant turns that only carry tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

/// One `data:` payload of a streamed response.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    r#type: String,
}

// ============================================================================
// Executor
// ============================================================================

/// OpenAI-compatible [`AgentExecutor`].
pub struct OpenAiExecutor {
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: Client,
}

impl OpenAiExecutor {
    /// Create an executor for the default OpenAI endpoint.
    ///
    /// # Example
    /// ```
    /// use colloquy::executor::{AgentExecutor, OpenAiExecutor};
    ///
    /// let executor = OpenAiExecutor::new("sk-xxx", "gpt-4o-mini");
    /// assert_eq!(executor.name(), "openai");
    /// ```
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL, model)
    }

    /// Create an executor for an OpenAI-compatible endpoint.
    ///
    /// A trailing slash on `api_base` is removed.
    pub fn with_base_url(api_key: &str, api_base: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: None,
            temperature: None,
            client: Client::new(),
        }
    }

    /// Create an executor from the `model` config section.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ColloquyError::Config(
                    "model.api_key is not set (or export COLLOQUY_MODEL_API_KEY)".into(),
                )
            })?;
        let mut executor = Self::with_base_url(api_key, &cfg.base_url, &cfg.model);
        executor.max_tokens = cfg.max_tokens;
        executor.temperature = cfg.temperature;
        Ok(executor)
    }

    /// The model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, messages: Vec<Message>, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        debug!(model = %request.model, stream = request.stream, "OpenAI request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ColloquyError::Execution(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ColloquyError::Execution(describe_api_error(
                status.as_u16(),
                &error_text,
            )));
        }
        Ok(response)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert session messages to wire format.
fn convert_messages(messages: Vec<Message>) -> Vec<WireMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let tool_calls = msg.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| WireToolCall {
                        id: tc.id,
                        r#type: "function".to_string(),
                        function: WireFunction {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });

            WireMessage {
                role: msg.role.as_str(),
                content: if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(msg.content)
                },
                tool_calls,
                tool_call_id: msg.tool_call_id,
            }
        })
        .collect()
}

/// Convert a non-streaming response into the terminal assistant message.
fn convert_response(response: ChatResponse) -> Result<Message> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ColloquyError::Execution("no assistant response received".into()))?;

    let content = choice.message.content.unwrap_or_default();
    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
        .collect();

    Ok(if tool_calls.is_empty() {
        Message::assistant(&content)
    } else {
        Message::assistant_with_tools(&content, tool_calls)
    })
}

fn describe_api_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => format!(
            "OpenAI API error ({}): {} - {}",
            status, err.error.r#type, err.error.message
        ),
        Err(_) => format!("OpenAI API error ({}): {}", status, body),
    }
}

/// Extract the payload of an SSE `data:` line.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .map(str::trim)
}

/// Assembles tool calls that arrive split across stream chunks.
#[derive(Debug, Default)]
struct StreamAssembler {
    tool_calls: Vec<ToolCall>,
}

impl StreamAssembler {
    /// Fold one chunk in and return its content fragment, if any.
    fn apply(&mut self, chunk: StreamChunk) -> Option<String> {
        let mut text = String::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                text.push_str(&content);
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                while self.tool_calls.len() <= delta.index {
                    self.tool_calls.push(ToolCall::new("", "", ""));
                }
                let call = &mut self.tool_calls[delta.index];
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        call.arguments.push_str(&args);
                    }
                }
            }
        }
        (!text.is_empty()).then_some(text)
    }

    /// The assistant message carrying assembled tool calls, if the model
    /// requested any. Content already went out as deltas, so it is left empty.
    fn finish(self) -> Option<Message> {
        if self.tool_calls.is_empty() {
            None
        } else {
            Some(Message::assistant_with_tools("", self.tool_calls))
        }
    }
}

// ============================================================================
// AgentExecutor Implementation
// ============================================================================

#[async_trait]
impl AgentExecutor for OpenAiExecutor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<Message> {
        let request = self.request(messages, false);
        let response = self.send(&request).await?;
        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ColloquyError::Execution(format!("Failed to parse OpenAI response: {}", e))
        })?;

        info!(model = %self.model, "OpenAI response received");
        convert_response(parsed)
    }

    async fn stream(&self, messages: Vec<Message>) -> Result<EventSource> {
        use futures::StreamExt;

        let request = self.request(messages, true);
        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut assembler = StreamAssembler::default();
            // Bytes, not text: a multi-byte character may straddle two chunks.
            let mut line_buffer: Vec<u8> = Vec::new();

            tokio::pin!(byte_stream);

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Error(ColloquyError::Execution(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        break;
                    }
                };

                line_buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = line_buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = line_buffer.drain(..=newline_pos).collect();
                    let line = match std::str::from_utf8(&raw[..newline_pos]) {
                        Ok(text) => text.trim(),
                        Err(e) => {
                            let event = StreamEvent::Error(ColloquyError::Execution(format!(
                                "Invalid UTF-8 in stream: {}",
                                e
                            )));
                            if tx.send(event).await.is_err() {
                                return;
                            }
                            continue;
                        }
                    };

                    let Some(data) = sse_data(line) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'read;
                    }

                    let parsed: StreamChunk = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            let event = StreamEvent::Error(ColloquyError::Execution(format!(
                                "Malformed stream chunk: {}",
                                e
                            )));
                            if tx.send(event).await.is_err() {
                                return;
                            }
                            continue;
                        }
                    };

                    if let Some(text) = assembler.apply(parsed) {
                        if tx.send(StreamEvent::Delta(text)).await.is_err() {
                            return;
                        }
                    }
                }
            }

            if let Some(message) = assembler.finish() {
                let _ = tx.send(StreamEvent::Message(message)).await;
            }
        });

        Ok(rx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    #[test]
    fn test_executor_creation() {
        let executor = OpenAiExecutor::new("sk-test", "gpt-4o-mini");
        assert_eq!(executor.name(), "openai");
        assert_eq!(executor.model(), "gpt-4o-mini");
        assert_eq!(executor.api_base, OPENAI_API_URL);
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let executor = OpenAiExecutor::with_base_url("k", "http://localhost:11434/v1/", "llama3");
        assert_eq!(executor.api_base, "http://localhost:11434/v1");
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let cfg = ModelConfig::default();
        assert!(matches!(
            OpenAiExecutor::from_config(&cfg),
            Err(ColloquyError::Config(_))
        ));

        let cfg = ModelConfig {
            api_key: Some("sk".into()),
            max_tokens: Some(256),
            ..Default::default()
        };
        let executor = OpenAiExecutor::from_config(&cfg).unwrap();
        assert_eq!(executor.max_tokens, Some(256));
        assert_eq!(executor.model(), cfg.model);
    }

    #[test]
    fn test_convert_messages_with_tool_calls() {
        let messages = vec![
            Message::user("weather?"),
            Message::assistant_with_tools("", vec![ToolCall::new("c1", "weather", "{}")]),
            Message::tool_result("c1", "sunny"),
        ];
        let wire = convert_messages(messages);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].role, "assistant");
        assert!(wire[1].content.is_none());
        assert_eq!(wire[1].tool_calls.as_ref().unwrap()[0].function.name, "weather");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_request_serialization_omits_stream_when_false() {
        let executor = OpenAiExecutor::new("k", "m");
        let json = serde_json::to_value(executor.request(vec![Message::user("hi")], false)).unwrap();
        assert!(json.get("stream").is_none());
        assert!(json.get("max_tokens").is_none());

        let json = serde_json::to_value(executor.request(vec![], true)).unwrap();
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_convert_response_text_and_tools() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null,"tool_calls":[
                {"id":"c1","type":"function","function":{"name":"f","arguments":"{}"}}]}}]}"#,
        )
        .unwrap();
        let msg = convert_response(response).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.content, "");

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"hi"}}]}"#).unwrap();
        assert_eq!(convert_response(response).unwrap().content, "hi");
    }

    #[test]
    fn test_convert_response_empty_choices_is_execution_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            convert_response(response),
            Err(ColloquyError::Execution(_))
        ));
    }

    #[test]
    fn test_describe_api_error() {
        let body = r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#;
        assert_eq!(
            describe_api_error(401, body),
            "OpenAI API error (401): invalid_request_error - bad key"
        );
        assert_eq!(
            describe_api_error(500, "oops"),
            "OpenAI API error (500): oops"
        );
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(""), None);
    }

    #[test]
    fn test_stream_assembler_content_and_tool_calls() {
        let mut assembler = StreamAssembler::default();
        let chunks = [
            r#"{"choices":[{"delta":{"content":"Let me "}}]}"#,
            r#"{"choices":[{"delta":{"content":"check."}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"weather","arguments":"{\"ci"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\":1}"}}]}}]}"#,
            r#"{"choices":[{"delta":{}}]}"#,
        ];
        let mut text = String::new();
        for chunk in chunks {
            if let Some(delta) = assembler.apply(serde_json::from_str(chunk).unwrap()) {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "Let me check.");

        let message = assembler.finish().unwrap();
        let calls = message.tool_calls.unwrap();
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].name, "weather");
        assert_eq!(calls[0].arguments, "{\"city\":1}");
        assert!(message.content.is_empty());
    }

    #[test]
    fn test_stream_assembler_without_tools_finishes_empty() {
        let mut assembler = StreamAssembler::default();
        assembler.apply(serde_json::from_str(r#"{"choices":[{"delta":{"content":"x"}}]}"#).unwrap());
        assert!(assembler.finish().is_none());
    }
}
