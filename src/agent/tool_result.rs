//! Tool result normalization.
//!
//! Tool servers commonly wrap their output in a structured envelope:
//!
//! ```json
//! {"content": [{"type": "text", "text": "72F and sunny"}, {"type": "image", "data": "..."}]}
//! ```
//!
//! Before a tool message is shown to a caller or persisted, the text parts
//! are pulled out and joined so history holds plain text. Anything that does
//! not parse as such an envelope is only trimmed.

use serde::Deserialize;

use crate::session::{Message, Role};

#[derive(Debug, Deserialize)]
struct ToolEnvelope {
    content: Vec<ToolPart>,
}

#[derive(Debug, Deserialize)]
struct ToolPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Extract the text parts of a structured tool result.
///
/// Returns the concatenation of every non-empty `"text"` part. If `content`
/// is not an envelope, fails to parse, or holds no text, it is returned with
/// surrounding whitespace trimmed and otherwise unchanged.
///
/// # Examples
/// ```
/// use colloquy::agent::tool_result::format_tool_result;
///
/// let raw = r#"{"content":[{"type":"text","text":"a"},{"type":"image"},{"type":"text","text":"b"}]}"#;
/// assert_eq!(format_tool_result(raw), "ab");
/// assert_eq!(format_tool_result("plain output"), "plain output");
/// ```
pub fn format_tool_result(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    let envelope: ToolEnvelope = match serde_json::from_str(trimmed) {
        Ok(envelope) => envelope,
        Err(_) => return trimmed.to_string(),
    };

    let text: String = envelope
        .content
        .iter()
        .filter(|part| part.kind == "text" && !part.text.is_empty())
        .map(|part| part.text.as_str())
        .collect();

    if text.is_empty() {
        trimmed.to_string()
    } else {
        text
    }
}

/// Normalize a message for exposure or persistence.
///
/// Tool messages get [`format_tool_result`] applied to their content; the
/// tool-call id and every other field are kept. Other roles pass through.
pub fn format_tool_message(mut message: Message) -> Message {
    if message.role == Role::Tool {
        message.content = format_tool_result(&message.content);
    }
    message
}
