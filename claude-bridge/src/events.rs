//! Typed view of the agent's stream-json events
//!
//! Every event keeps the exact text it arrived as, so it can be forwarded
//! verbatim regardless of how much of it the bridge understands. Unknown event
//! kinds and unknown content blocks are preserved rather than rejected.

use crate::error::{BridgeError, Result};
use serde_json::Value;

/// The original JSON of an event, as text and as a parsed value
#[derive(Debug, Clone, PartialEq)]
pub struct RawJson {
    text: String,
    value: Value,
}

impl RawJson {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// `system` event; `init` carries the session id and the available slash commands
#[derive(Debug, Clone, PartialEq)]
pub struct SystemEvent {
    pub subtype: Option<String>,
    pub session_id: Option<String>,
    pub slash_commands: Option<Value>,
    pub raw: RawJson,
}

impl SystemEvent {
    pub fn is_init(&self) -> bool {
        self.subtype.as_deref() == Some("init")
    }
}

/// `assistant` or `user` message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub content: MessageContent,
    pub raw: RawJson,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Empty,
}

/// One entry of a message's content array
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: Option<String>,
        name: String,
        input: Value,
        raw: Value,
    },
    ToolResult {
        tool_use_id: Option<String>,
        content: Value,
        is_error: bool,
        raw: Value,
    },
    Other(Value),
}

impl ContentBlock {
    fn from_value(value: &Value) -> Self {
        let text_field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        match value.get("type").and_then(Value::as_str) {
            Some("text") => match text_field("text") {
                Some(text) => ContentBlock::Text { text },
                None => ContentBlock::Other(value.clone()),
            },
            Some("thinking") => match text_field("thinking") {
                Some(thinking) => ContentBlock::Thinking { thinking },
                None => ContentBlock::Other(value.clone()),
            },
            Some("tool_use") => ContentBlock::ToolUse {
                id: text_field("id"),
                name: text_field("name").unwrap_or_default(),
                input: value.get("input").cloned().unwrap_or(Value::Null),
                raw: value.clone(),
            },
            Some("tool_result") => ContentBlock::ToolResult {
                tool_use_id: text_field("tool_use_id"),
                content: value.get("content").cloned().unwrap_or(Value::Null),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                raw: value.clone(),
            },
            _ => ContentBlock::Other(value.clone()),
        }
    }
}

/// Terminal `result` event
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    pub subtype: Option<String>,
    pub is_error: bool,
    pub session_id: Option<String>,
    pub result: Option<String>,
    pub raw: RawJson,
}

/// An event produced by the agent runtime
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    System(SystemEvent),
    Assistant(MessageEvent),
    User(MessageEvent),
    Result(ResultEvent),
    Unknown(RawJson),
}

impl AgentEvent {
    /// Parse one stream-json line
    pub fn parse(line: &str) -> Result<Self> {
        let text = line.trim();
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BridgeError::Protocol(format!("Invalid event JSON: {}", e)))?;
        if !value.is_object() {
            return Err(BridgeError::Protocol(format!(
                "Event is not a JSON object: {}",
                text
            )));
        }
        Ok(Self::classify(RawJson {
            text: text.to_string(),
            value,
        }))
    }

    /// Build an event from an already parsed value
    pub fn from_value(value: Value) -> Self {
        Self::classify(RawJson {
            text: value.to_string(),
            value,
        })
    }

    fn classify(raw: RawJson) -> Self {
        let value = &raw.value;
        let str_field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        match value.get("type").and_then(Value::as_str) {
            Some("system") => AgentEvent::System(SystemEvent {
                subtype: str_field("subtype"),
                session_id: str_field("session_id"),
                slash_commands: value.get("slash_commands").cloned(),
                raw,
            }),
            Some("assistant") => AgentEvent::Assistant(MessageEvent {
                content: message_content(value),
                raw,
            }),
            Some("user") => AgentEvent::User(MessageEvent {
                content: message_content(value),
                raw,
            }),
            Some("result") => AgentEvent::Result(ResultEvent {
                subtype: str_field("subtype"),
                is_error: value
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                session_id: str_field("session_id"),
                result: str_field("result"),
                raw,
            }),
            _ => AgentEvent::Unknown(raw),
        }
    }

    pub fn raw(&self) -> &RawJson {
        match self {
            AgentEvent::System(e) => &e.raw,
            AgentEvent::Assistant(e) | AgentEvent::User(e) => &e.raw,
            AgentEvent::Result(e) => &e.raw,
            AgentEvent::Unknown(raw) => raw,
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, AgentEvent::Result(_))
    }
}

/// Content lives under `message.content`, with a top-level `content` fallback
fn message_content(value: &Value) -> MessageContent {
    let content = value
        .get("message")
        .and_then(|m| m.get("content"))
        .or_else(|| value.get("content"));

    match content {
        Some(Value::String(text)) => MessageContent::Text(text.clone()),
        Some(Value::Array(items)) => {
            MessageContent::Blocks(items.iter().map(ContentBlock::from_value).collect())
        }
        _ => MessageContent::Empty,
    }
}
