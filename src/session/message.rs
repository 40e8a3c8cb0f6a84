//! Transcript message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a transcript message. Immutable once the message is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    System,
}

/// Outcome status of a dispatched tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolCallStatus {
    Success,
    Failure,
}

/// Result descriptor attached to a tool-call record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallOutcome {
    pub status: ToolCallStatus,
    pub output: serde_json::Value,
    /// Wall-clock duration of the invocation, in milliseconds.
    pub duration_ms: u64,
}

/// Record of one tool invocation carried by a user-kind reply message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub tool_name: String,
    /// Opaque argument mapping; shape validation is the tool server's job.
    pub arguments: serde_json::Value,
    pub invoked_at: DateTime<Utc>,
    pub result: ToolCallOutcome,
}

/// Optional per-message metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

/// A message in the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, content)
    }

    /// Create the user-kind reply message that carries a tool result back
    /// into the transcript.
    pub fn tool_reply(content: impl Into<String>, record: ToolCallRecord) -> Self {
        let mut message = Self::new(MessageKind::User, content);
        message.metadata = Some(MessageMetadata {
            tool_calls: vec![record],
        });
        message
    }

    /// Tool-call records attached to this message.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        self.metadata
            .as_ref()
            .map(|m| m.tool_calls.as_slice())
            .unwrap_or_default()
    }
}
