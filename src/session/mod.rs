//! Session state: transcript, metadata, persistence.

pub mod message;
pub mod store;

pub use message::{
    Message, MessageKind, MessageMetadata, ToolCallOutcome, ToolCallRecord, ToolCallStatus,
};
pub use store::SessionStore;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session metadata: environment snapshot, active role, free-form extras.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            environment: HashMap::new(),
            role: None,
            custom: serde_json::Map::new(),
        }
    }
}

/// A conversational session: id, system prompt, ordered transcript, metadata.
///
/// The id is immutable after creation. The transcript is append-only and its
/// order is the conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl Session {
    /// Create an empty session. A `None` id gets a fresh UUID.
    pub fn new(id: Option<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
            metadata: SessionMetadata::default(),
        }
    }

    /// Append a message to the transcript.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the active role in metadata.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.metadata.role = Some(role.into());
        self
    }

    /// Replace the environment snapshot.
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.metadata.environment = environment;
        self
    }

    /// Apply a partial update. Fields present in the patch replace the
    /// session's fields wholesale, except `custom`, which merges key-by-key
    /// (recursively for nested objects).
    pub fn apply(mut self, patch: SessionPatch) -> Self {
        if let Some(prompt) = patch.system_prompt {
            self.system_prompt = prompt;
        }
        if let Some(messages) = patch.messages {
            self.messages = messages;
        }
        if let Some(environment) = patch.environment {
            self.metadata.environment = environment;
        }
        if let Some(role) = patch.role {
            self.metadata.role = Some(role);
        }
        if let Some(custom) = patch.custom {
            merge_custom(&mut self.metadata.custom, custom);
        }
        self
    }

    /// Concatenated text of the latest assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Partial session update, shallow per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Deep-merge `incoming` into `target`: nested objects merge recursively,
/// everything else is last-write-wins.
fn merge_custom(
    target: &mut serde_json::Map<String, serde_json::Value>,
    incoming: serde_json::Map<String, serde_json::Value>,
) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(new)) => {
                merge_custom(existing, new);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
