//! Completion provider seam.
//!
//! The orchestrator only needs one capability from an LLM backend: given the
//! session transcript, produce generated text. HTTP/SDK mechanics live
//! behind this trait in the embedding application.

use async_trait::async_trait;

use crate::error::Result;
use crate::session::Session;

/// Textual content of a completion. `text` may be absent when a backend
/// returns a contentless reply; the orchestrator treats that as invalid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionContent {
    pub text: Option<String>,
}

/// One completion returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub id: String,
    pub content: CompletionContent,
}

impl Completion {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: CompletionContent {
                text: Some(text.into()),
            },
        }
    }
}

/// External LLM collaborator.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion over the session's full transcript.
    async fn process_message(&self, session: &Session) -> Result<Completion>;
}
