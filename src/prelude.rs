//! Convenience re-exports for common usage.

pub use crate::config::{OrchestratorSettings, ToolServerConfig};
pub use crate::error::{ConfabError, Result};
pub use crate::extract::{first_tool_request, tool_requests, ParsedToolRequest};
pub use crate::hub::{ApprovalPolicy, ToolHub};
pub use crate::llm::{Completion, CompletionContent, CompletionProvider};
pub use crate::orchestrator::SessionOrchestrator;
pub use crate::role::{RoleConfig, RoleProvider};
pub use crate::server::{ToolCatalog, ToolChannel, ToolDescriptor, ToolServerClient};
pub use crate::session::{
    Message, MessageKind, Session, SessionStore, ToolCallRecord, ToolCallStatus,
};
