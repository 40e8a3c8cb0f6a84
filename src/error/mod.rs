//! Error types for confab.

use thiserror::Error;

/// Primary error type for all confab operations.
#[derive(Error, Debug)]
pub enum ConfabError {
    #[error("No active session")]
    NoActiveSession,

    #[error("Session already active: {0}")]
    SessionExists(String),

    #[error("Unknown tool server: {0}")]
    UnknownServer(String),

    #[error("Unknown tool: {server}/{tool}")]
    UnknownTool { server: String, tool: String },

    #[error("Tool server '{server}' failed to start: {message}")]
    ServerStart { server: String, message: String },

    #[error("Tool invocation failed: {tool}: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Tool server '{server}' unavailable: {message}")]
    ServerUnavailable { server: String, message: String },

    #[error("Approval required for tool: {server}/{tool}")]
    ApprovalRequired { server: String, tool: String },

    #[error("Session log parse failed: {0}")]
    LogParse(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConfabError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveSession => "no_active_session",
            Self::SessionExists(_) => "session_exists",
            Self::UnknownServer(_) => "unknown_server",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::ServerStart { .. } => "server_start_failed",
            Self::ToolInvocation { .. } => "tool_invocation_failed",
            Self::ServerUnavailable { .. } => "server_unavailable",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::LogParse(_) => "log_parse_failed",
            Self::InvalidResponse(_) => "invalid_response",
            Self::RoleNotFound(_) => "role_not_found",
            Self::Provider(_) => "provider_error",
            Self::InvalidState(_) => "invalid_state",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the orchestrator should fold this error into the transcript
    /// (as a failed tool record) instead of aborting the turn.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownServer(_)
                | Self::UnknownTool { .. }
                | Self::ToolInvocation { .. }
                | Self::ServerUnavailable { .. }
                | Self::ApprovalRequired { .. }
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConfabError>;
