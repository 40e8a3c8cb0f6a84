//! Launch configuration for tool servers and orchestrator settings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to launch one tool server as a child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Name the server is registered under; must be unique across the hub.
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ToolServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Tunables for the session loop and server startup.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on tool dispatches within one `execute_message` call.
    /// Guards against a model that keeps requesting tools indefinitely.
    pub max_tool_turns: usize,
    /// Deadline for a server's start handshake (initialize + capability
    /// discovery).
    pub start_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_tool_turns: 25,
            start_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot of the process environment recorded in session metadata.
pub fn environment_snapshot() -> HashMap<String, String> {
    let mut snapshot = HashMap::new();
    snapshot.insert("os".into(), std::env::consts::OS.into());
    snapshot.insert("arch".into(), std::env::consts::ARCH.into());
    if let Ok(cwd) = std::env::current_dir() {
        snapshot.insert("cwd".into(), cwd.display().to_string());
    }
    snapshot
}
