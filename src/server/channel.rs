//! Request/response channel to a tool server.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::config::ToolServerConfig;
use crate::error::{ConfabError, Result};

/// Reliable request/response channel to one tool server.
///
/// The channel hides the wire framing; the client above it only sees method
/// calls and JSON results. `request` returns the server's `result` payload
/// or a `ToolInvocation` error when the server answers with an error object.
#[async_trait]
pub trait ToolChannel: Send {
    async fn request(&mut self, method: &str, params: serde_json::Value)
        -> Result<serde_json::Value>;

    /// Fire-and-forget notification; delivery failures are ignored.
    async fn notify(&mut self, method: &str);

    /// Release the underlying resources. Must not fail to release even when
    /// shutdown signaling already failed.
    async fn close(&mut self);
}

/// Channel to a spawned child process speaking newline-delimited JSON-RPC
/// 2.0 over stdio.
#[derive(Debug)]
pub struct ChildProcessChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    server: String,
}

impl ChildProcessChannel {
    /// Launch the configured command with piped stdio.
    pub fn spawn(config: &ToolServerConfig) -> Result<Self> {
        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|err| ConfabError::ServerStart {
            server: config.name.clone(),
            message: format!("cannot launch '{}': {err}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ConfabError::ServerStart {
            server: config.name.clone(),
            message: "child stdin unavailable".into(),
        })?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| ConfabError::ServerStart {
                server: config.name.clone(),
                message: "child stdout unavailable".into(),
            })?;

        Ok(Self {
            child,
            stdin,
            stdout,
            next_id: 1,
            server: config.name.clone(),
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> ConfabError {
        ConfabError::ServerUnavailable {
            server: self.server.clone(),
            message: message.into(),
        }
    }

    async fn write_line(&mut self, payload: &serde_json::Value) -> Result<()> {
        let mut line = payload.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| self.unavailable(format!("write failed: {err}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|err| self.unavailable(format!("flush failed: {err}")))
    }
}

#[async_trait]
impl ToolChannel for ChildProcessChannel {
    async fn request(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        self.write_line(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        // Skip notifications and stale responses until our id answers.
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|err| self.unavailable(format!("read failed: {err}")))?;
            if read == 0 {
                return Err(self.unavailable("channel closed mid-call"));
            }
            if line.trim().is_empty() {
                continue;
            }

            let reply: serde_json::Value = serde_json::from_str(line.trim())
                .map_err(|err| self.unavailable(format!("unparseable reply: {err}")))?;
            if reply.get("id").and_then(|v| v.as_u64()) != Some(id) {
                continue;
            }

            if let Some(error) = reply.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unspecified server error")
                    .to_string();
                return Err(ConfabError::ToolInvocation {
                    tool: method.to_string(),
                    message,
                });
            }

            return Ok(reply.get("result").cloned().unwrap_or(serde_json::Value::Null));
        }
    }

    async fn notify(&mut self, method: &str) {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Err(err) = self.write_line(&payload).await {
            tracing::debug!(server = %self.server, %method, error = %err, "notify failed");
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stdin.shutdown().await {
            tracing::debug!(server = %self.server, error = %err, "stdin shutdown failed");
        }
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(server = %self.server, error = %err, "kill failed");
        }
        let _ = self.child.wait().await;
    }
}
