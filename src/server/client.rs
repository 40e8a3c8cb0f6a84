//! Lifecycle management for one tool server.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfabError, Result};

use super::catalog::ToolDescriptor;
use super::channel::ToolChannel;

/// Lifecycle state of a tool server client.
///
/// `Failed` is terminal for this client instance; the owner may discard it
/// and build a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Ready,
    Stopping,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ToolListPayload {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Client for one tool server: start, capability discovery, invoke, stop.
///
/// Invocations are serialized per client; failures never leak past this
/// client to its siblings.
pub struct ToolServerClient {
    name: String,
    channel: Option<Box<dyn ToolChannel>>,
    state: ServerState,
    tools: Vec<ToolDescriptor>,
    start_timeout: Duration,
}

impl ToolServerClient {
    pub fn new(name: impl Into<String>, channel: Box<dyn ToolChannel>) -> Self {
        Self {
            name: name.into(),
            channel: Some(channel),
            state: ServerState::Stopped,
            tools: Vec::new(),
            start_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Tools reported during the start handshake.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Perform the start handshake: `initialize`, then capability discovery.
    ///
    /// Fails with a `ServerStart` error if the handshake errors or exceeds
    /// the configured timeout; the client lands in `Failed` either way.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ServerState::Stopped {
            return Err(ConfabError::InvalidState(format!(
                "server '{}' cannot start from state {}",
                self.name, self.state
            )));
        }
        self.state = ServerState::Starting;

        match tokio::time::timeout(self.start_timeout, self.handshake()).await {
            Ok(Ok(tools)) => {
                tracing::debug!(server = %self.name, tools = tools.len(), "tool server ready");
                self.tools = tools;
                self.state = ServerState::Ready;
                Ok(())
            }
            Ok(Err(err)) => {
                self.state = ServerState::Failed;
                Err(self.start_error(err.to_string()))
            }
            Err(_) => {
                self.state = ServerState::Failed;
                Err(self.start_error("handshake timed out"))
            }
        }
    }

    async fn handshake(&mut self) -> Result<Vec<ToolDescriptor>> {
        let channel = self.channel.as_mut().ok_or_else(|| {
            ConfabError::InvalidState("tool server channel already released".into())
        })?;

        channel
            .request(
                "initialize",
                serde_json::json!({
                    "protocolVersion": "1.0",
                    "client": { "name": "confab", "version": env!("CARGO_PKG_VERSION") },
                }),
            )
            .await?;

        let listed = channel
            .request("tools/list", serde_json::json!({}))
            .await?;
        let payload: ToolListPayload = serde_json::from_value(listed)?;
        Ok(payload.tools)
    }

    /// Invoke a tool. Valid only in `Ready`.
    ///
    /// A server-rejected call surfaces as `ToolInvocation`; a broken channel
    /// surfaces as `ServerUnavailable` and fails the client.
    pub async fn invoke(
        &mut self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if self.state != ServerState::Ready {
            return Err(ConfabError::InvalidState(format!(
                "server '{}' cannot invoke in state {}",
                self.name, self.state
            )));
        }

        let channel = self.channel.as_mut().ok_or_else(|| {
            ConfabError::InvalidState("tool server channel already released".into())
        })?;

        let result = channel
            .request(
                "tools/call",
                serde_json::json!({ "name": tool_name, "arguments": arguments }),
            )
            .await;

        match result {
            Ok(payload) => map_call_payload(tool_name, payload),
            Err(ConfabError::ToolInvocation { message, .. }) => Err(ConfabError::ToolInvocation {
                tool: tool_name.to_string(),
                message,
            }),
            Err(err @ ConfabError::ServerUnavailable { .. }) => {
                self.state = ServerState::Failed;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Best-effort graceful shutdown. The channel is released
    /// unconditionally, even when shutdown signaling fails.
    pub async fn stop(&mut self) {
        self.state = ServerState::Stopping;
        if let Some(mut channel) = self.channel.take() {
            channel.notify("shutdown").await;
            channel.close().await;
        }
        self.state = ServerState::Stopped;
    }

    fn start_error(&self, message: impl Into<String>) -> ConfabError {
        ConfabError::ServerStart {
            server: self.name.clone(),
            message: message.into(),
        }
    }
}

/// Interpret a `tools/call` result payload. A payload flagged `isError`
/// becomes a `ToolInvocation` error carrying the server's message.
fn map_call_payload(tool_name: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
    let is_error = payload
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let output = payload
        .get("output")
        .cloned()
        .unwrap_or_else(|| payload.clone());

    if is_error {
        let message = match &output {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(ConfabError::ToolInvocation {
            tool: tool_name.to_string(),
            message,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ScriptedChannel {
        responses: VecDeque<Result<serde_json::Value>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedChannel {
        fn new(responses: Vec<Result<serde_json::Value>>) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    responses: responses.into(),
                    closed: closed.clone(),
                },
                closed,
            )
        }
    }

    #[async_trait]
    impl ToolChannel for ScriptedChannel {
        async fn request(
            &mut self,
            _method: &str,
            _params: serde_json::Value,
        ) -> Result<serde_json::Value> {
            self.responses.pop_front().unwrap_or_else(|| {
                Err(ConfabError::ServerUnavailable {
                    server: "scripted".into(),
                    message: "script exhausted".into(),
                })
            })
        }

        async fn notify(&mut self, _method: &str) {}

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn ready_responses() -> Vec<Result<serde_json::Value>> {
        vec![
            Ok(json!({"protocolVersion": "1.0"})),
            Ok(json!({"tools": [{"name": "file-reader", "description": "read files"}]})),
        ]
    }

    #[tokio::test]
    async fn start_discovers_capabilities() {
        let (channel, _) = ScriptedChannel::new(ready_responses());
        let mut client = ToolServerClient::new("example-server", Box::new(channel));

        client.start().await.unwrap();

        assert_eq!(client.state(), ServerState::Ready);
        assert_eq!(client.tools().len(), 1);
        assert_eq!(client.tools()[0].name, "file-reader");
    }

    #[tokio::test]
    async fn invoke_before_start_is_invalid() {
        let (channel, _) = ScriptedChannel::new(Vec::new());
        let mut client = ToolServerClient::new("s", Box::new(channel));

        let err = client.invoke("t", json!({})).await.unwrap_err();
        assert!(matches!(err, ConfabError::InvalidState(_)));
    }

    #[tokio::test]
    async fn failed_handshake_fails_the_client() {
        let (channel, _) = ScriptedChannel::new(vec![Err(ConfabError::ServerUnavailable {
            server: "s".into(),
            message: "spawn refused".into(),
        })]);
        let mut client = ToolServerClient::new("s", Box::new(channel));

        let err = client.start().await.unwrap_err();
        assert!(matches!(err, ConfabError::ServerStart { server, .. } if server == "s"));
        assert_eq!(client.state(), ServerState::Failed);
    }

    #[tokio::test]
    async fn start_twice_is_invalid() {
        let mut responses = ready_responses();
        responses.extend(ready_responses());
        let (channel, _) = ScriptedChannel::new(responses);
        let mut client = ToolServerClient::new("s", Box::new(channel));

        client.start().await.unwrap();
        let err = client.start().await.unwrap_err();
        assert!(matches!(err, ConfabError::InvalidState(_)));
    }

    #[tokio::test]
    async fn invoke_returns_output_payload() {
        let mut responses = ready_responses();
        responses.push(Ok(json!({"output": "file contents"})));
        let (channel, _) = ScriptedChannel::new(responses);
        let mut client = ToolServerClient::new("s", Box::new(channel));
        client.start().await.unwrap();

        let output = client.invoke("file-reader", json!({"path": "a"})).await.unwrap();
        assert_eq!(output, json!("file contents"));
    }

    #[tokio::test]
    async fn error_payload_maps_to_tool_invocation() {
        let mut responses = ready_responses();
        responses.push(Ok(json!({"isError": true, "output": "no such file"})));
        let (channel, _) = ScriptedChannel::new(responses);
        let mut client = ToolServerClient::new("s", Box::new(channel));
        client.start().await.unwrap();

        let err = client.invoke("file-reader", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ConfabError::ToolInvocation { tool, message }
            if tool == "file-reader" && message.contains("no such file")
        ));
        assert_eq!(client.state(), ServerState::Ready);
    }

    #[tokio::test]
    async fn broken_channel_fails_the_client() {
        let mut responses = ready_responses();
        responses.push(Err(ConfabError::ServerUnavailable {
            server: "s".into(),
            message: "pipe closed".into(),
        }));
        let (channel, _) = ScriptedChannel::new(responses);
        let mut client = ToolServerClient::new("s", Box::new(channel));
        client.start().await.unwrap();

        let err = client.invoke("file-reader", json!({})).await.unwrap_err();
        assert!(matches!(err, ConfabError::ServerUnavailable { .. }));
        assert_eq!(client.state(), ServerState::Failed);
    }

    #[tokio::test]
    async fn stop_releases_the_channel_unconditionally() {
        let (channel, closed) = ScriptedChannel::new(ready_responses());
        let mut client = ToolServerClient::new("s", Box::new(channel));
        client.start().await.unwrap();

        client.stop().await;

        assert_eq!(client.state(), ServerState::Stopped);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn hung_handshake_times_out() {
        struct StallingChannel;

        #[async_trait]
        impl ToolChannel for StallingChannel {
            async fn request(
                &mut self,
                _method: &str,
                _params: serde_json::Value,
            ) -> Result<serde_json::Value> {
                futures::future::pending().await
            }

            async fn notify(&mut self, _method: &str) {}

            async fn close(&mut self) {}
        }

        let mut client = ToolServerClient::new("s", Box::new(StallingChannel))
            .with_start_timeout(Duration::from_millis(20));

        let err = client.start().await.unwrap_err();
        assert!(
            matches!(err, ConfabError::ServerStart { message, .. } if message.contains("timed out"))
        );
        assert_eq!(client.state(), ServerState::Failed);
    }
}
