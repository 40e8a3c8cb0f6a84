//! Aggregation and routing across the configured tool servers.

use std::collections::{HashMap, HashSet};

use crate::config::{OrchestratorSettings, ToolServerConfig};
use crate::error::{ConfabError, Result};
use crate::server::{ChildProcessChannel, ToolCatalog, ToolChannel, ToolServerClient};

/// Gate consulted before a tool call is dispatched.
///
/// With auto-approval enabled every call passes. Otherwise only tools on the
/// pre-approved list (`server/tool`) reach the server; everything else is
/// rejected with an `ApprovalRequired` error. This is caller policy, not a
/// protocol requirement.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    auto_approve: bool,
    approved: HashSet<String>,
}

impl ApprovalPolicy {
    /// Approve every call.
    pub fn auto() -> Self {
        Self {
            auto_approve: true,
            approved: HashSet::new(),
        }
    }

    /// Approve only the listed `server/tool` pairs.
    pub fn allow_list(pairs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            auto_approve: false,
            approved: pairs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, server: &str, tool: &str) -> bool {
        self.auto_approve || self.approved.contains(&format!("{server}/{tool}"))
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::auto()
    }
}

/// Owns the set of tool server clients, aggregates their catalogs, and
/// routes invocations to the right client.
pub struct ToolHub {
    clients: HashMap<String, ToolServerClient>,
    catalog: ToolCatalog,
    approval: ApprovalPolicy,
}

impl ToolHub {
    /// Empty hub; servers are added via [`ToolHub::start_servers`] or
    /// [`ToolHub::add_client`].
    pub fn new(approval: ApprovalPolicy) -> Self {
        Self {
            clients: HashMap::new(),
            catalog: ToolCatalog::new(),
            approval,
        }
    }

    /// Spawn and start every configured server concurrently.
    ///
    /// A single server's failure is logged and skipped; the rest of the hub
    /// comes up. Partial availability is expected, not fatal.
    pub async fn start_servers(
        &mut self,
        configs: Vec<ToolServerConfig>,
        settings: &OrchestratorSettings,
    ) {
        let startups = configs.into_iter().map(|config| {
            let timeout = settings.start_timeout;
            async move {
                let name = config.name.clone();
                let channel = match ChildProcessChannel::spawn(&config) {
                    Ok(channel) => channel,
                    Err(err) => return (name, Err(err)),
                };
                let mut client = ToolServerClient::new(name.as_str(), Box::new(channel))
                    .with_start_timeout(timeout);
                match client.start().await {
                    Ok(()) => (name, Ok(client)),
                    Err(err) => (name, Err(err)),
                }
            }
        });

        for (name, outcome) in futures::future::join_all(startups).await {
            match outcome {
                Ok(client) => self.register(client),
                Err(err) => {
                    tracing::warn!(server = %name, error = %err, "tool server failed to start");
                }
            }
        }
    }

    /// Start and register a client over an already-built channel.
    pub async fn add_client(
        &mut self,
        name: &str,
        channel: Box<dyn ToolChannel>,
    ) -> Result<()> {
        let mut client = ToolServerClient::new(name, channel);
        client.start().await?;
        self.register(client);
        Ok(())
    }

    fn register(&mut self, client: ToolServerClient) {
        self.catalog
            .set_server_tools(client.name(), client.tools().to_vec());
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    /// Dispatch one tool call to the owning server's client.
    ///
    /// Pass-through, no retry: the result (or failure) comes back unchanged
    /// and retry policy stays with the caller.
    pub async fn call_tool(
        &mut self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if !self.clients.contains_key(server) {
            return Err(ConfabError::UnknownServer(server.to_string()));
        }
        if self.catalog.get(server, tool).is_none() {
            return Err(ConfabError::UnknownTool {
                server: server.to_string(),
                tool: tool.to_string(),
            });
        }
        if !self.approval.allows(server, tool) {
            return Err(ConfabError::ApprovalRequired {
                server: server.to_string(),
                tool: tool.to_string(),
            });
        }

        let client = self
            .clients
            .get_mut(server)
            .ok_or_else(|| ConfabError::UnknownServer(server.to_string()))?;
        client.invoke(tool, arguments).await
    }

    /// Keep only the named servers, stopping and dropping the rest.
    /// Supports role-context switches that narrow the server set.
    pub async fn restrict_to(&mut self, allowed: &[String]) {
        let keep: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        let retired: Vec<String> = self
            .clients
            .keys()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect();

        for name in retired {
            if let Some(mut client) = self.clients.remove(&name) {
                client.stop().await;
            }
            self.catalog.remove_server(&name);
            tracing::debug!(server = %name, "tool server retired by role restriction");
        }
    }

    /// Stop every client. Best-effort; always leaves the hub empty.
    pub async fn shutdown(&mut self) {
        for (_, mut client) in self.clients.drain() {
            client.stop().await;
        }
        self.catalog = ToolCatalog::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedChannel {
        responses: VecDeque<Result<serde_json::Value>>,
    }

    impl ScriptedChannel {
        fn boxed(responses: Vec<Result<serde_json::Value>>) -> Box<dyn ToolChannel> {
            Box::new(Self {
                responses: responses.into(),
            })
        }

        fn ready(tool: &str) -> Vec<Result<serde_json::Value>> {
            vec![
                Ok(json!({})),
                Ok(json!({"tools": [{"name": tool, "description": "test tool"}]})),
            ]
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

        async fn close(&mut self) {}
    }

    async fn hub_with_reader(approval: ApprovalPolicy) -> ToolHub {
        let mut responses = ScriptedChannel::ready("file-reader");
        responses.push(Ok(json!({"output": "contents"})));
        let mut hub = ToolHub::new(approval);
        hub.add_client("example-server", ScriptedChannel::boxed(responses))
            .await
            .unwrap();
        hub
    }

    #[tokio::test]
    async fn unknown_server_is_rejected() {
        let mut hub = hub_with_reader(ApprovalPolicy::auto()).await;
        let err = hub.call_tool("x", "y", json!({})).await.unwrap_err();
        assert!(matches!(err, ConfabError::UnknownServer(name) if name == "x"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let mut hub = hub_with_reader(ApprovalPolicy::auto()).await;
        let err = hub
            .call_tool("example-server", "y", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfabError::UnknownTool { tool, .. } if tool == "y"));
    }

    #[tokio::test]
    async fn approval_gate_blocks_unapproved_tools() {
        let mut hub = hub_with_reader(ApprovalPolicy::allow_list(["other/tool"])).await;
        let err = hub
            .call_tool("example-server", "file-reader", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfabError::ApprovalRequired { .. }));
    }

    #[tokio::test]
    async fn preapproved_tool_is_dispatched() {
        let mut hub =
            hub_with_reader(ApprovalPolicy::allow_list(["example-server/file-reader"])).await;
        let output = hub
            .call_tool("example-server", "file-reader", json!({"path": "a"}))
            .await
            .unwrap();
        assert_eq!(output, json!("contents"));
    }

    #[tokio::test]
    async fn call_is_passed_through_unchanged() {
        let mut hub = hub_with_reader(ApprovalPolicy::auto()).await;
        let output = hub
            .call_tool("example-server", "file-reader", json!({"path": "a"}))
            .await
            .unwrap();
        assert_eq!(output, json!("contents"));
    }

    #[tokio::test]
    async fn one_failed_server_does_not_block_others() {
        let mut hub = ToolHub::new(ApprovalPolicy::auto());
        hub.add_client("good", ScriptedChannel::boxed(ScriptedChannel::ready("t")))
            .await
            .unwrap();
        let err = hub
            .add_client(
                "bad",
                ScriptedChannel::boxed(vec![Err(ConfabError::ServerUnavailable {
                    server: "bad".into(),
                    message: "refused".into(),
                })]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ConfabError::ServerStart { .. }));
        assert!(hub.catalog().contains("good", "t"));
        assert!(!hub.catalog().contains("bad", "t"));
    }

    #[tokio::test]
    async fn restrict_to_drops_other_servers() {
        let mut hub = ToolHub::new(ApprovalPolicy::auto());
        hub.add_client("a", ScriptedChannel::boxed(ScriptedChannel::ready("t1")))
            .await
            .unwrap();
        hub.add_client("b", ScriptedChannel::boxed(ScriptedChannel::ready("t2")))
            .await
            .unwrap();

        hub.restrict_to(&["a".to_string()]).await;

        assert!(hub.catalog().contains("a", "t1"));
        assert!(!hub.catalog().contains("b", "t2"));
        assert_eq!(hub.server_names(), vec!["a"]);
    }

    #[tokio::test]
    async fn start_servers_skips_unlaunchable_commands() {
        let mut hub = ToolHub::new(ApprovalPolicy::auto());
        hub.start_servers(
            vec![crate::config::ToolServerConfig::new(
                "ghost",
                "/definitely/not/a/command",
            )],
            &crate::config::OrchestratorSettings::default(),
        )
        .await;

        assert!(hub.server_names().is_empty());
        assert!(hub.catalog().is_empty());
    }

    #[tokio::test]
    async fn shutdown_empties_the_hub() {
        let mut hub = hub_with_reader(ApprovalPolicy::auto()).await;
        hub.shutdown().await;
        assert!(hub.catalog().is_empty());
        assert!(hub.server_names().is_empty());
    }
}
