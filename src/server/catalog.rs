//! Aggregated index of tools reported by the configured servers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tool descriptor as reported by a server's capability list.
///
/// The input schema is informational (used when advertising tools to the
/// model); argument validation stays with the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: Option<serde_json::Value>,
}

/// One catalog entry, unique per (server, tool) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub server: String,
    pub tool: ToolDescriptor,
}

/// In-memory index of available tools keyed by (server, tool).
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: BTreeMap<(String, String), CatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all entries for `server` with its freshly reported tools.
    pub fn set_server_tools(&mut self, server: &str, tools: Vec<ToolDescriptor>) {
        self.remove_server(server);
        for tool in tools {
            self.entries.insert(
                (server.to_string(), tool.name.clone()),
                CatalogEntry {
                    server: server.to_string(),
                    tool,
                },
            );
        }
    }

    pub fn remove_server(&mut self, server: &str) {
        self.entries.retain(|(s, _), _| s != server);
    }

    pub fn contains(&self, server: &str, tool: &str) -> bool {
        self.entries
            .contains_key(&(server.to_string(), tool.to_string()))
    }

    pub fn get(&self, server: &str, tool: &str) -> Option<&CatalogEntry> {
        self.entries.get(&(server.to_string(), tool.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render a prompt section advertising the available tools.
    pub fn prompt_section(&self) -> String {
        if self.entries.is_empty() {
            return String::from("No tools are currently available.");
        }

        let mut section = String::from("Available tools:\n");
        for entry in self.entries.values() {
            section.push_str(&format!(
                "- {}/{}: {}\n",
                entry.server,
                entry.tool.name,
                entry.tool.description.as_deref().unwrap_or("(no description)")
            ));
        }
        section
    }
}
