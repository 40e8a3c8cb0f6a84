//! Role definitions and system-prompt composition.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::server::ToolCatalog;

/// A resolved role: base definition, role-specific instructions, and an
/// optional allow-list of tool server names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleConfig {
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub instructions: String,
    /// `None` leaves every configured server available.
    #[serde(default)]
    pub allowed_servers: Option<Vec<String>>,
}

/// External collaborator that resolves role names. An unresolvable role is
/// an error, not an empty config.
pub trait RoleProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Result<RoleConfig>;
}

/// Compose a session system prompt from a role definition, its instruction
/// sections, and the tool catalog's advertisement.
pub fn compose_system_prompt(role: &RoleConfig, catalog: &ToolCatalog) -> String {
    let mut prompt = role.definition.trim().to_string();
    if !role.instructions.trim().is_empty() {
        prompt.push_str("\n\n## Instructions\n");
        prompt.push_str(role.instructions.trim());
    }
    prompt.push_str("\n\n## Tools\n");
    prompt.push_str(&catalog.prompt_section());
    prompt
}
