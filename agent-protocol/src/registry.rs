use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// One entry in `<config_dir>/mcp_registry.json`'s `servers` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MCPServer {
    pub name: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_transport() -> String {
    "stdio".to_string()
}

fn default_enabled() -> bool {
    true
}
