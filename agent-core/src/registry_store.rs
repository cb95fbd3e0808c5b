//! Load/save for `<config_dir>/mcp_registry.json`: a flat
//! `{"servers": [...]}` document, keyed by server name once loaded into
//! memory.

use std::collections::HashMap;
use std::path::Path;

use agent_protocol::MCPServer;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    servers: Vec<MCPServer>,
}

/// Missing or unparsable files yield an empty registry, matching the
/// original's broad `except Exception: return {}`.
pub fn load(path: &Path) -> HashMap<String, MCPServer> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    let Ok(doc) = serde_json::from_str::<RegistryDoc>(&text) else {
        return HashMap::new();
    };
    doc.servers.into_iter().map(|s| (s.name.clone(), s)).collect()
}

pub fn save(path: &Path, servers: &HashMap<String, MCPServer>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut servers: Vec<MCPServer> = servers.values().cloned().collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));
    let doc = RegistryDoc { servers };
    std::fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

/// Accepts either a list of argv tokens or a single shell-quoted string.
pub fn parse_command(value: &serde_json::Value) -> Result<Vec<String>> {
    use crate::error::AgentError;
    match value {
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect()),
        serde_json::Value::String(s) => shlex::split(s)
            .ok_or_else(|| AgentError::Tool("invalid command string".to_string())),
        _ => Err(AgentError::Tool("command must be a list or string".to_string())),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcp_registry.json");
        let mut servers = HashMap::new();
        servers.insert(
            "demo".to_string(),
            MCPServer {
                name: "demo".to_string(),
                transport: "stdio".to_string(),
                command: vec!["echo".to_string(), "hi".to_string()],
                cwd: None,
                env: HashMap::new(),
                enabled: true,
            },
        );
        save(&path, &servers).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded.get("demo").unwrap().command, vec!["echo", "hi"]);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(load(&path).is_empty());
    }

    #[test]
    fn parse_command_splits_shell_string() {
        let value = serde_json::json!("echo hello world");
        assert_eq!(parse_command(&value).unwrap(), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn parse_command_accepts_list() {
        let value = serde_json::json!(["echo", "hi"]);
        assert_eq!(parse_command(&value).unwrap(), vec!["echo", "hi"]);
    }
}
