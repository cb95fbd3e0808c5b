//! `mcp` tool: registry CRUD plus scoped `list_tools`/`call_tool` dispatch
//! to a short-lived `McpStdioClient`.

use agent_mcp_client::McpStdioClient;
use agent_protocol::MCPServer;
use serde_json::Value;
use serde_json::json;

use crate::registry_store;
use crate::tools::ToolContext;

pub async fn dispatch(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let action = args.get("action").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let mut servers = registry_store::load(ctx.mcp_registry_path);

    match action.as_str() {
        "list_servers" => json!({
            "path": ctx.mcp_registry_path.to_string_lossy(),
            "servers": servers.values().collect::<Vec<_>>(),
        }),
        "register" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else {
                return json!({"error": "name is required"});
            };
            let command = match args.get("command") {
                Some(c) => match registry_store::parse_command(c) {
                    Ok(c) => c,
                    Err(e) => return json!({"error": e.to_string()}),
                },
                None => Vec::new(),
            };
            let server = MCPServer {
                name: name.to_string(),
                transport: "stdio".to_string(),
                command,
                cwd: args.get("cwd").and_then(Value::as_str).map(str::to_string),
                env: args
                    .get("env")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
                    .unwrap_or_default(),
                enabled: true,
            };
            servers.insert(name.to_string(), server.clone());
            if let Err(e) = registry_store::save(ctx.mcp_registry_path, &servers) {
                return json!({"error": e.to_string()});
            }
            json!({"saved": true, "server": server, "path": ctx.mcp_registry_path.to_string_lossy()})
        }
        "unregister" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else {
                return json!({"error": "name is required"});
            };
            if servers.remove(name).is_some() {
                if let Err(e) = registry_store::save(ctx.mcp_registry_path, &servers) {
                    return json!({"error": e.to_string()});
                }
                json!({"removed": true, "name": name})
            } else {
                json!({"removed": false, "error": "not found"})
            }
        }
        "get_config" => json!({
            "path": ctx.mcp_registry_path.to_string_lossy(),
            "config": {"servers": servers.values().collect::<Vec<_>>()},
        }),
        "set_config" => {
            let new_servers: Vec<MCPServer> = args
                .get("config")
                .and_then(|c| c.get("servers"))
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect())
                .unwrap_or_default();
            let count = new_servers.len();
            let map = new_servers.into_iter().map(|s| (s.name.clone(), s)).collect();
            if let Err(e) = registry_store::save(ctx.mcp_registry_path, &map) {
                return json!({"error": e.to_string()});
            }
            json!({"saved": true, "count": count})
        }
        "list_tools" | "call_tool" => {
            let Some(name) = args.get("name").and_then(Value::as_str) else {
                return json!({"error": "name is required"});
            };
            let Some(server) = servers.get(name) else {
                return json!({"error": format!("server {name} not found")});
            };
            if server.transport != "stdio" {
                return json!({"error": format!("transport {} not supported", server.transport)});
            }
            let client = McpStdioClient::new_stdio_client(&server.command, server.cwd.as_deref(), &server.env).await;
            let mut client = match client {
                Ok(c) => c,
                Err(e) => return json!({"error": e.to_string()}),
            };
            let result = if action == "list_tools" {
                client.list_tools().await.and_then(|r| Ok(serde_json::to_value(r)?))
            } else {
                let Some(tool) = args.get("tool").and_then(Value::as_str) else {
                    client.close().await;
                    return json!({"error": "tool is required"});
                };
                let arguments = args.get("arguments").cloned().unwrap_or_else(|| json!({}));
                client.call_tool(tool, arguments).await
            };
            client.close().await;
            match result {
                Ok(v) => v,
                Err(e) => json!({"error": e.to_string()}),
            }
        }
        other => json!({"error": format!("unknown action {other}")}),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(root: &std::path::Path) -> ToolContext<'_> {
        ToolContext {
            workspace_root: root,
            config_dir: root,
            tool_timeout: std::time::Duration::from_secs(5),
            mcp_registry_path: root,
        }
    }

    #[tokio::test]
    async fn register_then_list_servers_round_trips() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("mcp_registry.json");
        let c = ToolContext { mcp_registry_path: &registry_path, ..ctx(dir.path()) };
        dispatch(&json!({"action": "register", "name": "demo", "command": ["echo", "hi"]}), &c).await;
        let result = dispatch(&json!({"action": "list_servers"}), &c).await;
        assert_eq!(result["servers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unregister_missing_server_reports_not_found() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("mcp_registry.json");
        let c = ToolContext { mcp_registry_path: &registry_path, ..ctx(dir.path()) };
        let result = dispatch(&json!({"action": "unregister", "name": "ghost"}), &c).await;
        assert_eq!(result["removed"], false);
    }
}
