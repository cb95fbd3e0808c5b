//! Tool registry and dispatch. Every handler returns a
//! `serde_json::Value`, never a `Result` — errors are reified as
//! `{"error": "..."}` maps at the handler boundary so a misbehaving tool
//! can never panic or propagate out of the deliberation loop.

pub mod browser;
pub mod fs;
pub mod git;
pub mod mcp;
pub mod shell;
pub mod system;
pub mod tmux;
pub mod web;

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use crate::memory;
use crate::plan;

/// Everything a tool handler needs to know about where it's running.
/// Borrowed for the duration of one `dispatch` call.
pub struct ToolContext<'a> {
    pub workspace_root: &'a Path,
    pub config_dir: &'a Path,
    pub tool_timeout: Duration,
    pub mcp_registry_path: &'a Path,
}

fn err(msg: impl std::fmt::Display) -> Value {
    json!({"error": msg.to_string()})
}

fn to_value(result: crate::error::Result<Value>) -> Value {
    result.unwrap_or_else(err)
}

/// Dispatches one named tool call to its handler. Unknown tool names yield
/// `{"error": "unknown tool ..."}` rather than panicking.
pub async fn dispatch(tool: &str, args: &Value, ctx: &ToolContext<'_>) -> Value {
    match tool {
        "read_file" => fs::read_file(args, ctx),
        "write_file" => fs::write_file(args, ctx),
        "list_dir" => fs::list_dir(args, ctx),
        "delete_path" => fs::delete_path(args, ctx),
        "move_path" => fs::move_path(args, ctx),
        "copy_path" => fs::copy_path(args, ctx),
        "make_dir" => fs::make_dir(args, ctx),
        "replace_in_file" => fs::replace_in_file(args, ctx),

        "run_shell" => shell::run_shell(args, ctx).await,
        "git" => git::run_git(args, ctx).await,
        "tmux" => tmux::dispatch(args).await,
        "manage_service" => system::manage_service(args).await,
        "web_get" => web::web_get(args).await,
        "web_search" => web::web_search(args).await,
        "browser_headless" => browser::headless_browse(args).await,
        "mcp" => mcp::dispatch(args, ctx).await,

        "memory_add" => to_value(memory::add(
            ctx.config_dir,
            args.get("text").and_then(Value::as_str).unwrap_or(""),
            args.get("tags")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            args.get("meta").cloned().unwrap_or(Value::Null),
        )),
        "memory_search" => to_value(memory::search(
            ctx.config_dir,
            args.get("query").and_then(Value::as_str).unwrap_or(""),
            args.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize,
            args.get("tag").and_then(Value::as_str),
        )),
        "memory_list" => to_value(memory::list(
            ctx.config_dir,
            args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize,
            args.get("tag").and_then(Value::as_str),
        )),
        "memory_delete" => to_value(memory::delete(
            ctx.config_dir,
            args.get("id").and_then(Value::as_str).unwrap_or(""),
        )),
        "memory_update" => to_value(memory::update(
            ctx.config_dir,
            args.get("id").and_then(Value::as_str).unwrap_or(""),
            args.get("text").and_then(Value::as_str),
            args.get("tags")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
            args.get("meta").cloned(),
        )),

        "plan" => dispatch_plan(args, ctx),

        other => err(format!("unknown tool {other}")),
    }
}

/// Names every tool in the registry, used by the provider-facing tool
/// manifest and by `risk::assess`'s fixed approval-required list.
pub const TOOL_NAMES: &[&str] = &[
    "read_file",
    "write_file",
    "list_dir",
    "delete_path",
    "move_path",
    "copy_path",
    "make_dir",
    "replace_in_file",
    "run_shell",
    "git",
    "tmux",
    "manage_service",
    "web_get",
    "web_search",
    "browser_headless",
    "mcp",
    "memory_add",
    "memory_search",
    "memory_list",
    "memory_delete",
    "memory_update",
    "plan",
];

/// `plan` tool action dispatch: a single tool with an `action` field
/// (unlike the five separate `memory_*` tools).
fn dispatch_plan(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let action = args.get("action").and_then(Value::as_str).unwrap_or("");
    let id = || args.get("id").and_then(Value::as_str).unwrap_or("");
    match action {
        "create" => to_value(plan::create(
            ctx.config_dir,
            args.get("title").and_then(Value::as_str).unwrap_or(""),
            args.get("steps")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        )),
        "get" => to_value(plan::get(ctx.config_dir, id())),
        "list" => to_value(plan::list(ctx.config_dir)),
        "delete" => to_value(plan::delete(ctx.config_dir, id())),
        "add_step" => to_value(plan::add_step(
            ctx.config_dir,
            id(),
            args.get("text").and_then(Value::as_str).unwrap_or(""),
        )),
        "update_step" => to_value(plan::update_step(
            ctx.config_dir,
            id(),
            args.get("index").and_then(Value::as_u64).unwrap_or(0) as usize,
            args.get("status").and_then(Value::as_str).unwrap_or("pending"),
        )),
        other => err(format!("unknown plan action {other}")),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(root: &Path) -> ToolContext<'_> {
        ToolContext {
            workspace_root: root,
            config_dir: root,
            tool_timeout: Duration::from_secs(5),
            mcp_registry_path: root,
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_value_not_panic() {
        let dir = tempdir().unwrap();
        let result = dispatch("does_not_exist", &json!({}), &ctx(dir.path())).await;
        assert!(result["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn read_file_routes_through_dispatch() {
        let dir = tempdir().unwrap();
        dispatch("write_file", &json!({"path": "a.txt", "content": "hi"}), &ctx(dir.path())).await;
        let result = dispatch("read_file", &json!({"path": "a.txt"}), &ctx(dir.path())).await;
        assert_eq!(result["content"], "hi");
    }

    #[tokio::test]
    async fn memory_add_then_search_routes_through_dispatch() {
        let dir = tempdir().unwrap();
        dispatch("memory_add", &json!({"text": "hello world"}), &ctx(dir.path())).await;
        let result = dispatch("memory_search", &json!({"query": "hello"}), &ctx(dir.path())).await;
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plan_create_then_get_routes_through_dispatch() {
        let dir = tempdir().unwrap();
        let created = dispatch("plan", &json!({"action": "create", "title": "t", "steps": ["a"]}), &ctx(dir.path())).await;
        let id = created["id"].as_str().unwrap();
        let fetched = dispatch("plan", &json!({"action": "get", "id": id}), &ctx(dir.path())).await;
        assert_eq!(fetched["title"], "t");
    }
}
