//! `run_shell`: argv-split subprocess execution, no shell interpolation.

use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tokio::process::Command;

use crate::tools::ToolContext;
use crate::util::tail_bytes;

pub async fn run_shell(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let cmd = args.get("cmd").and_then(Value::as_str).unwrap_or("");
    let timeout = args
        .get("timeout")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(ctx.tool_timeout);
    let cwd = args
        .get("cwd")
        .and_then(Value::as_str)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| ctx.workspace_root.to_path_buf());

    let Some(argv) = shlex::split(cmd) else {
        return json!({"cmd": cmd, "error": "invalid shell syntax"});
    };
    let Some((program, rest)) = argv.split_first() else {
        return json!({"cmd": cmd, "error": "empty command"});
    };

    let mut command = Command::new(program);
    command.args(rest).current_dir(&cwd).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            let (stdout, _) = tail_bytes(&output.stdout, 50_000);
            let (stderr, _) = tail_bytes(&output.stderr, 50_000);
            json!({
                "cmd": cmd,
                "returncode": output.status.code(),
                "stdout": String::from_utf8_lossy(stdout),
                "stderr": String::from_utf8_lossy(stderr),
            })
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            json!({"cmd": cmd, "error": "command not found"})
        }
        Ok(Err(e)) => json!({"cmd": cmd, "error": e.to_string()}),
        Err(_) => json!({"cmd": cmd, "error": format!("timeout after {}s", timeout.as_secs())}),
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
            tool_timeout: Duration::from_secs(5),
            mcp_registry_path: root,
        }
    }

    #[tokio::test]
    async fn runs_argv_split_command() {
        let dir = tempdir().unwrap();
        let result = run_shell(&json!({"cmd": "echo hello"}), &ctx(dir.path())).await;
        assert_eq!(result["stdout"], "hello\n");
        assert_eq!(result["returncode"], 0);
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let dir = tempdir().unwrap();
        let result = run_shell(&json!({"cmd": "definitely-not-a-real-binary-xyz"}), &ctx(dir.path())).await;
        assert_eq!(result["error"], "command not found");
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let dir = tempdir().unwrap();
        let result = run_shell(&json!({"cmd": "sleep 5", "timeout": 1}), &ctx(dir.path())).await;
        assert!(result["error"].as_str().unwrap().contains("timeout"));
    }
}
