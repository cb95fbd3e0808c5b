//! `git` tool: shells out to the `git` binary with an argv built from a
//! shlex-split argument string.

use serde_json::Value;
use serde_json::json;
use tokio::process::Command;

use crate::tools::ToolContext;
use crate::util::tail_bytes;

const TIMEOUT_SECS: u64 = 120;

pub async fn run_git(args: &Value, ctx: &ToolContext<'_>) -> Value {
    let argv = args.get("args").and_then(Value::as_str).unwrap_or("");
    let cwd = args
        .get("cwd")
        .and_then(Value::as_str)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| ctx.workspace_root.to_path_buf());

    let Some(tokens) = shlex::split(argv) else {
        return json!({"error": "invalid argument syntax"});
    };

    let mut command = Command::new("git");
    command.args(&tokens).current_dir(&cwd).kill_on_drop(true);

    match tokio::time::timeout(std::time::Duration::from_secs(TIMEOUT_SECS), command.output()).await {
        Ok(Ok(output)) => {
            let (stdout, _) = tail_bytes(&output.stdout, 50_000);
            let (stderr, _) = tail_bytes(&output.stderr, 50_000);
            json!({
                "returncode": output.status.code(),
                "stdout": String::from_utf8_lossy(stdout),
                "stderr": String::from_utf8_lossy(stderr),
            })
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => json!({"error": "git not found"}),
        Ok(Err(e)) => json!({"error": e.to_string()}),
        Err(_) => json!({"error": format!("timeout after {TIMEOUT_SECS}s")}),
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
    async fn git_version_runs_successfully() {
        let dir = tempdir().unwrap();
        let result = run_git(&json!({"args": "--version"}), &ctx(dir.path())).await;
        assert_eq!(result["returncode"], 0);
    }
}
