//! `tmux` tool: `ensure`/`send`/`capture`/`list` actions, each a thin shell
//! over the `tmux` binary.
//!
//! `send` passes the command text and the literal argv token `Enter` to
//! `tmux send-keys` — this is `tmux send-keys`'s own key-name syntax and
//! is intentional, not a placeholder.

use serde_json::Value;
use serde_json::json;
use tokio::process::Command;

const TIMEOUT_SECS: u64 = 30;

async fn run(args: &[&str]) -> Value {
    let mut command = Command::new("tmux");
    command.args(args).kill_on_drop(true);
    match tokio::time::timeout(std::time::Duration::from_secs(TIMEOUT_SECS), command.output()).await {
        Ok(Ok(output)) => json!({
            "args": args,
            "returncode": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }),
        Ok(Err(e)) => json!({"args": args, "error": e.to_string()}),
        Err(_) => json!({"args": args, "error": format!("timeout after {TIMEOUT_SECS}s")}),
    }
}

async fn has_session(name: &str) -> bool {
    let mut command = Command::new("tmux");
    command.args(["has-session", "-t", name]).kill_on_drop(true);
    matches!(command.status().await, Ok(status) if status.success())
}

pub async fn ensure(name: &str, cwd: Option<&str>) -> Value {
    if has_session(name).await {
        return json!({"session": name, "created": false});
    }
    let mut args = vec!["new-session", "-d", "-s", name];
    if let Some(cwd) = cwd {
        args.push("-c");
        args.push(cwd);
    }
    let result = run(&args).await;
    if result.get("returncode").and_then(Value::as_i64) == Some(0) {
        json!({"session": name, "created": true})
    } else {
        json!({"session": name, "error": result})
    }
}

pub async fn send(name: &str, command: &str) -> Value {
    run(&["send-keys", "-t", name, command, "Enter"]).await
}

pub async fn capture(name: &str, last_lines: i64) -> Value {
    let start = format!("-{last_lines}");
    let result = run(&["capture-pane", "-t", name, "-p", "-S", &start]).await;
    json!({
        "session": name,
        "output": result.get("stdout").cloned().unwrap_or(Value::Null),
        "returncode": result.get("returncode").cloned().unwrap_or(Value::Null),
    })
}

pub async fn list() -> Value {
    let result = run(&["list-sessions", "-F", "#{session_name}"]).await;
    if result.get("returncode").and_then(Value::as_i64) != Some(0) {
        return json!({"error": result});
    }
    let sessions: Vec<&str> = result
        .get("stdout")
        .and_then(Value::as_str)
        .unwrap_or("")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    json!({"sessions": sessions})
}

pub async fn dispatch(args: &Value) -> Value {
    let action = args.get("action").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let name = args.get("name").and_then(Value::as_str).unwrap_or("agent");
    match action.as_str() {
        "ensure" => ensure(name, args.get("cwd").and_then(Value::as_str)).await,
        "send" => send(name, args.get("command").and_then(Value::as_str).unwrap_or("")).await,
        "capture" => capture(name, args.get("last_lines").and_then(Value::as_i64).unwrap_or(500)).await,
        "list" => list().await,
        other => json!({"error": format!("unknown tmux action {other}")}),
    }
}
