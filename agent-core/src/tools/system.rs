//! `manage_service` tool: shells out to `systemctl`.

use serde_json::Value;
use serde_json::json;
use tokio::process::Command;

const TIMEOUT_SECS: u64 = 60;
const ALLOWED_ACTIONS: &[&str] = &["start", "stop", "restart", "reload", "enable", "disable", "status"];

pub async fn manage_service(args: &Value) -> Value {
    let unit = args.get("unit").and_then(Value::as_str).unwrap_or("");
    let action = args.get("action").and_then(Value::as_str).unwrap_or("status").to_lowercase();
    let user = args.get("user").and_then(Value::as_bool).unwrap_or(false);

    if !ALLOWED_ACTIONS.contains(&action.as_str()) {
        return json!({"error": format!("unsupported action {action}")});
    }

    let mut command = Command::new("systemctl");
    if user {
        command.arg("--user");
    }
    command.args([action.as_str(), unit, "--no-pager"]).kill_on_drop(true);

    match tokio::time::timeout(std::time::Duration::from_secs(TIMEOUT_SECS), command.output()).await {
        Ok(Ok(output)) => json!({
            "unit": unit,
            "action": action,
            "returncode": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }),
        Ok(Err(e)) => json!({"unit": unit, "action": action, "error": e.to_string()}),
        Err(_) => json!({"unit": unit, "action": action, "error": format!("timeout after {TIMEOUT_SECS}s")}),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unsupported_action() {
        let result = manage_service(&json!({"unit": "foo.service", "action": "destroy"})).await;
        assert!(result["error"].as_str().unwrap().contains("unsupported"));
    }
}
