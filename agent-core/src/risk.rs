//! Pure `(tool, args) -> {need_approval, reason}` classifier. No
//! shell/bash parsing: substring and token matching only.

use agent_protocol::ApprovalPolicy;
use serde_json::Value;

const DESTRUCTIVE_SUBSTR: &[&str] = &["mkfs", ":(){:|:&};:", "dd", "wipefs", "fdisk", "parted"];
const NETWORK_CMDS: &[&str] = &[
    "apt", "apt-get", "curl", "wget", "pip", "npm", "pnpm", "composer", "go", "cargo", "git",
];
const WRITE_CMDS: &[&str] = &[
    "rm", "mv", "cp", "chmod", "chown", "tee", "truncate", "sed", "awk", "touch", "mkdir",
    "rmdir", "ln", "systemctl", "service", "docker", "podman", "kubectl",
];

const GIT_NETWORK_SUBSTR: &[&str] = &["clone", "fetch", "pull", "submodule update", "remote add", "lfs"];
const GIT_WRITE_SUBSTR: &[&str] = &[
    "push",
    "commit",
    "merge",
    "rebase",
    "reset",
    "checkout",
    "apply",
    "cherry-pick",
    "revert",
];

const APPROVAL_REQUIRED_TOOLS: &[&str] = &[
    "write_file",
    "web_get",
    "web_search",
    "browser_headless",
    "manage_service",
    "delete_path",
    "move_path",
    "copy_path",
    "make_dir",
    "replace_in_file",
];

#[derive(Debug, Clone)]
pub struct RiskVerdict {
    pub need_approval: bool,
    pub reason: String,
}

impl RiskVerdict {
    fn no() -> Self {
        Self {
            need_approval: false,
            reason: "no approval required".to_string(),
        }
    }

    fn yes(reason: impl Into<String>) -> Self {
        Self {
            need_approval: true,
            reason: reason.into(),
        }
    }
}

fn classify_shell(cmd: &str) -> RiskVerdict {
    let tokens: Vec<String> = shlex::split(cmd)
        .unwrap_or_else(|| cmd.split_whitespace().map(str::to_string).collect());
    let lower = cmd.to_lowercase();

    if tokens.iter().any(|t| t == "sudo")
        || DESTRUCTIVE_SUBSTR.iter().any(|s| lower.contains(s))
    {
        return RiskVerdict::yes("destructive command");
    }

    let first = tokens.first().map(String::as_str).unwrap_or("");
    if NETWORK_CMDS.contains(&first) || lower.contains("http") {
        return RiskVerdict::yes("network-affecting command");
    }

    if WRITE_CMDS.contains(&first)
        || tokens.iter().any(|t| t == "--write" || t == "--save")
    {
        return RiskVerdict::yes("write-affecting command");
    }

    RiskVerdict::no()
}

fn classify_git(args: &str) -> RiskVerdict {
    let lower = args.to_lowercase();
    if GIT_NETWORK_SUBSTR.iter().any(|s| lower.contains(s)) {
        return RiskVerdict::yes("network-affecting git command");
    }
    if GIT_WRITE_SUBSTR.iter().any(|s| lower.contains(s)) {
        return RiskVerdict::yes("write-affecting git command");
    }
    RiskVerdict::no()
}

/// Assesses risk under the given policy. `args` is the tool's raw JSON
/// argument map, as parsed from the `LlmResponse::Tool` wire shape.
pub fn assess(policy: ApprovalPolicy, tool: &str, args: &Value) -> RiskVerdict {
    match policy {
        ApprovalPolicy::Always => RiskVerdict::yes("approval policy is 'always'"),
        ApprovalPolicy::Never => RiskVerdict::no(),
        ApprovalPolicy::OnRequest => assess_on_request(tool, args),
    }
}

fn assess_on_request(tool: &str, args: &Value) -> RiskVerdict {
    match tool {
        "run_shell" => args
            .get("cmd")
            .and_then(Value::as_str)
            .map(classify_shell)
            .unwrap_or_else(RiskVerdict::no),
        "git" => args
            .get("args")
            .and_then(Value::as_str)
            .map(classify_git)
            .unwrap_or_else(RiskVerdict::no),
        "tmux" => {
            if args.get("action").and_then(Value::as_str) == Some("send") {
                RiskVerdict::yes("tmux send injects keystrokes into a live session")
            } else {
                RiskVerdict::no()
            }
        }
        "mcp" => match args.get("action").and_then(Value::as_str) {
            Some("register") | Some("unregister") | Some("set_config") | Some("call_tool") => {
                RiskVerdict::yes("mcp action mutates registry state or invokes a remote tool")
            }
            _ => RiskVerdict::no(),
        },
        other if APPROVAL_REQUIRED_TOOLS.contains(&other) => {
            RiskVerdict::yes(format!("'{other}' requires approval under on-request policy"))
        }
        _ => RiskVerdict::no(),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn always_policy_requires_approval_for_any_tool() {
        let v = assess(ApprovalPolicy::Always, "read_file", &json!({"path": "a.txt"}));
        assert!(v.need_approval);
    }

    #[test]
    fn never_policy_never_requires_approval() {
        let v = assess(ApprovalPolicy::Never, "run_shell", &json!({"cmd": "rm -rf /"}));
        assert!(!v.need_approval);
    }

    #[test]
    fn sudo_is_destructive() {
        let v = assess(ApprovalPolicy::OnRequest, "run_shell", &json!({"cmd": "sudo ls"}));
        assert!(v.need_approval);
    }

    #[test]
    fn plain_read_command_is_safe() {
        let v = assess(ApprovalPolicy::OnRequest, "run_shell", &json!({"cmd": "ls -la"}));
        assert!(!v.need_approval);
    }

    #[test]
    fn curl_is_network() {
        let v = assess(ApprovalPolicy::OnRequest, "run_shell", &json!({"cmd": "curl https://example.com"}));
        assert!(v.need_approval);
    }

    #[test]
    fn rm_is_write() {
        let v = assess(ApprovalPolicy::OnRequest, "run_shell", &json!({"cmd": "rm file.txt"}));
        assert!(v.need_approval);
    }

    #[test]
    fn git_push_is_write() {
        let v = assess(ApprovalPolicy::OnRequest, "git", &json!({"args": "push origin main"}));
        assert!(v.need_approval);
    }

    #[test]
    fn git_status_is_safe() {
        let v = assess(ApprovalPolicy::OnRequest, "git", &json!({"args": "status"}));
        assert!(!v.need_approval);
    }

    #[test]
    fn tmux_send_requires_approval_but_capture_does_not() {
        assert!(assess(ApprovalPolicy::OnRequest, "tmux", &json!({"action": "send"})).need_approval);
        assert!(!assess(ApprovalPolicy::OnRequest, "tmux", &json!({"action": "capture"})).need_approval);
    }

    #[test]
    fn mcp_call_tool_requires_approval_but_list_tools_does_not() {
        assert!(assess(ApprovalPolicy::OnRequest, "mcp", &json!({"action": "call_tool"})).need_approval);
        assert!(!assess(ApprovalPolicy::OnRequest, "mcp", &json!({"action": "list_tools"})).need_approval);
    }

    #[test]
    fn write_file_always_requires_approval_under_on_request() {
        let v = assess(ApprovalPolicy::OnRequest, "write_file", &json!({"path": "x", "content": "y"}));
        assert!(v.need_approval);
    }

    #[test]
    fn read_file_never_requires_approval_under_on_request() {
        let v = assess(ApprovalPolicy::OnRequest, "read_file", &json!({"path": "x"}));
        assert!(!v.need_approval);
    }
}
