//! Stdio transport for the Model Context Protocol: a child process speaking
//! LSP-style `Content-Length`-framed JSON-RPC 2.0 over its stdin/stdout.
//!
//! Wire semantics: header/body framing, an id-matched response loop, and
//! a best-effort initialize/shutdown handshake.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use agent_mcp_types::CallToolParams;
use agent_mcp_types::ClientInfo;
use agent_mcp_types::InitializeParams;
use agent_mcp_types::JsonRpcMessage;
use agent_mcp_types::JsonRpcRequest;
use agent_mcp_types::MCP_PROTOCOL_VERSION;
use agent_mcp_types::ToolsListResult;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum McpClientError {
    #[error("process not running")]
    NotRunning,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("timed out waiting for mcp message")]
    Timeout,
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("missing Content-Length header")]
    MissingContentLength,
}

pub type Result<T> = std::result::Result<T, McpClientError>;

/// A connection to one MCP server, opened for the duration of a single
/// logical operation (or a short burst of them) and then closed, per the
/// scoped open/close discipline this crate follows throughout.
pub struct McpStdioClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: AtomicI64,
    io_timeout: Duration,
}

impl McpStdioClient {
    /// Spawn `command[0]` with `command[1..]` as arguments, `cwd` and
    /// additional `env` vars layered over the parent environment.
    pub async fn new_stdio_client(
        command: &[String],
        cwd: Option<&str>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let (program, args) = command.split_first().ok_or(McpClientError::NotRunning)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take().ok_or(McpClientError::NotRunning)?;
        let stdout = BufReader::new(child.stdout.take().ok_or(McpClientError::NotRunning)?);

        let mut client = Self {
            child,
            stdin,
            stdout,
            next_id: AtomicI64::new(1),
            io_timeout: Duration::from_secs(30),
        };

        // Best-effort initialize handshake; some servers skip it entirely.
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({"tools": {"list": true, "call": true}}),
            client_info: ClientInfo {
                name: "agent-cli".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let _ = client
            .request("initialize", Some(serde_json::to_value(params)?))
            .await;

        Ok(client)
    }

    async fn write_message(&mut self, body: &Value) -> Result<()> {
        let data = serde_json::to_vec(body)?;
        let header = format!("Content-Length: {}\r\n\r\n", data.len());
        self.stdin.write_all(header.as_bytes()).await?;
        self.stdin.write_all(&data).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<JsonRpcMessage> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                let n = self.stdout.read(&mut byte).await?;
                if n == 0 {
                    return Err(McpClientError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "mcp server closed stdout",
                    )));
                }
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().ok();
                }
            }
        }
        let content_length = content_length.ok_or(McpClientError::MissingContentLength)?;
        let mut body = vec![0u8; content_length];
        self.stdout.read_exact(&mut body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        self.write_message(&serde_json::to_value(&req)?).await?;
        loop {
            let msg = tokio::time::timeout(self.io_timeout, self.read_message())
                .await
                .map_err(|_| McpClientError::Timeout)??;
            let Some(msg_id) = msg.id.as_ref().and_then(Value::as_i64) else {
                // Notification or a response meant for someone else; skip it.
                continue;
            };
            if msg_id != id {
                continue;
            }
            if let Some(err) = msg.error {
                return Err(McpClientError::Rpc(err.to_string()));
            }
            return Ok(msg.result.unwrap_or(Value::Null));
        }
    }

    pub async fn list_tools(&mut self) -> Result<ToolsListResult> {
        let result = self.request("tools/list", Some(json!({}))).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    /// Best-effort shutdown request followed by process termination,
    /// matching `MCPStdIOClient.close`.
    pub async fn close(mut self) {
        let _ = self.request("shutdown", Some(json!({}))).await;
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let command = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let result = McpStdioClient::new_stdio_client(&command, None, &HashMap::new()).await;
        assert!(result.is_err());
    }
}
