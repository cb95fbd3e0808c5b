use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Error taxonomy. `Protocol`/`Tool` are deliberately *not* propagated out
/// of the deliberation loop — they are caught and turned into corrective
/// messages or `{error: ...}` result maps — but are still modeled here
/// because the loop needs to distinguish them internally, and tool
/// handlers return `Err` before the dispatcher reifies it into a result
/// map.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("no matching pending approval")]
    Approval,

    #[error("path escapes workspace root: {0}")]
    WorkspaceEscape(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Mcp(#[from] agent_mcp_client::McpClientError),
}

impl AgentError {
    /// Maps onto the CLI exit-code convention: usage/config errors exit 2,
    /// everything else that reaches the binary boundary exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Usage(_) => 2,
            _ => 1,
        }
    }
}
