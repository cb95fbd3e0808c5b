use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// The two JSON shapes an LLM's free-form output is expected to parse into
/// `{"type":"tool", ...}` or `{"type":"final", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmResponse {
    Tool {
        id: String,
        tool: String,
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Final {
        content: String,
    },
}

/// The sentinel returned by `EventSink::approval_required`. Distinct from a
/// boolean: `Deferred` means the decision arrives later via
/// `resolve_approval(token, ...)`, not "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
    Deferred,
}

/// At most one live per `Session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub token: String,
    pub tool: String,
    pub tool_id: String,
    pub args: Value,
}

/// Every observable event the deliberation engine can emit to a sink,
/// serialized verbatim as SSE `event:`/`data:` frames by `agent-server` and
/// buffered verbatim by the synchronous `EventRecorder`. Names match the
/// names match the server's SSE event stream one-to-one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SinkEvent {
    AssistantDelta { delta: String },
    ReasoningDelta { delta: String },
    AssistantRaw { text: String },
    Reasoning { text: Option<String> },
    ToolCall {
        tool: String,
        id: String,
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    ToolResult { id: String, result: Value },
    Approval {
        tool: String,
        id: String,
        reason: String,
        args: Value,
        token: String,
    },
    Raw { value: Value },
    Final { content: String },
    Done,
}
