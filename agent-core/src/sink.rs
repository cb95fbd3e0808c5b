//! The bidirectional callback surface between the deliberation engine and
//! whatever is consuming it: an `EventSink` trait with `NullSink`,
//! `CliSink`, and `EventRecorder` implementations.

use agent_protocol::ApprovalDecision;
use agent_protocol::SinkEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::sync::Mutex;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn assistant_raw(&self, _text: &str) {}
    async fn reasoning(&self, _text: Option<&str>) {}
    async fn stream_text(&self, _delta: &str) {}
    async fn stream_reasoning(&self, _delta: &str) {}
    async fn raw(&self, _value: &Value) {}
    async fn tool_call(&self, _tool: &str, _id: &str, _args: &Value, _note: Option<&str>) {}
    async fn tool_result(&self, _id: &str, _result: &Value) {}
    async fn final_message(&self, _content: &str) {}

    /// Returns the approval decision. `DEFER` signals the decision arrives
    /// later via `resolve_approval`.
    async fn approval_required(
        &self,
        _tool: &str,
        _id: &str,
        _reason: &str,
        _args: &Value,
        _token: &str,
    ) -> ApprovalDecision {
        ApprovalDecision::Deferred
    }
}

/// Swallows everything. Matches `NullSink`.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {}

/// Buffers every event as a `SinkEvent` for later synchronous inspection —
/// the basis for `POST /api/chat`'s `{events: [...]}` response shape and
/// for `agent-server`'s per-request SSE buffering. `approval_required`
/// always defers.
pub struct EventRecorder {
    events: Mutex<Vec<SinkEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    #[expect(clippy::expect_used)]
    pub fn take_events(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events.lock().expect("event recorder mutex poisoned"))
    }

    #[expect(clippy::expect_used)]
    fn push(&self, event: SinkEvent) {
        self.events.lock().expect("event recorder mutex poisoned").push(event);
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EventRecorder {
    async fn assistant_raw(&self, text: &str) {
        self.push(SinkEvent::AssistantRaw { text: text.to_string() });
    }

    async fn reasoning(&self, text: Option<&str>) {
        self.push(SinkEvent::Reasoning { text: text.map(str::to_string) });
    }

    async fn stream_text(&self, delta: &str) {
        self.push(SinkEvent::AssistantDelta { delta: delta.to_string() });
    }

    async fn stream_reasoning(&self, delta: &str) {
        self.push(SinkEvent::ReasoningDelta { delta: delta.to_string() });
    }

    async fn raw(&self, value: &Value) {
        self.push(SinkEvent::Raw { value: value.clone() });
    }

    async fn tool_call(&self, tool: &str, id: &str, args: &Value, note: Option<&str>) {
        self.push(SinkEvent::ToolCall {
            tool: tool.to_string(),
            id: id.to_string(),
            args: args.clone(),
            note: note.map(str::to_string),
        });
    }

    async fn tool_result(&self, id: &str, result: &Value) {
        self.push(SinkEvent::ToolResult { id: id.to_string(), result: result.clone() });
    }

    async fn final_message(&self, content: &str) {
        self.push(SinkEvent::Final { content: content.to_string() });
    }

    async fn approval_required(
        &self,
        tool: &str,
        id: &str,
        reason: &str,
        args: &Value,
        token: &str,
    ) -> ApprovalDecision {
        self.push(SinkEvent::Approval {
            tool: tool.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
            args: args.clone(),
            token: token.to_string(),
        });
        ApprovalDecision::Deferred
    }
}

/// Drives an interactive terminal approval prompt for `--chat` mode, with
/// an `auto_approve` toggle (`:auto on`/`:auto off`) typed at the prompt.
pub struct CliSink {
    auto_approve: Mutex<bool>,
}

impl CliSink {
    pub fn new(auto_approve: bool) -> Self {
        Self {
            auto_approve: Mutex::new(auto_approve),
        }
    }

    #[expect(clippy::expect_used)]
    pub fn set_auto_approve(&self, value: bool) {
        *self.auto_approve.lock().expect("cli sink mutex poisoned") = value;
    }
}

// `--chat` mode's interactive prompt is the one library-side exception to
// the crate's no-stdout-printing lint: it IS the user interface.
#[allow(clippy::print_stdout)]
#[async_trait]
impl EventSink for CliSink {
    async fn assistant_raw(&self, text: &str) {
        println!("{text}");
    }

    async fn reasoning(&self, text: Option<&str>) {
        if let Some(text) = text {
            println!("[reasoning] {text}");
        }
    }

    async fn stream_text(&self, delta: &str) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }

    async fn tool_call(&self, tool: &str, id: &str, args: &Value, _note: Option<&str>) {
        println!("[tool_call {id}] {tool} {args}");
    }

    async fn tool_result(&self, id: &str, result: &Value) {
        println!("[tool_result {id}] {result}");
    }

    async fn final_message(&self, content: &str) {
        println!("{content}");
    }

    #[expect(clippy::expect_used)]
    async fn approval_required(
        &self,
        tool: &str,
        _id: &str,
        reason: &str,
        args: &Value,
        _token: &str,
    ) -> ApprovalDecision {
        if *self.auto_approve.lock().expect("cli sink mutex poisoned") {
            return ApprovalDecision::Approved;
        }
        println!("approval required: {tool} ({reason}) args={args}");
        print!("approve? [y/N/:auto on/:auto off] ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return ApprovalDecision::Denied;
        }
        match line.trim() {
            "y" | "Y" | "yes" => ApprovalDecision::Approved,
            ":auto on" => {
                self.set_auto_approve(true);
                ApprovalDecision::Approved
            }
            ":auto off" => {
                self.set_auto_approve(false);
                ApprovalDecision::Denied
            }
            _ => ApprovalDecision::Denied,
        }
    }
}
