//! The concrete `EventSink` behind the HTTP/SSE adapter.
//! Buffers every event for synchronous REST responses (`/api/chat`,
//! `/api/approve`) and, while a `/api/chat_stream` request is in flight,
//! forwards the same events over a per-request channel.
//!
//! One asymmetry is deliberate (see DESIGN.md): a live SSE subscriber never
//! consults `auto_approve` — it always defers and emits an `approval`
//! event, token included, for the browser to act on. Only the buffered
//! `/api/chat` path short-circuits on `auto_approve`. The `streaming` flag
//! here models that distinction instead of quietly unifying it.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use agent_core::sink::EventSink;
use agent_protocol::ApprovalDecision;
use agent_protocol::SinkEvent;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Scoped to one server instance rather than held as process-global
/// mutable state.
pub struct EngineSink {
    events: Mutex<Vec<SinkEvent>>,
    live: Mutex<Option<UnboundedSender<SinkEvent>>>,
    auto_approve: AtomicBool,
    streaming: AtomicBool,
}

impl EngineSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            live: Mutex::new(None),
            auto_approve: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
        }
    }

    /// Drains and returns every event buffered since the last call.
    #[expect(clippy::expect_used)]
    pub fn take_events(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.events.lock().expect("engine sink mutex poisoned"))
    }

    /// Registers a per-request channel that mirrors every pushed event, and
    /// marks the sink as "in a streaming call" for the duration.
    #[expect(clippy::expect_used)]
    pub fn attach_live(&self, tx: UnboundedSender<SinkEvent>) {
        *self.live.lock().expect("engine sink mutex poisoned") = Some(tx);
        self.streaming.store(true, Ordering::SeqCst);
    }

    #[expect(clippy::expect_used)]
    pub fn detach_live(&self) {
        *self.live.lock().expect("engine sink mutex poisoned") = None;
        self.streaming.store(false, Ordering::SeqCst);
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve.load(Ordering::SeqCst)
    }

    pub fn set_auto_approve(&self, value: bool) {
        self.auto_approve.store(value, Ordering::SeqCst);
    }

    #[expect(clippy::expect_used)]
    fn push(&self, event: SinkEvent) {
        self.events.lock().expect("engine sink mutex poisoned").push(event.clone());
        if let Some(tx) = self.live.lock().expect("engine sink mutex poisoned").as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl Default for EngineSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EngineSink {
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

    async fn approval_required(&self, tool: &str, id: &str, reason: &str, args: &Value, token: &str) -> ApprovalDecision {
        let auto = !self.streaming.load(Ordering::SeqCst) && self.auto_approve();
        self.push(SinkEvent::Approval {
            tool: tool.to_string(),
            id: id.to_string(),
            reason: reason.to_string(),
            args: args.clone(),
            token: token.to_string(),
        });
        if auto {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Deferred
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn non_streaming_auto_approve_short_circuits() {
        let sink = EngineSink::new();
        sink.set_auto_approve(true);
        let decision = sink.approval_required("write_file", "t1", "write", &json!({}), "tok").await;
        assert_eq!(decision, ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn streaming_call_ignores_auto_approve() {
        let sink = EngineSink::new();
        sink.set_auto_approve(true);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        sink.attach_live(tx);
        let decision = sink.approval_required("write_file", "t1", "write", &json!({}), "tok").await;
        assert_eq!(decision, ApprovalDecision::Deferred);
    }

    #[tokio::test]
    async fn take_events_drains_buffer() {
        let sink = EngineSink::new();
        sink.assistant_raw("hi").await;
        let events = sink.take_events();
        assert_eq!(events.len(), 1);
        assert!(sink.take_events().is_empty());
    }
}
