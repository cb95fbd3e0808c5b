//! The deliberation engine: drives one LLM turn at a time through
//! extraction, tool dispatch and the approval arbiter until a `final`
//! response is produced, a step budget is exhausted, or the caller
//! cancels.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use agent_protocol::Config;
use agent_protocol::LlmResponse;
use agent_protocol::Message;
use agent_protocol::PendingApproval;
use serde_json::Value;
use serde_json::json;

use crate::approval;
use crate::audit;
use crate::extractor;
use crate::providers::GenerationResult;
use crate::providers::Provider;
use crate::providers::ResponseEvent;
use crate::sink::EventSink;
use crate::tools;

/// Maximum length of the `TOOL_RESULT[...]` message appended to history,
/// in characters, before truncation.
const TOOL_RESULT_MAX_CHARS: usize = 5000;

const INVALID_JSON_MESSAGE: &str = "Your previous response was not valid JSON. Respond with a single JSON object of the form {\"type\":\"tool\",\"id\":...,\"tool\":...,\"args\":...} or {\"type\":\"final\",\"content\":...}.";
const UNKNOWN_TYPE_MESSAGE: &str = "Your previous response had an unrecognized \"type\". Respond with a single JSON object of the form {\"type\":\"tool\",\"id\":...,\"tool\":...,\"args\":...} or {\"type\":\"final\",\"content\":...}.";

fn denial_message(tool: &str) -> String {
    format!("Tool {tool} was denied by user. Provide alternative or ask clarification.")
}

fn tool_result_message(tool_id: &str, result: &Value) -> String {
    let body = serde_json::to_string(result).unwrap_or_else(|_| "null".to_string());
    if body.chars().count() <= TOOL_RESULT_MAX_CHARS {
        format!("TOOL_RESULT[{tool_id}]: {body}")
    } else {
        let truncated: String = body.chars().take(TOOL_RESULT_MAX_CHARS).collect();
        format!("TOOL_RESULT[{tool_id}]: {truncated}...<truncated>")
    }
}

/// What one streamed generation produced: either a completed generation or
/// the fact that cancellation was observed mid-stream.
enum StreamedTurn {
    Done(GenerationResult),
    Cancelled,
}

/// A single conversation: append-only message history, at most one pending
/// approval, and a cooperative cancellation flag.
pub struct Session {
    config: Config,
    provider: Box<dyn Provider>,
    sink: Arc<dyn EventSink>,
    messages: Vec<Message>,
    pending: Option<PendingApproval>,
    cancelled: Arc<AtomicBool>,
}

impl Session {
    pub fn new(config: Config, provider: Box<dyn Provider>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_cancel_flag(config, provider, sink, Arc::new(AtomicBool::new(false)))
    }

    /// As `new`, but shares a caller-supplied cancellation flag instead of
    /// minting a fresh one. Exists so tests (and anything else that needs
    /// the flag before the `Session` exists) can observe or drive it.
    fn with_cancel_flag(config: Config, provider: Box<dyn Provider>, sink: Arc<dyn EventSink>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            config,
            provider,
            sink,
            messages: Vec::new(),
            pending: None,
            cancelled,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_pending_approval(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        self.pending.as_ref()
    }

    /// Whether this session was configured to prefer `generate_stream` over
    /// `generate` — lets an HTTP adapter decide which one its own SSE
    /// endpoint should drive without duplicating the config field.
    pub fn config_stream(&self) -> bool {
        self.config.stream
    }

    /// Requests cooperative cancellation. Checked before the next provider
    /// call, after every streamed event, and at the top of every step —
    /// never mid-tool-execution.
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// A clonable handle another task can use to cancel a run already in
    /// flight — `request_cancel` alone only helps a caller that holds `&self`
    /// on the same task, which a concurrent streaming consumer usually does
    /// not.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn tool_ctx(&self) -> tools::ToolContext<'_> {
        tools::ToolContext {
            workspace_root: &self.config.workspace_root,
            config_dir: &self.config.config_dir,
            tool_timeout: self.config.tool_timeout,
            mcp_registry_path: &self.config.mcp_registry_path,
        }
    }

    /// Runs the deliberation loop with `Provider::generate` (no streaming).
    /// Returns the final message content, or `""` if cancelled, deferred
    /// pending an approval, or the step budget was exhausted without ever
    /// reaching a `final` response.
    pub async fn chat_once(&mut self, input: &str) -> String {
        self.cancelled.store(false, Ordering::SeqCst);
        self.run(input, false).await
    }

    /// Runs the deliberation loop with `Provider::generate_stream`, emitting
    /// `stream_text`/`stream_reasoning` deltas to the sink as they arrive.
    pub async fn chat_stream(&mut self, input: &str) -> String {
        self.cancelled.store(false, Ordering::SeqCst);
        self.run(input, true).await
    }

    /// Resolves a previously deferred approval. On a token
    /// mismatch or no pending approval, returns `{"error": ...}` and leaves
    /// any existing pending approval untouched. On a valid deny, clears the
    /// pending approval, appends the denial message to history, and returns
    /// `{"approved": false}` — this is a normal outcome, not an error. On a
    /// valid approve, dispatches the tool, audits and records the result,
    /// appends the `TOOL_RESULT[...]` message, and returns
    /// `{"approved": true, "result": ...}`.
    pub async fn resolve_approval(&mut self, token: &str, approve: bool) -> Value {
        let pending = match approval::resolve(&mut self.pending, token) {
            Ok(pending) => pending,
            Err(err) => return json!({"error": err.to_string()}),
        };

        if !approve {
            self.messages.push(Message::user(denial_message(&pending.tool)));
            return json!({"approved": false});
        }

        let ctx = self.tool_ctx();
        let result = tools::dispatch(&pending.tool, &pending.args, &ctx).await;
        audit::log_tool(&self.config.log_dir, &pending.tool, &pending.args, &result);
        self.sink.tool_result(&pending.tool_id, &result).await;
        self.messages.push(Message::user(tool_result_message(&pending.tool_id, &result)));
        json!({"approved": true, "result": result})
    }

    async fn run(&mut self, input: &str, stream: bool) -> String {
        if self.pending.is_some() {
            return String::new();
        }
        if !input.is_empty() {
            self.messages.push(Message::user(input));
        }

        for _step in 0..self.config.max_steps {
            if self.is_cancelled() {
                return String::new();
            }

            let generation = if stream {
                match self.run_streamed().await {
                    Ok(StreamedTurn::Done(generation)) => generation,
                    Ok(StreamedTurn::Cancelled) => return String::new(),
                    Err(err) => GenerationResult {
                        content: json!({"type": "final", "content": format!("provider error: {err}")}).to_string(),
                        reasoning: None,
                        raw: json!({"error": err.to_string()}),
                    },
                }
            } else {
                match self
                    .provider
                    .generate(
                        &self.messages,
                        &self.config.model,
                        self.config.request_timeout,
                        self.config.reasoning_mode,
                        self.config.reasoning_effort,
                    )
                    .await
                {
                    Ok(generation) => generation,
                    Err(err) => GenerationResult {
                        content: json!({"type": "final", "content": format!("provider error: {err}")}).to_string(),
                        reasoning: None,
                        raw: json!({"error": err.to_string()}),
                    },
                }
            };

            if self.is_cancelled() {
                return String::new();
            }

            audit::log_llm(&self.config.log_dir, "recv", &generation.content, generation.reasoning.as_deref(), Some(&generation.raw));
            self.sink.raw(&generation.raw).await;
            self.sink.reasoning(generation.reasoning.as_deref()).await;
            self.sink.assistant_raw(&generation.content).await;
            self.messages.push(Message::assistant(generation.content.clone()));

            let Some(parsed) = extractor::extract_json_object(&generation.content) else {
                self.messages.push(Message::user(INVALID_JSON_MESSAGE));
                continue;
            };
            let Ok(response) = serde_json::from_value::<LlmResponse>(parsed) else {
                self.messages.push(Message::user(UNKNOWN_TYPE_MESSAGE));
                continue;
            };

            match response {
                LlmResponse::Final { content } => {
                    self.sink.final_message(&content).await;
                    return content;
                }
                LlmResponse::Tool { id, tool, args, note } => {
                    self.sink.tool_call(&tool, &id, &args, note.as_deref()).await;
                    match approval::check(self.config.approval_policy, &tool, &id, &args, self.sink.as_ref()).await {
                        approval::Outcome::Denied(_) => {
                            self.messages.push(Message::user(denial_message(&tool)));
                            continue;
                        }
                        approval::Outcome::Deferred(pending) => {
                            self.pending = Some(pending);
                            return String::new();
                        }
                        approval::Outcome::Proceed => {
                            let ctx = self.tool_ctx();
                            let result = tools::dispatch(&tool, &args, &ctx).await;
                            audit::log_tool(&self.config.log_dir, &tool, &args, &result);
                            self.sink.tool_result(&id, &result).await;
                            self.messages.push(Message::user(tool_result_message(&id, &result)));
                        }
                    }
                }
            }
        }

        String::new()
    }

    /// Drives one streamed generation, forwarding deltas to the sink as they
    /// arrive and checking `is_cancelled` between events. If cancellation
    /// lands mid-stream, the provider stream is dropped immediately and no
    /// further sink events fire for this turn.
    async fn run_streamed(&mut self) -> crate::error::Result<StreamedTurn> {
        use futures::StreamExt;

        let mut stream = self
            .provider
            .generate_stream(
                &self.messages,
                &self.config.model,
                self.config.request_timeout,
                self.config.reasoning_mode,
                self.config.reasoning_effort,
            )
            .await?;

        loop {
            if self.is_cancelled() {
                return Ok(StreamedTurn::Cancelled);
            }
            match stream.next().await {
                None => {
                    return Ok(StreamedTurn::Done(GenerationResult { content: String::new(), reasoning: None, raw: Value::Null }));
                }
                Some(Err(err)) => return Err(err),
                Some(Ok(ResponseEvent::Delta { text, reasoning })) => {
                    if self.is_cancelled() {
                        return Ok(StreamedTurn::Cancelled);
                    }
                    if let Some(text) = &text {
                        self.sink.stream_text(text).await;
                    }
                    if let Some(reasoning) = &reasoning {
                        self.sink.stream_reasoning(reasoning).await;
                    }
                }
                Some(Ok(ResponseEvent::Final { content, reasoning, raw })) => {
                    if self.is_cancelled() {
                        return Ok(StreamedTurn::Cancelled);
                    }
                    return Ok(StreamedTurn::Done(GenerationResult { content, reasoning, raw }));
                }
            }
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use agent_protocol::ApprovalPolicy;
    use agent_protocol::ReasoningEffort;
    use agent_protocol::ReasoningMode;
    use agent_protocol::SafeMode;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::providers::ResponseStream;
    use crate::sink::NullSink;

    /// A scripted provider: returns one `GenerationResult` per call, in
    /// order, from a fixed list. Panics if exhausted — tests size the
    /// script to exactly the number of turns expected. Optionally flips a
    /// shared cancellation flag as a side effect of `generate`/
    /// `generate_stream`, to simulate cancellation landing mid-call.
    struct ScriptedProvider {
        replies: Mutex<Vec<String>>,
        cancel_on_next_call: Option<Arc<AtomicBool>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                cancel_on_next_call: None,
            }
        }

        fn new_cancelling(replies: &[&str], handle: Arc<AtomicBool>) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                cancel_on_next_call: Some(handle),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(
            &self,
            _messages: &[Message],
            _model: &str,
            _request_timeout: Duration,
            _reasoning_mode: ReasoningMode,
            _reasoning_effort: ReasoningEffort,
        ) -> crate::error::Result<GenerationResult> {
            if let Some(handle) = &self.cancel_on_next_call {
                handle.store(true, Ordering::SeqCst);
            }
            let content = self.replies.lock().expect("scripted provider mutex poisoned").pop().expect("script exhausted");
            Ok(GenerationResult { content, reasoning: None, raw: Value::Null })
        }

        async fn generate_stream(
            &self,
            messages: &[Message],
            model: &str,
            request_timeout: Duration,
            reasoning_mode: ReasoningMode,
            reasoning_effort: ReasoningEffort,
        ) -> crate::error::Result<ResponseStream> {
            let generation = self.generate(messages, model, request_timeout, reasoning_mode, reasoning_effort).await?;
            let events = vec![Ok(ResponseEvent::Final { content: generation.content, reasoning: generation.reasoning, raw: generation.raw })];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct FixedApprovalSink(agent_protocol::ApprovalDecision);

    #[async_trait]
    impl EventSink for FixedApprovalSink {
        async fn approval_required(
            &self,
            _tool: &str,
            _id: &str,
            _reason: &str,
            _args: &Value,
            _token: &str,
        ) -> agent_protocol::ApprovalDecision {
            self.0
        }
    }

    fn test_config(workspace: &std::path::Path) -> Config {
        Config {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            approval_policy: ApprovalPolicy::OnRequest,
            safe_mode: SafeMode::Safe,
            workspace_root: workspace.to_path_buf(),
            max_steps: 6,
            request_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(10),
            reasoning_mode: ReasoningMode::Off,
            reasoning_effort: ReasoningEffort::Medium,
            stream: false,
            config_dir: workspace.to_path_buf(),
            mcp_registry_path: workspace.join("mcp_registry.json"),
            log_dir: workspace.join("logs"),
            ollama_url: None,
            lmstudio_url: None,
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            openrouter_api_key: None,
            openrouter_base_url: None,
        }
    }

    fn session_with(workspace: &TempDir, replies: &[&str], sink: Arc<dyn EventSink>) -> Session {
        Session::new(test_config(workspace.path()), Box::new(ScriptedProvider::new(replies)), sink)
    }

    #[tokio::test]
    async fn final_only_returns_content_in_one_step() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, &[r#"{"type":"final","content":"hello"}"#], Arc::new(NullSink));
        let result = session.chat_once("hi").await;
        assert_eq!(result, "hello");
        assert_eq!(session.messages().len(), 2); // user input, assistant raw
    }

    #[tokio::test]
    async fn read_then_finalize_dispatches_tool_and_continues() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "contents").unwrap();
        let replies = [
            r#"{"type":"tool","id":"t1","tool":"read_file","args":{"path":"a.txt"}}"#,
            r#"{"type":"final","content":"the file says contents"}"#,
        ];
        let mut session = session_with(&dir, &replies, Arc::new(NullSink));
        let result = session.chat_once("read a.txt").await;
        assert_eq!(result, "the file says contents");
        let has_tool_result = session.messages().iter().any(|m| m.content.starts_with("TOOL_RESULT[t1]:"));
        assert!(has_tool_result);
    }

    #[tokio::test]
    async fn denied_tool_call_appends_denial_message_and_continues() {
        let dir = TempDir::new().unwrap();
        let replies = [
            r#"{"type":"tool","id":"t1","tool":"write_file","args":{"path":"a.txt","content":"x"}}"#,
            r#"{"type":"final","content":"ok, skipped the write"}"#,
        ];
        let sink: Arc<dyn EventSink> = Arc::new(FixedApprovalSink(agent_protocol::ApprovalDecision::Denied));
        let mut session = session_with(&dir, &replies, sink);
        let result = session.chat_once("write a.txt").await;
        assert_eq!(result, "ok, skipped the write");
        assert!(!dir.path().join("a.txt").exists());
        let has_denial = session
            .messages()
            .iter()
            .any(|m| m.content == "Tool write_file was denied by user. Provide alternative or ask clarification.");
        assert!(has_denial);
    }

    #[tokio::test]
    async fn deferred_approval_stops_run_and_resolve_approval_completes_it() {
        let dir = TempDir::new().unwrap();
        let replies = [r#"{"type":"tool","id":"t1","tool":"write_file","args":{"path":"a.txt","content":"x"}}"#];
        let sink: Arc<dyn EventSink> = Arc::new(FixedApprovalSink(agent_protocol::ApprovalDecision::Deferred));
        let mut session = session_with(&dir, &replies, sink);
        let result = session.chat_once("write a.txt").await;
        assert_eq!(result, "");
        assert!(session.has_pending_approval());

        let token = session.pending_approval().unwrap().token.clone();
        let outcome = session.resolve_approval(&token, true).await;
        assert_eq!(outcome["approved"], true);
        assert!(!session.has_pending_approval());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn resolve_approval_rejects_unknown_token() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, &[], Arc::new(NullSink));
        let outcome = session.resolve_approval("no-such-token", true).await;
        assert!(outcome["error"].is_string());
    }

    #[tokio::test]
    async fn cancellation_before_first_step_returns_empty() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, &[], Arc::new(NullSink));
        session.request_cancel();
        let result = session.chat_once("hello").await;
        assert_eq!(result, "");
    }

    #[tokio::test]
    async fn cancellation_mid_stream_returns_empty_and_emits_nothing_further() {
        let dir = TempDir::new().unwrap();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        // The provider flips the same flag the session checks, simulating a
        // concurrent `request_cancel()` landing while the call is in flight.
        let provider = ScriptedProvider::new_cancelling(&[r#"{"type":"final","content":"unused"}"#], Arc::clone(&cancel_flag));
        let mut session = Session::with_cancel_flag(test_config(dir.path()), Box::new(provider), Arc::new(NullSink), cancel_flag);
        let result = session.chat_stream("hello").await;
        assert_eq!(result, "");
        assert!(!session.messages().iter().any(|m| m.content.contains("unused")));
    }

    #[tokio::test]
    async fn workspace_escape_is_reified_as_tool_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let replies = [
            r#"{"type":"tool","id":"t1","tool":"read_file","args":{"path":"../../etc/passwd"}}"#,
            r#"{"type":"final","content":"could not read that path"}"#,
        ];
        let mut session = session_with(&dir, &replies, Arc::new(NullSink));
        let result = session.chat_once("read outside the workspace").await;
        assert_eq!(result, "could not read that path");
        let tool_result_msg = session.messages().iter().find(|m| m.content.starts_with("TOOL_RESULT[t1]:")).unwrap();
        assert!(tool_result_msg.content.contains("error"));
    }

    #[tokio::test]
    async fn exhausting_max_steps_without_a_final_returns_empty() {
        let dir = TempDir::new().unwrap();
        let replies: Vec<&str> = (0..6).map(|_| r#"{"type":"tool","id":"t1","tool":"read_file","args":{"path":"missing.txt"}}"#).collect();
        let mut session = session_with(&dir, &replies, Arc::new(NullSink));
        let result = session.chat_once("loop forever").await;
        assert_eq!(result, "");
    }

    #[tokio::test]
    async fn chat_stream_drives_deltas_and_returns_final_content() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&dir, &[r#"{"type":"final","content":"streamed"}"#], Arc::new(NullSink));
        let result = session.chat_stream("hi").await;
        assert_eq!(result, "streamed");
    }
}
