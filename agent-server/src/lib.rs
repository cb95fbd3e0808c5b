//! The SSE HTTP adapter: bridges the deliberation engine to a browser over
//! `GET /api/chat_stream` (SSE) plus a synchronous REST surface
//! (`/api/chat`, `/api/approve`, `/api/auto_approve`), built on `axum`.

mod sink;

pub use sink::EngineSink;

use std::convert::Infallible;
use std::sync::Arc;

use agent_core::Session;
use agent_core::providers;
use agent_protocol::Config;
use agent_protocol::PendingApproval;
use agent_protocol::SinkEvent;
use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Sse;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::KeepAlive;
use axum::routing::get;
use axum::routing::post;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// Everything a request handler needs: the one engine session this server
/// instance owns (concurrent requests against a single session must be
/// serialized — the `tokio::sync::Mutex` is that serialization point)
/// and the sink that both buffers and streams its
/// events.
#[derive(Clone)]
pub struct ServerState {
    session: Arc<Mutex<Session>>,
    sink: Arc<EngineSink>,
}

/// Builds the router with every route wired. Split out from
/// `serve` so integration tests can mount it on an in-process listener
/// without binding a real port.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat_stream", get(chat_stream))
        .route("/api/chat", post(chat))
        .route("/api/approve", post(approve))
        .route("/api/auto_approve", get(get_auto_approve).post(post_auto_approve))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Builds a fresh `ServerState` around one engine session for `config`.
pub fn build_state(config: Config) -> anyhow::Result<ServerState> {
    let provider = providers::build(&config)?;
    let sink = Arc::new(EngineSink::new());
    let session = Session::new(config, provider, sink.clone());
    Ok(ServerState {
        session: Arc::new(Mutex::new(session)),
        sink,
    })
}

/// Binds `0.0.0.0:<port>` and serves until the process is killed.
pub async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "agent-server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

const INDEX_HTML: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Agentic Web</title></head>
<body>
<p>Agentic web UI lives here. POST /api/chat, GET /api/chat_stream?q=..., POST /api/approve.</p>
</body></html>"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Deserialize)]
struct ChatStreamQuery {
    #[serde(default)]
    q: Option<String>,
}

/// `GET /api/chat_stream?q=<text>`: the SSE event stream. Only one
/// deliberation runs per session at a time, so a single live channel
/// is sufficient — a concurrent second SSE request would simply overwrite
/// the live subscriber and observe nothing until it re-subscribes.
async fn chat_stream(State(state): State<ServerState>, Query(params): Query<ChatStreamQuery>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<SinkEvent>();
    state.sink.attach_live(tx);

    let session = Arc::clone(&state.session);
    let sink = Arc::clone(&state.sink);
    let input = params.q.unwrap_or_default();
    tokio::spawn(async move {
        let mut session = session.lock().await;
        if engine_wants_streaming(&session) {
            let _ = session.chat_stream(&input).await;
        } else {
            let _ = session.chat_once(&input).await;
        }
        sink.detach_live();
    });

    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    let done = futures::stream::once(async { Ok(SseEvent::default().event("done").data("{}")) });
    Sse::new(events.chain(done)).keep_alive(KeepAlive::new())
}

fn engine_wants_streaming(session: &Session) -> bool {
    session.config_stream()
}

fn to_sse_event(event: &SinkEvent) -> SseEvent {
    let value = serde_json::to_value(event).unwrap_or(Value::Null);
    let (name, data) = match value {
        Value::Object(mut map) => {
            let name = map.remove("event").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "raw".to_string());
            (name, Value::Object(map))
        }
        other => ("raw".to_string(), other),
    };
    SseEvent::default().event(name).data(data.to_string())
}

#[derive(Deserialize)]
struct ChatRequest {
    input: String,
}

#[derive(Serialize)]
struct ChatResponse {
    events: Vec<SinkEvent>,
    pending: Option<PendingApproval>,
}

/// `POST /api/chat`: runs one `chat_once` to completion and returns every
/// event it emitted plus any pending approval.
async fn chat(State(state): State<ServerState>, Json(body): Json<ChatRequest>) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    let _ = session.chat_once(&body.input).await;
    let events = state.sink.take_events();
    let pending = session.pending_approval().cloned();
    Json(ChatResponse { events, pending })
}

#[derive(Deserialize)]
struct ApproveRequest {
    token: String,
    approve: bool,
}

/// `POST /api/approve`: resolves a pending approval and, if approved,
/// re-invokes `chat_once("")` to let the loop continue — this does not
/// append a user message but still spends a step of the budget.
async fn approve(State(state): State<ServerState>, Json(body): Json<ApproveRequest>) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    let result = session.resolve_approval(&body.token, body.approve).await;
    if result.get("approved").and_then(Value::as_bool) == Some(true) {
        let _ = session.chat_once("").await;
    }
    let events = state.sink.take_events();
    let pending = session.pending_approval().cloned();
    Json(json!({"result": result, "events": events, "pending": pending}))
}

#[derive(Serialize, Deserialize)]
struct AutoApprove {
    auto_approve: bool,
}

async fn get_auto_approve(State(state): State<ServerState>) -> Json<AutoApprove> {
    Json(AutoApprove { auto_approve: state.sink.auto_approve() })
}

async fn post_auto_approve(State(state): State<ServerState>, Json(body): Json<AutoApprove>) -> Json<AutoApprove> {
    state.sink.set_auto_approve(body.auto_approve);
    Json(AutoApprove { auto_approve: state.sink.auto_approve() })
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use agent_core::providers::GenerationResult;
    use agent_core::providers::Provider;
    use agent_core::providers::ResponseEvent;
    use agent_core::providers::ResponseStream;
    use agent_protocol::ApprovalPolicy;
    use agent_protocol::Message;
    use agent_protocol::ReasoningEffort;
    use agent_protocol::ReasoningMode;
    use agent_protocol::SafeMode;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        async fn generate(
            &self,
            _messages: &[Message],
            _model: &str,
            _request_timeout: Duration,
            _reasoning_mode: ReasoningMode,
            _reasoning_effort: ReasoningEffort,
        ) -> agent_core::error::Result<GenerationResult> {
            Ok(GenerationResult {
                content: r#"{"type":"final","content":"stub says hi"}"#.to_string(),
                reasoning: None,
                raw: Value::Null,
            })
        }

        async fn generate_stream(
            &self,
            messages: &[Message],
            model: &str,
            request_timeout: Duration,
            reasoning_mode: ReasoningMode,
            reasoning_effort: ReasoningEffort,
        ) -> agent_core::error::Result<ResponseStream> {
            let generation = self.generate(messages, model, request_timeout, reasoning_mode, reasoning_effort).await?;
            let events = vec![Ok(ResponseEvent::Final { content: generation.content, reasoning: None, raw: Value::Null })];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn test_state(workspace: &TempDir) -> ServerState {
        let config = Config {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            approval_policy: ApprovalPolicy::OnRequest,
            safe_mode: SafeMode::Safe,
            workspace_root: workspace.path().to_path_buf(),
            max_steps: 6,
            request_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(10),
            reasoning_mode: ReasoningMode::Off,
            reasoning_effort: ReasoningEffort::Medium,
            stream: false,
            config_dir: workspace.path().to_path_buf(),
            mcp_registry_path: workspace.path().join("mcp_registry.json"),
            log_dir: workspace.path().join("logs"),
            ollama_url: None,
            lmstudio_url: None,
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            openrouter_api_key: None,
            openrouter_base_url: None,
        };
        let sink = Arc::new(EngineSink::new());
        let session = Session::new(config, Box::new(StubProvider), sink.clone());
        ServerState {
            session: Arc::new(Mutex::new(session)),
            sink,
        }
    }

    #[tokio::test]
    async fn chat_returns_final_event_and_no_pending() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(&dir));
        let request = axum::http::Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json!({"input": "hello"})).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["pending"].is_null());
        let events = parsed["events"].as_array().unwrap();
        assert!(events.iter().any(|e| e["event"] == "final" && e["content"] == "stub says hi"));
    }

    #[tokio::test]
    async fn auto_approve_round_trips_through_get_and_post() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(&dir));
        let get_request = axum::http::Request::get("/api/auto_approve").body(axum::body::Body::empty()).unwrap();
        let response = app.clone().oneshot(get_request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: AutoApprove = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.auto_approve);

        let post_request = axum::http::Request::post("/api/auto_approve")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json!({"auto_approve": true})).unwrap()))
            .unwrap();
        let response = app.oneshot(post_request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: AutoApprove = serde_json::from_slice(&body).unwrap();
        assert!(parsed.auto_approve);
    }

    #[tokio::test]
    async fn approve_rejects_unknown_token() {
        let dir = TempDir::new().unwrap();
        let app = router(test_state(&dir));
        let request = axum::http::Request::post("/api/approve")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json!({"token": "nope", "approve": true})).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["result"]["error"].is_string());
    }
}
