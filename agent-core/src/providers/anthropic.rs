//! Anthropic Messages API provider: system messages are hoisted
//! into a separate `system` field, content blocks carry a `type` tag
//! (`text` / `thinking`), and `thinking` blocks are folded into the
//! `reasoning` output rather than `content`.

use std::time::Duration;

use agent_protocol::Message;
use agent_protocol::ReasoningEffort;
use agent_protocol::ReasoningMode;
use agent_protocol::Role;
use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use futures::TryStreamExt;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::AgentError;
use crate::error::Result;
use crate::providers::GenerationResult;
use crate::providers::Provider;
use crate::providers::ResponseEvent;
use crate::providers::ResponseStream;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Hoists leading `system` messages into Anthropic's dedicated `system`
    /// field, joining multiple ones with a newline.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system: Option<String> = None;
        let mut converted = Vec::new();
        for m in messages {
            match m.role {
                Role::System => {
                    system = Some(match system.take() {
                        Some(existing) => format!("{existing}\n{}", m.content),
                        None => m.content.clone(),
                    });
                }
                Role::User => converted.push(json!({"role": "user", "content": m.content})),
                Role::Assistant => converted.push(json!({"role": "assistant", "content": m.content})),
            }
        }
        (system, converted)
    }

    fn build_payload(&self, messages: &[Message], model: &str, stream: bool) -> Value {
        let (system, converted) = Self::convert_messages(messages);
        let mut body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": converted,
            "stream": stream,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        body
    }

    fn request(&self, payload: &Value, request_timeout: Duration) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url);
        self.client
            .post(url)
            .timeout(request_timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        _reasoning_mode: ReasoningMode,
        _reasoning_effort: ReasoningEffort,
    ) -> Result<GenerationResult> {
        let payload = self.build_payload(messages, model, false);
        let response = self.request(&payload, request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {body}")));
        }
        let payload: Value = response.json().await?;
        let mut content = String::new();
        let mut reasoning_parts = Vec::new();
        for block in payload.get("content").and_then(Value::as_array).into_iter().flatten() {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => content.push_str(block.get("text").and_then(Value::as_str).unwrap_or("")),
                Some("thinking") | Some("reasoning") => {
                    reasoning_parts.push(block.get("text").and_then(Value::as_str).unwrap_or("").to_string());
                }
                _ => {}
            }
        }
        let reasoning = if reasoning_parts.is_empty() { None } else { Some(reasoning_parts.join("\n")) };
        Ok(GenerationResult { content, reasoning, raw: payload })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        _reasoning_mode: ReasoningMode,
        _reasoning_effort: ReasoningEffort,
    ) -> Result<ResponseStream> {
        let payload = self.build_payload(messages, model, true);
        let response = self.request(&payload, request_timeout).header(reqwest::header::ACCEPT, "text/event-stream").send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {body}")));
        }

        let (tx, rx) = mpsc::channel::<Result<ResponseEvent>>(16);
        let byte_stream = response.bytes_stream().map_err(AgentError::Reqwest);
        tokio::spawn(process_sse(byte_stream, tx));
        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

async fn process_sse<S>(stream: S, tx: mpsc::Sender<Result<ResponseEvent>>)
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut stream = stream.eventsource();
    let mut content_acc = String::new();
    let mut reasoning_acc = String::new();
    let mut raw_last = Value::Null;

    loop {
        let next = match timeout(STREAM_IDLE_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(e))) => {
                let _ = tx.send(Err(AgentError::Provider(e.to_string()))).await;
                return;
            }
            Ok(None) => break,
            Err(_) => {
                let _ = tx.send(Err(AgentError::Provider("idle timeout waiting for SSE chunk".to_string()))).await;
                return;
            }
        };

        let Ok(chunk) = serde_json::from_str::<Value>(&next.data) else {
            continue;
        };
        raw_last = chunk.clone();

        match next.event.as_str() {
            "content_block_delta" => {
                let Some(delta) = chunk.get("delta") else { continue };
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta.get("text").and_then(Value::as_str).unwrap_or("").to_string();
                        content_acc.push_str(&text);
                        if tx.send(Ok(ResponseEvent::Delta { text: Some(text), reasoning: None })).await.is_err() {
                            return;
                        }
                    }
                    Some("thinking_delta") => {
                        let text = delta.get("thinking").and_then(Value::as_str).unwrap_or("").to_string();
                        reasoning_acc.push_str(&text);
                        if tx.send(Ok(ResponseEvent::Delta { text: None, reasoning: Some(text) })).await.is_err() {
                            return;
                        }
                    }
                    _ => {}
                }
            }
            "message_stop" => break,
            _ => {}
        }
    }

    let reasoning = if reasoning_acc.is_empty() { None } else { Some(reasoning_acc) };
    let _ = tx
        .send(Ok(ResponseEvent::Final { content: content_acc, reasoning, raw: raw_last }))
        .await;
}
