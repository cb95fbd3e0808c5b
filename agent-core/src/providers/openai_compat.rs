//! OpenAI-compatible Chat Completions provider: used directly for OpenAI
//! and, pointed at a different `base_url`, for OpenRouter and LM Studio.
//! Decodes SSE with `eventsource-stream`, feeding an `mpsc` channel guarded
//! by an idle timeout.

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
use crate::providers::effort_str;
use crate::providers::wants_reasoning;

const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn build_payload(
        &self,
        messages: &[Message],
        model: &str,
        reasoning_mode: ReasoningMode,
        reasoning_effort: ReasoningEffort,
        stream: bool,
    ) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": Self::role_str(m.role), "content": m.content}))
            .collect();
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0,
            "stream": stream,
        });
        if wants_reasoning(reasoning_mode, model) {
            body["reasoning"] = json!({"effort": effort_str(reasoning_effort)});
        }
        body
    }

    fn request(&self, payload: &Value, request_timeout: Duration) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.client.post(url).timeout(request_timeout).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Extracts reasoning text from a chat-completions message/choice
    /// object: `message.reasoning` or `message.reasoning_content`, falling
    /// back to `choice.reasoning_content`.
    fn extract_reasoning(message: &Value, choice: &Value) -> Option<String> {
        let rc = message
            .get("reasoning")
            .or_else(|| message.get("reasoning_content"))
            .or_else(|| choice.get("reasoning_content"))?;
        match rc {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => {
                let joined: String = items
                    .iter()
                    .filter_map(|v| v.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");
                if joined.is_empty() { None } else { Some(joined) }
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        reasoning_mode: ReasoningMode,
        reasoning_effort: ReasoningEffort,
    ) -> Result<GenerationResult> {
        let payload = self.build_payload(messages, model, reasoning_mode, reasoning_effort, false);
        let response = self.request(&payload, request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {body}")));
        }
        let payload: Value = response.json().await?;
        let choice = payload.get("choices").and_then(|c| c.get(0)).cloned().unwrap_or(Value::Null);
        let message = choice.get("message").cloned().unwrap_or(Value::Null);
        let content = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();
        let reasoning = Self::extract_reasoning(&message, &choice);
        Ok(GenerationResult { content, reasoning, raw: payload })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        reasoning_mode: ReasoningMode,
        reasoning_effort: ReasoningEffort,
    ) -> Result<ResponseStream> {
        let payload = self.build_payload(messages, model, reasoning_mode, reasoning_effort, true);
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

        if next.data.trim() == "[DONE]" {
            break;
        }
        let Ok(chunk) = serde_json::from_str::<Value>(&next.data) else {
            continue;
        };
        raw_last = chunk.clone();
        let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
            continue;
        };
        let delta = choice.get("delta").cloned().unwrap_or(Value::Null);

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            content_acc.push_str(text);
            if tx.send(Ok(ResponseEvent::Delta { text: Some(text.to_string()), reasoning: None })).await.is_err() {
                return;
            }
        }

        let reasoning_delta = match delta.get("reasoning") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => choice.get("reasoning_content").and_then(|rc| match rc {
                Value::Array(items) => {
                    let joined: String = items.iter().filter_map(|v| v.get("text").and_then(Value::as_str)).collect();
                    if joined.is_empty() { None } else { Some(joined) }
                }
                _ => None,
            }),
        };
        if let Some(reasoning) = reasoning_delta {
            reasoning_acc.push_str(&reasoning);
            if tx.send(Ok(ResponseEvent::Delta { text: None, reasoning: Some(reasoning) })).await.is_err() {
                return;
            }
        }

        if choice.get("finish_reason").and_then(Value::as_str).is_some() {
            break;
        }
    }

    let reasoning = if reasoning_acc.is_empty() { None } else { Some(reasoning_acc) };
    let _ = tx
        .send(Ok(ResponseEvent::Final { content: content_acc, reasoning, raw: raw_last }))
        .await;
}
