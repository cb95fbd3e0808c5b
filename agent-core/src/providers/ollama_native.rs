//! Ollama's native `/api/chat` wire shape: newline-delimited JSON objects
//! rather than SSE.

use std::time::Duration;

use agent_protocol::Message;
use agent_protocol::ReasoningEffort;
use agent_protocol::ReasoningMode;
use agent_protocol::Role;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::error::Result;
use crate::providers::GenerationResult;
use crate::providers::Provider;
use crate::providers::ResponseEvent;
use crate::providers::ResponseStream;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn payload(&self, messages: &[Message], model: &str, stream: bool) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": Self::role_str(m.role), "content": m.content}))
            .collect();
        json!({"model": model, "messages": messages, "stream": stream})
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        _reasoning_mode: ReasoningMode,
        _reasoning_effort: ReasoningEffort,
    ) -> Result<GenerationResult> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = self.payload(messages, model, false);
        let response = self.client.post(url).timeout(request_timeout).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {body}")));
        }
        let payload: Value = response.json().await?;
        let content = payload
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Ok(GenerationResult { content, reasoning: None, raw: payload })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        _reasoning_mode: ReasoningMode,
        _reasoning_effort: ReasoningEffort,
    ) -> Result<ResponseStream> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = self.payload(messages, model, true);
        let response = self.client.post(url).timeout(request_timeout).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {body}")));
        }

        let (tx, rx) = mpsc::channel::<Result<ResponseEvent>>(16);
        let byte_stream = response.bytes_stream().map(|r| r.map_err(std::io::Error::other));
        let reader = tokio_util::io::StreamReader::new(byte_stream);
        tokio::spawn(process_ndjson(reader, tx));
        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

async fn process_ndjson<R>(reader: R, tx: mpsc::Sender<Result<ResponseEvent>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = tokio::io::BufReader::new(reader).lines();
    let mut content_acc = String::new();
    let mut raw_last = Value::Null;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(AgentError::Io(e))).await;
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        raw_last = event.clone();
        if let Some(text) = event.get("message").and_then(|m| m.get("content")).and_then(Value::as_str) {
            if !text.is_empty() {
                content_acc.push_str(text);
                if tx.send(Ok(ResponseEvent::Delta { text: Some(text.to_string()), reasoning: None })).await.is_err() {
                    return;
                }
            }
        }
        if event.get("done").and_then(Value::as_bool) == Some(true) {
            break;
        }
    }

    let _ = tx
        .send(Ok(ResponseEvent::Final { content: content_acc, reasoning: None, raw: raw_last }))
        .await;
}
