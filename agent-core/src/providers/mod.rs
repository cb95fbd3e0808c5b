//! Provider contract and streaming decoder event shapes: a
//! `ResponseEvent`/`ResponseStream` pair modeling the plain delta/final
//! shape every backend (blocking or streaming) reduces to.

pub mod anthropic;
pub mod ollama_native;
pub mod openai_compat;

use std::pin::Pin;
use std::time::Duration;

use agent_protocol::Config;
use agent_protocol::Message;
use agent_protocol::ReasoningEffort;
use agent_protocol::ReasoningMode;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::AgentError;
use crate::error::Result;

/// Consolidated result of a non-streaming `generate` call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: String,
    pub reasoning: Option<String>,
    pub raw: Value,
}

/// One event from `generate_stream`. Exactly one `Final` terminates the
/// stream; any number of `Delta`s (including zero) precede it.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    Delta {
        text: Option<String>,
        reasoning: Option<String>,
    },
    Final {
        content: String,
        reasoning: Option<String>,
        raw: Value,
    },
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<ResponseEvent>> + Send>>;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        reasoning_mode: ReasoningMode,
        reasoning_effort: ReasoningEffort,
    ) -> Result<GenerationResult>;

    async fn generate_stream(
        &self,
        messages: &[Message],
        model: &str,
        request_timeout: Duration,
        reasoning_mode: ReasoningMode,
        reasoning_effort: ReasoningEffort,
    ) -> Result<ResponseStream>;
}

/// Whether reasoning should be requested for this call: explicit
/// `on`/`off` wins; `auto` turns it on for models whose name suggests a
/// reasoning model.
pub(crate) fn wants_reasoning(mode: ReasoningMode, model: &str) -> bool {
    match mode {
        ReasoningMode::On => true,
        ReasoningMode::Off => false,
        ReasoningMode::Auto => {
            let lower = model.to_lowercase();
            ["o3", "o4", "reason"].iter().any(|needle| lower.contains(needle))
        }
    }
}

pub(crate) fn effort_str(effort: ReasoningEffort) -> &'static str {
    match effort {
        ReasoningEffort::Low => "low",
        ReasoningEffort::Medium => "medium",
        ReasoningEffort::High => "high",
    }
}

/// Builds the provider named by `config.provider`. OpenAI, OpenRouter and
/// LM Studio share one OpenAI-compatible Chat Completions implementation
/// pointed at a different `base_url`; only Anthropic's Messages API and
/// Ollama's native NDJSON `/api/chat` need their own wire shape.
pub fn build(config: &Config) -> Result<Box<dyn Provider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(openai_compat::OpenAiCompatProvider::new(
            config.openai_base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string()),
            config.openai_api_key.clone(),
        )?)),
        "openrouter" => Ok(Box::new(openai_compat::OpenAiCompatProvider::new(
            config.openrouter_base_url.clone().unwrap_or_else(|| "https://openrouter.ai/api".to_string()),
            config.openrouter_api_key.clone(),
        )?)),
        "lmstudio" => Ok(Box::new(openai_compat::OpenAiCompatProvider::new(
            config.lmstudio_url.clone().unwrap_or_else(|| "http://localhost:1234".to_string()),
            None,
        )?)),
        "anthropic" => Ok(Box::new(anthropic::AnthropicProvider::new(
            config.anthropic_base_url.clone().unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            config.anthropic_api_key.clone().unwrap_or_default(),
        )?)),
        "ollama" => Ok(Box::new(ollama_native::OllamaProvider::new(
            config.ollama_url.clone().unwrap_or_else(|| "http://localhost:11434".to_string()),
        )?)),
        other => Err(AgentError::Usage(format!("unknown provider {other}"))),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn auto_reasoning_triggers_on_reasoning_model_names() {
        assert!(wants_reasoning(ReasoningMode::Auto, "o3-mini"));
        assert!(wants_reasoning(ReasoningMode::Auto, "deepseek-reasoner"));
        assert!(!wants_reasoning(ReasoningMode::Auto, "gpt-4o"));
    }

    #[test]
    fn explicit_mode_overrides_model_name() {
        assert!(wants_reasoning(ReasoningMode::On, "gpt-4o"));
        assert!(!wants_reasoning(ReasoningMode::Off, "o3-mini"));
    }

    #[test]
    fn build_rejects_unknown_provider() {
        let mut config = test_config();
        config.provider = "made-up".to_string();
        assert!(build(&config).is_err());
    }

    fn test_config() -> Config {
        Config {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            approval_policy: agent_protocol::ApprovalPolicy::OnRequest,
            safe_mode: agent_protocol::SafeMode::Safe,
            workspace_root: std::path::PathBuf::from("/tmp"),
            max_steps: 10,
            request_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            reasoning_mode: ReasoningMode::Auto,
            reasoning_effort: ReasoningEffort::Medium,
            stream: false,
            config_dir: std::path::PathBuf::from("/tmp"),
            mcp_registry_path: std::path::PathBuf::from("/tmp/mcp_registry.json"),
            log_dir: std::path::PathBuf::from("/tmp"),
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
}
