use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    Never,
    OnRequest,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeMode {
    Safe,
    Extended,
    Unrestricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    Off,
    On,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Immutable once a `Session` is constructed.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: String,
    pub model: String,
    pub approval_policy: ApprovalPolicy,
    pub safe_mode: SafeMode,
    pub workspace_root: PathBuf,
    pub max_steps: u32,
    pub request_timeout: Duration,
    pub tool_timeout: Duration,
    pub reasoning_mode: ReasoningMode,
    pub reasoning_effort: ReasoningEffort,
    pub stream: bool,
    pub config_dir: PathBuf,
    pub mcp_registry_path: PathBuf,
    pub log_dir: PathBuf,
    pub ollama_url: Option<String>,
    pub lmstudio_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: Option<String>,
}
