//! Config loading: explicit CLI args override environment variables, which
//! override built-in defaults. Follows the usual CLI-then-env-then-default
//! precedence and path-resolution rules; `toml`/`toml_edit` remain available
//! on the dependency graph should an on-disk config file be introduced
//! later; only CLI+env are required today, so no parser is wired yet.

use std::path::PathBuf;
use std::time::Duration;

use agent_protocol::ApprovalPolicy;
use agent_protocol::Config;
use agent_protocol::ReasoningEffort;
use agent_protocol::ReasoningMode;
use agent_protocol::SafeMode;

use crate::error::AgentError;
use crate::error::Result;

/// Mirrors `--flag`/`AGENT_*` environment variable pairs. Every field is
/// optional; `None` falls through to the environment, then to the default
/// baked into `load`.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub approval_policy: Option<ApprovalPolicy>,
    pub safe_mode: Option<SafeMode>,
    pub ollama_url: Option<String>,
    pub lmstudio_url: Option<String>,
    pub workspace_root: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub max_steps: Option<u32>,
    pub request_timeout: Option<u64>,
    pub tool_timeout: Option<u64>,
    pub reasoning_mode: Option<ReasoningMode>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub stream: Option<bool>,
    pub serve_port: Option<u16>,
    pub verbose: Option<bool>,
    pub log_dir: Option<PathBuf>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn parse_approval(s: &str) -> Option<ApprovalPolicy> {
    match s {
        "never" => Some(ApprovalPolicy::Never),
        "on-request" => Some(ApprovalPolicy::OnRequest),
        "always" => Some(ApprovalPolicy::Always),
        _ => None,
    }
}

fn parse_safe_mode(s: &str) -> Option<SafeMode> {
    match s {
        "safe" => Some(SafeMode::Safe),
        "extended" => Some(SafeMode::Extended),
        "unrestricted" => Some(SafeMode::Unrestricted),
        _ => None,
    }
}

fn parse_reasoning_mode(s: &str) -> Option<ReasoningMode> {
    match s {
        "off" => Some(ReasoningMode::Off),
        "on" => Some(ReasoningMode::On),
        "auto" => Some(ReasoningMode::Auto),
        _ => None,
    }
}

fn parse_reasoning_effort(s: &str) -> Option<ReasoningEffort> {
    match s {
        "low" => Some(ReasoningEffort::Low),
        "medium" => Some(ReasoningEffort::Medium),
        "high" => Some(ReasoningEffort::High),
        _ => None,
    }
}

/// Builds an immutable `Config`, applying explicit-arg > env-var > default
/// precedence field by field.
pub fn load(overrides: ConfigOverrides) -> Result<Config> {
    let provider = overrides
        .provider
        .or_else(|| env_string("AGENT_PROVIDER"))
        .unwrap_or_else(|| "openai".to_string());

    let model = overrides
        .model
        .or_else(|| env_string("AGENT_MODEL"))
        .unwrap_or_else(|| "gpt-4o-mini".to_string());

    let approval_policy = overrides
        .approval_policy
        .or_else(|| env_string("AGENT_APPROVAL").and_then(|v| parse_approval(&v)))
        .unwrap_or(ApprovalPolicy::OnRequest);

    let safe_mode = overrides
        .safe_mode
        .or_else(|| env_string("AGENT_SAFE_MODE").and_then(|v| parse_safe_mode(&v)))
        .unwrap_or(SafeMode::Safe);

    let workspace_root = overrides
        .workspace_root
        .or_else(|| env_string("AGENT_WORKSPACE").map(PathBuf::from))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    if !workspace_root.exists() {
        return Err(AgentError::Usage(format!(
            "workspace root does not exist: {}",
            workspace_root.display()
        )));
    }

    let config_dir = overrides
        .config_dir
        .or_else(|| env_string("AGENT_CONFIG_DIR").map(PathBuf::from))
        .unwrap_or_else(default_config_dir);

    let max_steps = overrides
        .max_steps
        .or_else(|| env_u32("AGENT_MAX_STEPS"))
        .unwrap_or(10);
    if max_steps < 1 {
        return Err(AgentError::Usage("max-steps must be >= 1".to_string()));
    }

    let request_timeout = Duration::from_secs(
        overrides
            .request_timeout
            .or_else(|| env_u64("AGENT_REQUEST_TIMEOUT"))
            .unwrap_or(120),
    );
    let tool_timeout = Duration::from_secs(
        overrides
            .tool_timeout
            .or_else(|| env_u64("AGENT_TOOL_TIMEOUT"))
            .unwrap_or(60),
    );

    let reasoning_mode = overrides
        .reasoning_mode
        .or_else(|| env_string("AGENT_REASONING").and_then(|v| parse_reasoning_mode(&v)))
        .unwrap_or(ReasoningMode::Auto);

    let reasoning_effort = overrides
        .reasoning_effort
        .or_else(|| env_string("AGENT_REASONING_EFFORT").and_then(|v| parse_reasoning_effort(&v)))
        .unwrap_or(ReasoningEffort::Medium);

    let stream = overrides
        .stream
        .or_else(|| env_bool("AGENT_STREAM"))
        .unwrap_or(true);

    let log_dir = overrides
        .log_dir
        .or_else(|| env_string("AGENT_LOG_DIR").map(PathBuf::from))
        .unwrap_or_else(|| config_dir.join("logs"));

    let mcp_registry_path = config_dir.join("mcp_registry.json");

    std::fs::create_dir_all(&config_dir)?;
    std::fs::create_dir_all(&log_dir)?;
    std::fs::create_dir_all(config_dir.join("plans"))?;

    Ok(Config {
        provider,
        model,
        approval_policy,
        safe_mode,
        workspace_root,
        max_steps,
        request_timeout,
        tool_timeout,
        reasoning_mode,
        reasoning_effort,
        stream,
        config_dir,
        mcp_registry_path,
        log_dir,
        ollama_url: overrides.ollama_url.or_else(|| env_string("AGENT_OLLAMA_URL")),
        lmstudio_url: overrides
            .lmstudio_url
            .or_else(|| env_string("AGENT_LMSTUDIO_URL")),
        openai_api_key: env_string("OPENAI_API_KEY"),
        openai_base_url: env_string("OPENAI_BASE_URL"),
        anthropic_api_key: env_string("ANTHROPIC_API_KEY"),
        anthropic_base_url: env_string("ANTHROPIC_BASE_URL"),
        openrouter_api_key: env_string("OPENROUTER_API_KEY"),
        openrouter_base_url: env_string("OPENROUTER_BASE_URL"),
    })
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentic")
}

pub fn serve_port(overrides: &ConfigOverrides) -> u16 {
    overrides
        .serve_port
        .or_else(|| env_u64("AGENT_SERVE_PORT").map(|v| v as u16))
        .unwrap_or(8787)
}

pub fn verbose(overrides: &ConfigOverrides) -> bool {
    overrides.verbose.or_else(|| env_bool("AGENT_VERBOSE")).unwrap_or(false)
}

/// Credential existence check used by `build_provider` in the CLI: exits 2
/// before the engine ever starts if a selected provider lacks a key.
pub fn require_credential(provider: &str, config: &Config) -> Result<()> {
    let missing = match provider {
        "openai" | "openrouter" | "lmstudio" => match provider {
            "openai" => config.openai_api_key.is_none(),
            "openrouter" => config.openrouter_api_key.is_none(),
            _ => false,
        },
        "anthropic" => config.anthropic_api_key.is_none(),
        "ollama" => false,
        _ => return Err(AgentError::Usage(format!("unknown provider: {provider}"))),
    };
    if missing {
        return Err(AgentError::Usage(format!(
            "missing API key for provider '{provider}'"
        )));
    }
    Ok(())
}
