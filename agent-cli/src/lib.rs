//! Binary entry point: argument parsing, env-var loading (delegated to
//! `agent_core::config`), tracing-subscriber init, and dispatch to
//! task/chat/serve modes.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use agent_core::Session;
use agent_core::config::ConfigOverrides;
use agent_core::providers::Provider;
use agent_core::sink::CliSink;
use agent_protocol::ApprovalPolicy;
use agent_protocol::ReasoningEffort;
use agent_protocol::ReasoningMode;
use agent_protocol::SafeMode;
use clap::Parser;
use clap::ValueEnum;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ProviderArg {
    Ollama,
    Openai,
    Anthropic,
    Openrouter,
    Lmstudio,
}

impl ProviderArg {
    fn as_str(self) -> &'static str {
        match self {
            ProviderArg::Ollama => "ollama",
            ProviderArg::Openai => "openai",
            ProviderArg::Anthropic => "anthropic",
            ProviderArg::Openrouter => "openrouter",
            ProviderArg::Lmstudio => "lmstudio",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ApprovalArg {
    Never,
    OnRequest,
    Always,
}

impl From<ApprovalArg> for ApprovalPolicy {
    fn from(value: ApprovalArg) -> Self {
        match value {
            ApprovalArg::Never => ApprovalPolicy::Never,
            ApprovalArg::OnRequest => ApprovalPolicy::OnRequest,
            ApprovalArg::Always => ApprovalPolicy::Always,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SafeModeArg {
    Safe,
    Extended,
    Unrestricted,
}

impl From<SafeModeArg> for SafeMode {
    fn from(value: SafeModeArg) -> Self {
        match value {
            SafeModeArg::Safe => SafeMode::Safe,
            SafeModeArg::Extended => SafeMode::Extended,
            SafeModeArg::Unrestricted => SafeMode::Unrestricted,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReasoningArg {
    Off,
    On,
    Auto,
}

impl From<ReasoningArg> for ReasoningMode {
    fn from(value: ReasoningArg) -> Self {
        match value {
            ReasoningArg::Off => ReasoningMode::Off,
            ReasoningArg::On => ReasoningMode::On,
            ReasoningArg::Auto => ReasoningMode::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReasoningEffortArg {
    Low,
    Medium,
    High,
}

impl From<ReasoningEffortArg> for ReasoningEffort {
    fn from(value: ReasoningEffortArg) -> Self {
        match value {
            ReasoningEffortArg::Low => ReasoningEffort::Low,
            ReasoningEffortArg::Medium => ReasoningEffort::Medium,
            ReasoningEffortArg::High => ReasoningEffort::High,
        }
    }
}

/// `task` is the positional natural-language task; absent (or empty)
/// outside `--chat`/`--serve` is a usage error.
#[derive(Parser, Debug)]
#[command(name = "agent", about = "Agentic command executor", version)]
pub struct Cli {
    pub task: Option<String>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long, value_enum)]
    pub approval: Option<ApprovalArg>,
    #[arg(long = "safe-mode", value_enum)]
    pub safe_mode: Option<SafeModeArg>,
    #[arg(long = "ollama-url")]
    pub ollama_url: Option<String>,
    #[arg(long = "lmstudio-url")]
    pub lmstudio_url: Option<String>,
    #[arg(long)]
    pub workspace: Option<PathBuf>,
    #[arg(long = "config-dir")]
    pub config_dir: Option<PathBuf>,
    #[arg(long = "max-steps")]
    pub max_steps: Option<u32>,
    #[arg(long = "request-timeout")]
    pub request_timeout: Option<u64>,
    #[arg(long = "tool-timeout")]
    pub tool_timeout: Option<u64>,
    #[arg(long)]
    pub verbose: bool,
    #[arg(long, value_enum)]
    pub reasoning: Option<ReasoningArg>,
    #[arg(long = "reasoning-effort", value_enum)]
    pub reasoning_effort: Option<ReasoningEffortArg>,
    #[arg(long)]
    pub stream: bool,
    #[arg(long = "no-stream")]
    pub no_stream: bool,
    #[arg(long)]
    pub chat: bool,
    #[arg(long)]
    pub serve: bool,
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.map(ProviderArg::as_str).map(str::to_string),
            model: self.model.clone(),
            approval_policy: self.approval.map(Into::into),
            safe_mode: self.safe_mode.map(Into::into),
            ollama_url: self.ollama_url.clone(),
            lmstudio_url: self.lmstudio_url.clone(),
            workspace_root: self.workspace.clone(),
            config_dir: self.config_dir.clone(),
            max_steps: self.max_steps,
            request_timeout: self.request_timeout,
            tool_timeout: self.tool_timeout,
            reasoning_mode: self.reasoning.map(Into::into),
            reasoning_effort: self.reasoning_effort.map(Into::into),
            stream: self.stream_override(),
            serve_port: self.port,
            verbose: if self.verbose { Some(true) } else { None },
            log_dir: None,
        }
    }

    fn stream_override(&self) -> Option<bool> {
        if self.stream {
            Some(true)
        } else if self.no_stream {
            Some(false)
        } else {
            None
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Runs the CLI end to end and returns the process exit code: `0` on
/// success, `2` on a usage/config error.
pub async fn run(cli: Cli) -> i32 {
    let overrides = cli.to_overrides();
    let port = agent_core::config::serve_port(&overrides);
    let verbose = agent_core::config::verbose(&overrides);
    init_tracing(verbose);

    let config = match agent_core::config::load(overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    if let Err(err) = agent_core::config::require_credential(&config.provider, &config) {
        eprintln!("error: {err}");
        return err.exit_code();
    }

    if cli.serve {
        return match agent_server::serve(config, port).await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        };
    }

    let provider = match agent_core::providers::build(&config) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    if cli.chat {
        run_chat_mode(config, provider).await
    } else {
        run_task_mode(config, provider, cli.task).await
    }
}

/// Runs one `chat_once(task)` to completion: the default mode when
/// neither `--chat` nor `--serve` is given.
async fn run_task_mode(config: agent_protocol::Config, provider: Box<dyn Provider>, task: Option<String>) -> i32 {
    let Some(task) = task.filter(|t| !t.trim().is_empty()) else {
        eprintln!("error: no task provided; pass a task, or use --chat/--serve");
        return 2;
    };
    let sink = Arc::new(CliSink::new(false));
    let mut session = Session::new(config, provider, sink);
    session.chat_once(&task).await;
    0
}

/// Interactive REPL. `CLISink`'s `:auto on`/`:auto off` toggle keywords
/// are typed at the approval prompt, not this chat prompt.
async fn run_chat_mode(config: agent_protocol::Config, provider: Box<dyn Provider>) -> i32 {
    let stream = config.stream;
    let sink = Arc::new(CliSink::new(false));
    let mut session = Session::new(config, provider, sink);

    println!("agent chat mode -- type a message, or :quit to exit");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, ":quit" | ":exit") {
            break;
        }
        if stream {
            session.chat_stream(trimmed).await;
        } else {
            session.chat_once(trimmed).await;
        }
    }
    0
}
