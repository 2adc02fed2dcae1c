use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use termpilot_policy::CommandPolicy;
use termpilot_terminal::{ManagerConfig, SandboxConfig};

use crate::pipeline::PipelineConfig;

/// CLI arguments for termpilot. Every option can also come from the
/// environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "termpilot")]
#[command(about = "Interactive terminal sessions for automated clients, with command safety checks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Maximum number of concurrent sessions
    #[arg(long, env = "TERMPILOT_MAX_SESSIONS", default_value_t = 10)]
    pub max_sessions: usize,

    /// Character budget for output returned by a single call
    #[arg(long, env = "TERMPILOT_MAX_OUTPUT", default_value_t = 50_000)]
    pub max_output: usize,

    /// Default completion timeout for send_command, in milliseconds
    #[arg(long, env = "TERMPILOT_DEFAULT_TIMEOUT_MS", default_value_t = 30_000)]
    pub default_timeout_ms: u64,

    /// Comma-separated executable names; if set, only these may run
    #[arg(long, env = "TERMPILOT_ALLOWED_COMMANDS", value_delimiter = ',')]
    pub allowed_commands: Vec<String>,

    /// Comma-separated executable names that may never run
    #[arg(long, env = "TERMPILOT_BLOCKED_COMMANDS", value_delimiter = ',')]
    pub blocked_commands: Vec<String>,

    /// Comma-separated root directories sessions are confined to
    #[arg(long, env = "TERMPILOT_ALLOWED_PATHS", value_delimiter = ',')]
    pub allowed_paths: Vec<PathBuf>,

    /// Redact credentials from returned output
    #[arg(long, env = "TERMPILOT_REDACT_SECRETS", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub redact_secrets: bool,

    /// Close sessions idle for this many seconds (0 disables)
    #[arg(long, env = "TERMPILOT_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    pub idle_timeout_secs: u64,

    /// Refuse dangerous inputs until confirmed
    #[arg(long, env = "TERMPILOT_DANGER_DETECTION", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub danger_detection: bool,

    /// Append audit records to this JSON-lines file
    #[arg(long, env = "TERMPILOT_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Run pipe-mode sessions under an OS sandbox when available
    #[arg(long, env = "TERMPILOT_SANDBOX", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub sandbox: bool,

    /// Comma-separated extra paths sandboxed sessions may write to
    #[arg(long, env = "TERMPILOT_SANDBOX_ALLOW_WRITE", value_delimiter = ',')]
    pub sandbox_allow_write: Vec<PathBuf>,

    /// Let sandboxed sessions use the network
    #[arg(long, env = "TERMPILOT_SANDBOX_ALLOW_NETWORK", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub sandbox_allow_network: bool,

    /// Never allocate a pty; always use pipes
    #[arg(long, env = "TERMPILOT_FORCE_PIPE", default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub force_pipe: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve tool calls as JSON lines on stdin/stdout (default)
    Serve,
    /// Print the tool definitions as JSON
    Tools,
}

fn non_empty<T, F>(values: &[T], keep: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    values.iter().filter(|v| keep(v)).cloned().collect()
}

impl Cli {
    pub fn policy(&self) -> CommandPolicy {
        CommandPolicy {
            allowed_commands: non_empty(&self.allowed_commands, |s| !s.trim().is_empty()),
            blocked_commands: non_empty(&self.blocked_commands, |s| !s.trim().is_empty()),
            allowed_paths: non_empty(&self.allowed_paths, |p| !p.as_os_str().is_empty()),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_sessions: self.max_sessions,
            policy: self.policy(),
            idle_timeout: (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs)),
            force_pipe: self.force_pipe,
            sandbox: SandboxConfig {
                enabled: self.sandbox,
                allow_write: non_empty(&self.sandbox_allow_write, |p| !p.as_os_str().is_empty()),
                allow_network: self.sandbox_allow_network,
            },
            ..ManagerConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_output_chars: self.max_output,
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            redact_secrets: self.redact_secrets,
            danger_detection: self.danger_detection,
            ..PipelineConfig::default()
        }
    }
}
