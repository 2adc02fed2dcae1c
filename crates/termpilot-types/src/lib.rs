// Shared types for the termpilot workspace: the caller-facing error taxonomy
// and the data shapes returned by the session engine.

mod error;

pub use error::{EngineError, EngineResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of characters a dangerous-command justification must have
pub const MIN_JUSTIFICATION_LEN: usize = 10;

/// Execution substrate backing a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalMode {
    /// Real pseudo-terminal with vt100 emulation
    Pty,
    /// Plain stdin/stdout/stderr pipes, no emulation
    Pipe,
}

impl std::fmt::Display for TerminalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalMode::Pty => write!(f, "pty"),
            TerminalMode::Pipe => write!(f, "pipe"),
        }
    }
}

/// Caller-visible summary of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
    pub mode: TerminalMode,
    pub alive: bool,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Result of a freshly created session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub name: String,
    pub pid: Option<u32>,
    pub mode: TerminalMode,
}

/// Output of a command submitted to a session, after sanitizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub output: String,
    pub complete: bool,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Snapshot of a session's screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenOutput {
    pub output: String,
    pub alive: bool,
}
