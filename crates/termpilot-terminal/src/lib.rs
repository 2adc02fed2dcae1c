// Interactive session engine
//
// This crate runs long-lived interactive programs (shells, REPLs, database
// clients) behind a pseudo-terminal with VT100 emulation, falling back to
// plain pipes when no pty can be allocated, and decides when a submitted
// command has finished producing output.

mod interactive;
mod output;
mod pipe_handler;
mod pty_handler;
mod screen_buffer;
pub mod keys;
pub mod manager;
pub mod prompt;
pub mod sandbox;
pub mod session;
pub mod signal;
pub mod terminal;

// Re-export public API
pub use keys::ControlKey;
pub use manager::{CreateSessionRequest, ManagerConfig, SessionManager};
pub use prompt::PromptDetector;
pub use sandbox::{SandboxAdapter, SandboxConfig};
pub use session::Session;
pub use signal::Signal;
pub use terminal::{SpawnOptions, Terminal, WaitOutcome};

use std::time::Duration;

// Constants
pub const MAX_CONCURRENT_SESSIONS: usize = 10;
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;
pub const DEFAULT_SCROLLBACK_LINES: usize = 10_000;
/// Upper bound on bytes kept for a single command's output
pub const MAX_PENDING_OUTPUT_BYTES: usize = 4 * 1024 * 1024;
/// How often completion detection re-evaluates
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Quiet period after which output counts as settled
pub const SETTLE_PERIOD: Duration = Duration::from_millis(300);
/// Time allowed for a startup banner before the prompt is inferred
pub const PROMPT_GRACE_PERIOD: Duration = Duration::from_millis(500);
