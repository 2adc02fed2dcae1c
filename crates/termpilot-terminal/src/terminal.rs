/// Mode-independent handle on one interactive child process
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use termpilot_policy::sanitize::strip_control_sequences;
use termpilot_types::{EngineError, EngineResult, TerminalMode};

use super::keys::ControlKey;
use super::output::OutputState;
use super::pipe_handler::PipeHandler;
use super::prompt::PromptDetector;
use super::pty_handler::PtyHandler;
use super::sandbox::SandboxAdapter;
use super::screen_buffer::{render_bytes, ScreenBuffer};
use super::signal::{signal_process_tree, Signal};
use super::{DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_SCROLLBACK_LINES, POLL_INTERVAL, SETTLE_PERIOD};

/// What to run and how
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Overlay on top of the inherited environment
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
    /// Skip the pty attempt and use pipes directly
    pub force_pipe: bool,
    pub scrollback_lines: usize,
}

impl SpawnOptions {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            force_pipe: false,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn force_pipe(mut self, force_pipe: bool) -> Self {
        self.force_pipe = force_pipe;
        self
    }
}

/// Why `wait_for_output` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// The command is considered finished
    pub complete: bool,
    /// The deadline passed first
    pub timed_out: bool,
    /// The process exited
    pub exited: bool,
}

impl WaitOutcome {
    fn finished() -> Self {
        Self { complete: true, timed_out: false, exited: false }
    }
}

enum Backend {
    Pty(PtyHandler),
    Pipe(PipeHandler),
}

/// One child process behind either a pseudo-terminal or plain pipes.
///
/// The completion wait, reads and liveness tracking work the same way in
/// both modes; only writing, resizing and signal delivery differ.
pub struct Terminal {
    backend: Backend,
    output: Arc<Mutex<OutputState>>,
    /// Cleared by process exit or by `kill`
    alive: Arc<AtomicBool>,
    /// Cleared only by process exit
    running: Arc<AtomicBool>,
    killed: AtomicBool,
    disposed: AtomicBool,
    prompt: OnceLock<Option<Regex>>,
    detector: PromptDetector,
    size: Mutex<(u16, u16)>,
    scrollback_lines: usize,
}

/// The emulator cannot hold a zero-sized grid
fn check_geometry(cols: u16, rows: u16) -> EngineResult<()> {
    if cols == 0 || rows == 0 {
        return Err(EngineError::InvalidGeometry { cols, rows });
    }
    Ok(())
}

impl Terminal {
    /// Spawn the child, trying a pty first and falling back to pipes
    pub fn spawn(options: &SpawnOptions, sandbox: &dyn SandboxAdapter) -> EngineResult<Self> {
        check_geometry(options.cols, options.rows)?;
        let running = Arc::new(AtomicBool::new(true));

        if !options.force_pipe {
            let screen = ScreenBuffer::new(options.cols, options.rows, options.scrollback_lines);
            let output = Arc::new(Mutex::new(OutputState::new(Some(screen), options.scrollback_lines)));
            match PtyHandler::spawn(options, Arc::clone(&output), Arc::clone(&running)) {
                Ok(handler) => {
                    log::debug!("Spawned '{}' on a pty (pid {:?})", options.command, handler.pid());
                    return Ok(Self::assemble(Backend::Pty(handler), output, running, options));
                }
                Err(e) => {
                    log::warn!("PTY unavailable for '{}' ({:#}); falling back to pipes", options.command, e);
                }
            }
        }

        let output = Arc::new(Mutex::new(OutputState::new(None, options.scrollback_lines)));
        running.store(true, Ordering::SeqCst);
        let handler = PipeHandler::spawn(options, sandbox, Arc::clone(&output), Arc::clone(&running))
            .map_err(|e| EngineError::Spawn {
                command: options.command.clone(),
                cause: format!("{:#}", e),
            })?;
        log::debug!("Spawned '{}' on pipes (pid {})", options.command, handler.pid());
        Ok(Self::assemble(Backend::Pipe(handler), output, running, options))
    }

    fn assemble(
        backend: Backend,
        output: Arc<Mutex<OutputState>>,
        running: Arc<AtomicBool>,
        options: &SpawnOptions,
    ) -> Self {
        Self {
            backend,
            output,
            alive: Arc::new(AtomicBool::new(true)),
            running,
            killed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            prompt: OnceLock::new(),
            detector: PromptDetector::new(),
            size: Mutex::new((options.cols, options.rows)),
            scrollback_lines: options.scrollback_lines,
        }
    }

    fn output(&self) -> MutexGuard<'_, OutputState> {
        self.output.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> TerminalMode {
        match self.backend {
            Backend::Pty(_) => TerminalMode::Pty,
            Backend::Pipe(_) => TerminalMode::Pipe,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.backend {
            Backend::Pty(handler) => handler.pid(),
            Backend::Pipe(handler) => Some(handler.pid()),
        }
    }

    /// Liveness; once false it never becomes true again
    pub fn is_alive(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            self.alive.store(false, Ordering::SeqCst);
        }
        self.alive.load(Ordering::SeqCst)
    }

    /// Current (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        *self.size.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send raw text. The since-last-write buffer is cleared first, so the
    /// next read only covers output produced after this write.
    pub fn write(&self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Send a line of input with the terminator the mode expects
    pub fn write_line(&self, text: &str) -> io::Result<()> {
        let terminator = match self.backend {
            Backend::Pty(_) => "\r",
            Backend::Pipe(_) => "\n",
        };
        self.write(&format!("{}{}", text, terminator))
    }

    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        if !self.is_alive() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "terminal is not alive"));
        }
        self.output().since_write.clear();
        match &self.backend {
            Backend::Pty(handler) => handler.write(data),
            Backend::Pipe(handler) => handler.write(data),
        }
    }

    /// Snapshot of what the child has printed. Never blocks on the child.
    ///
    /// In pty mode this is the rendered viewport, or scrollback plus
    /// viewport when `full` is set. In pipe mode it is the output since the
    /// last write, or the whole captured history, with control sequences
    /// stripped.
    pub fn read_screen(&self, full: bool) -> String {
        let mut state = self.output();
        if let Some(screen) = state.screen.as_mut() {
            return if full { screen.full_text() } else { screen.visible_text() };
        }
        if full {
            strip_control_sequences(&state.history.text())
        } else {
            strip_control_sequences(&String::from_utf8_lossy(&state.since_write))
        }
    }

    /// Only the output produced since the last write, rendered.
    ///
    /// In pty mode the pending bytes are replayed through a scratch
    /// emulator, so earlier screen contents never leak into the result.
    pub fn read_new_output(&self) -> String {
        let state = self.output();
        match self.backend {
            Backend::Pty(_) => {
                let (cols, rows) = self.size();
                render_bytes(&state.since_write, cols, rows, self.scrollback_lines)
            }
            Backend::Pipe(_) => strip_control_sequences(&String::from_utf8_lossy(&state.since_write)),
        }
    }

    /// Text the prompt detector looks at
    fn prompt_screen(&self) -> String {
        let state = self.output();
        if let Some(screen) = state.screen.as_ref() {
            return screen.visible_text();
        }
        if state.since_write.is_empty() {
            strip_control_sequences(&state.history.text())
        } else {
            strip_control_sequences(&String::from_utf8_lossy(&state.since_write))
        }
    }

    /// Infer the prompt from what is on screen now. Only the first call
    /// decides; later calls return the same pattern.
    pub fn infer_prompt(&self) -> Option<&Regex> {
        self.prompt
            .get_or_init(|| {
                let pattern = self.detector.infer(&self.prompt_screen());
                match &pattern {
                    Some(p) => log::debug!("Prompt pattern: {}", p.as_str()),
                    None => log::debug!("No prompt recognized"),
                }
                pattern
            })
            .as_ref()
    }

    pub fn prompt_pattern(&self) -> Option<&Regex> {
        self.prompt.get().and_then(Option::as_ref)
    }

    /// Wait until the latest command looks finished or `timeout` passes.
    ///
    /// Checks, in order: process exit, deadline, then (once output has
    /// been quiet for the settle period) a prompt match, or a single extra
    /// quiet period when no prompt matches.
    pub async fn wait_for_output(&self, timeout: Duration) -> WaitOutcome {
        let start = Instant::now();
        let mut grace_deadline: Option<Instant> = None;

        loop {
            if !self.is_alive() {
                // Let the readers drain what the child printed on its way out
                tokio::time::sleep(POLL_INTERVAL).await;
                return WaitOutcome { complete: true, timed_out: false, exited: true };
            }

            if start.elapsed() >= timeout {
                return WaitOutcome { complete: false, timed_out: true, exited: false };
            }

            let settled = {
                let state = self.output();
                !state.since_write.is_empty()
                    && state
                        .last_output_at
                        .is_some_and(|at| at.elapsed() >= SETTLE_PERIOD)
            };

            if settled {
                if let Some(pattern) = self.prompt_pattern() {
                    if self.detector.matches(pattern, &self.prompt_screen()) {
                        return WaitOutcome::finished();
                    }
                }
                match grace_deadline {
                    None => grace_deadline = Some(Instant::now() + SETTLE_PERIOD),
                    Some(deadline) if Instant::now() >= deadline => return WaitOutcome::finished(),
                    Some(_) => {}
                }
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            tokio::time::sleep(POLL_INTERVAL.min(remaining.max(Duration::from_millis(1)))).await;
        }
    }

    /// Change the geometry. Pipe mode has none, so this is a no-op there.
    pub fn resize(&self, cols: u16, rows: u16) -> EngineResult<()> {
        check_geometry(cols, rows)?;
        let Backend::Pty(handler) = &self.backend else {
            return Ok(());
        };
        handler
            .resize(cols, rows)
            .map_err(|e| EngineError::Io(io::Error::other(format!("{:#}", e))))?;
        if let Some(screen) = self.output().screen.as_mut() {
            if screen.size() != (cols, rows) {
                screen.resize(cols, rows);
            }
        }
        *self.size.lock().unwrap_or_else(|e| e.into_inner()) = (cols, rows);
        Ok(())
    }

    /// Send a control key.
    ///
    /// A pty gets the key's bytes and its line discipline does the rest.
    /// Pipes have no line discipline: interrupt, quit and suspend become
    /// signals to the whole process tree and ctrl+d closes stdin.
    pub fn send_control(&self, key: &ControlKey) -> io::Result<()> {
        match &self.backend {
            Backend::Pty(_) => self.write_bytes(key.bytes()),
            Backend::Pipe(handler) => {
                if !self.is_alive() {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "terminal is not alive"));
                }
                if let Some(signal) = key.signal() {
                    self.output().since_write.clear();
                    signal_process_tree(handler.pid(), signal)
                } else if key.is_eof() {
                    self.output().since_write.clear();
                    handler.close_input();
                    Ok(())
                } else {
                    self.write_bytes(key.bytes())
                }
            }
        }
    }

    /// Deliver `signal` once and mark the terminal dead. Repeated calls do
    /// nothing.
    pub fn kill(&self, signal: Signal) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.running.load(Ordering::SeqCst) {
            let delivered = match self.pid() {
                Some(pid) => signal_process_tree(pid, signal),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no pid")),
            };
            if let Err(e) = delivered {
                log::debug!("{} delivery failed ({}); killing child directly", signal, e);
                self.hard_kill();
            }
        }

        self.alive.store(false, Ordering::SeqCst);
    }

    fn hard_kill(&self) {
        let result = match &self.backend {
            Backend::Pty(handler) => handler.kill(),
            Backend::Pipe(handler) => handler.kill(),
        };
        if let Err(e) = result {
            log::debug!("Hard kill failed: {}", e);
        }
    }

    /// Terminate the process tree if it is still running and release the
    /// emulator. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.kill(Signal::Kill);
        if self.running.load(Ordering::SeqCst) {
            if let Some(pid) = self.pid() {
                let _ = signal_process_tree(pid, Signal::Kill);
            }
            self.hard_kill();
        }

        match &self.backend {
            Backend::Pty(handler) => handler.close_input(),
            Backend::Pipe(handler) => handler.close_input(),
        }
        let mut state = self.output();
        log::debug!(
            "Terminal disposed after {} bytes ({} history lines)",
            state.total_bytes,
            state.history.line_count()
        );
        state.screen = None;
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sandbox::NoopSandbox;

    fn shell(force_pipe: bool) -> Terminal {
        let options = SpawnOptions::new("/bin/sh", std::env::temp_dir())
            .env("PS1", "tp$ ")
            .force_pipe(force_pipe);
        Terminal::spawn(&options, &NoopSandbox).unwrap()
    }

    #[tokio::test]
    async fn test_pipe_mode_round_trip() {
        let terminal = shell(true);
        assert_eq!(terminal.mode(), TerminalMode::Pipe);
        assert!(terminal.is_alive());

        terminal.write_line("echo pipe-marker-1").unwrap();
        let outcome = terminal.wait_for_output(Duration::from_secs(5)).await;
        assert!(outcome.complete);
        assert!(terminal.read_new_output().contains("pipe-marker-1"));

        terminal.write_line("echo pipe-marker-2").unwrap();
        terminal.wait_for_output(Duration::from_secs(5)).await;
        let latest = terminal.read_new_output();
        assert!(latest.contains("pipe-marker-2"));
        assert!(!latest.contains("pipe-marker-1"));

        let history = terminal.read_screen(true);
        let first = history.find("pipe-marker-1").unwrap();
        let second = history.find("pipe-marker-2").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_exit_completes_wait() {
        let terminal = shell(true);
        terminal.write_line("exit").unwrap();
        let outcome = terminal.wait_for_output(Duration::from_secs(5)).await;
        assert!(outcome.complete);
        assert!(outcome.exited);
        assert!(!terminal.is_alive());
        assert!(terminal.write_line("echo late").is_err());
    }

    #[tokio::test]
    async fn test_timeout_reports_incomplete() {
        let terminal = shell(true);
        terminal.write_line("sleep 5").unwrap();
        let outcome = terminal.wait_for_output(Duration::from_millis(200)).await;
        assert!(!outcome.complete);
        assert!(outcome.timed_out);
        terminal.dispose();
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let terminal = shell(true);
        terminal.kill(Signal::Terminate);
        terminal.kill(Signal::Terminate);
        assert!(!terminal.is_alive());
        terminal.dispose();
        terminal.dispose();
    }

    #[test]
    fn test_pipe_resize_is_noop() {
        let terminal = shell(true);
        terminal.resize(80, 24).unwrap();
        assert_eq!(terminal.size(), (DEFAULT_COLS, DEFAULT_ROWS));
    }

    #[tokio::test]
    async fn test_pty_resize_reaches_child() {
        let terminal = shell(false);
        if terminal.mode() != TerminalMode::Pty {
            // No pty available in this environment
            return;
        }
        terminal.resize(100, 30).unwrap();
        assert_eq!(terminal.size(), (100, 30));

        terminal.write_line("stty size").unwrap();
        terminal.wait_for_output(Duration::from_secs(5)).await;
        assert!(terminal.read_new_output().contains("30 100"));
    }

    #[test]
    fn test_zero_geometry_is_rejected() {
        let options = SpawnOptions {
            cols: 0,
            ..SpawnOptions::new("/bin/sh", std::env::temp_dir())
        };
        assert!(matches!(
            Terminal::spawn(&options, &NoopSandbox),
            Err(EngineError::InvalidGeometry { cols: 0, .. })
        ));

        let terminal = shell(false);
        assert!(matches!(
            terminal.resize(80, 0),
            Err(EngineError::InvalidGeometry { rows: 0, .. })
        ));
        assert!(terminal.is_alive());
    }
}
