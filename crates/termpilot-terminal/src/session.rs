use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use termpilot_types::{EngineError, EngineResult, SessionInfo};

use super::keys::ControlKey;
use super::signal::Signal;
use super::terminal::Terminal;

/// One managed interactive process and the bookkeeping around it
pub struct Session {
    id: String,
    name: String,
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    created_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    alive: AtomicBool,
    terminal: Terminal,
    /// Dangerous inputs confirmed for exactly one execution each
    confirmed: Mutex<HashSet<String>>,
}

impl Session {
    pub fn new(
        id: String,
        name: String,
        command: String,
        args: Vec<String>,
        working_dir: PathBuf,
        terminal: Terminal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            command,
            args,
            working_dir,
            created_at: now,
            last_activity: Mutex::new(now),
            alive: AtomicBool::new(true),
            terminal,
            confirmed: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Cached liveness; call `sync_liveness` for a fresh value
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Refresh the cached liveness from the terminal
    pub fn sync_liveness(&self) -> bool {
        let alive = self.terminal.is_alive();
        self.alive.store(alive, Ordering::SeqCst);
        alive
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            pid: self.terminal.pid(),
            mode: self.terminal.mode(),
            alive: self.sync_liveness(),
            working_dir: self.working_dir.display().to_string(),
            created_at: self.created_at,
            last_activity: self.last_activity(),
        }
    }

    /// Check liveness before a write
    pub fn ensure_alive(&self) -> EngineResult<()> {
        if self.sync_liveness() {
            Ok(())
        } else {
            Err(EngineError::SessionNotAlive(self.id.clone()))
        }
    }

    /// Submit one line of input
    pub fn write_line(&self, input: &str) -> EngineResult<()> {
        self.ensure_alive()?;
        self.terminal.write_line(input).map_err(|e| self.write_error(e))?;
        self.touch();
        Ok(())
    }

    fn write_error(&self, e: std::io::Error) -> EngineError {
        if self.sync_liveness() {
            EngineError::Io(e)
        } else {
            EngineError::SessionNotAlive(self.id.clone())
        }
    }

    /// Send a control key to the terminal
    pub fn send_control(&self, key: &ControlKey) -> EngineResult<()> {
        self.ensure_alive()?;
        self.terminal.send_control(key).map_err(|e| self.write_error(e))?;
        self.touch();
        Ok(())
    }

    /// Pre-confirm a dangerous input for one execution
    pub fn add_confirmation(&self, input: &str) {
        self.confirmed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(input.to_string());
    }

    /// Consume a pending confirmation. True if one was present.
    pub fn take_confirmation(&self, input: &str) -> bool {
        self.confirmed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(input)
    }

    /// Terminate the process and release the terminal
    pub fn close(&self, signal: Signal) {
        self.terminal.kill(signal);
        self.terminal.dispose();
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sandbox::NoopSandbox;
    use crate::terminal::SpawnOptions;

    fn session() -> Session {
        let options = SpawnOptions::new("/bin/sh", std::env::temp_dir()).force_pipe(true);
        let terminal = Terminal::spawn(&options, &NoopSandbox).unwrap();
        Session::new(
            "abc12345".into(),
            "test".into(),
            "/bin/sh".into(),
            Vec::new(),
            std::env::temp_dir(),
            terminal,
        )
    }

    #[test]
    fn test_confirmation_consumed_once() {
        let session = session();
        session.add_confirmation("rm -rf /tmp/x");
        assert!(session.take_confirmation("rm -rf /tmp/x"));
        assert!(!session.take_confirmation("rm -rf /tmp/x"));
        assert!(!session.take_confirmation("rm -rf /tmp/y"));
    }

    #[test]
    fn test_write_after_close_fails() {
        let session = session();
        session.close(Signal::Terminate);
        assert!(!session.sync_liveness());
        match session.write_line("echo hi") {
            Err(EngineError::SessionNotAlive(id)) => assert_eq!(id, "abc12345"),
            other => panic!("expected SessionNotAlive, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_info_reflects_session() {
        let session = session();
        let info = session.info();
        assert_eq!(info.id, "abc12345");
        assert_eq!(info.mode, termpilot_types::TerminalMode::Pipe);
        assert!(info.alive);
        assert!(info.pid.is_some());
        assert!(info.last_activity >= info.created_at);
    }
}
