use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};

use super::output::{spawn_pump, OutputState};
use super::terminal::SpawnOptions;

/// Child process attached to a pseudo-terminal.
///
/// Output is pumped into the shared `OutputState` by a reader thread and
/// liveness is flipped by a waiter thread when the child exits.
pub struct PtyHandler {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
}

impl PtyHandler {
    /// Open a pty and spawn `options.command` on its slave side
    pub fn spawn(
        options: &SpawnOptions,
        output: Arc<Mutex<OutputState>>,
        alive: Arc<AtomicBool>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&options.command);
        cmd.args(&options.args);
        cmd.cwd(&options.cwd);
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn '{}' in PTY", options.command))?;
        // The master only sees EOF once every slave handle is closed
        drop(pair.slave);

        let master = pair.master;
        let reader = master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let writer = master.take_writer().context("Failed to take PTY writer")?;

        let pid = child.process_id();
        let killer = child.clone_killer();

        spawn_pump("pty", reader, output);

        let command = options.command.clone();
        thread::spawn(move || {
            match child.wait() {
                Ok(status) => log::debug!("'{}' exited with code {}", command, status.exit_code()),
                Err(e) => log::debug!("Waiting on '{}' failed: {}", command, e),
            }
            alive.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            master: Mutex::new(master),
            writer: Mutex::new(Some(writer)),
            killer: Mutex::new(killer),
            pid,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write raw bytes to the pty
    pub fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let writer = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "PTY writer is closed")
        })?;
        writer.write_all(data)?;
        writer.flush()
    }

    /// Resize the pty
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self.master.lock().unwrap_or_else(|e| e.into_inner());
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")?;
        Ok(())
    }

    /// Hard-kill the child through the pty library
    pub fn kill(&self) -> std::io::Result<()> {
        let mut killer = self.killer.lock().unwrap_or_else(|e| e.into_inner());
        killer.kill()
    }

    /// Drop the writer so nothing more reaches the child
    pub fn close_input(&self) {
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
