use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};

use super::interactive::interactive_args;
use super::output::{spawn_pump, OutputState};
use super::sandbox::SandboxAdapter;
use super::terminal::SpawnOptions;
use super::POLL_INTERVAL;

/// Child process attached to plain pipes, used when no pty is available
pub struct PipeHandler {
    child: Arc<Mutex<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pid: u32,
}

impl PipeHandler {
    pub fn spawn(
        options: &SpawnOptions,
        sandbox: &dyn SandboxAdapter,
        output: Arc<Mutex<OutputState>>,
        alive: Arc<AtomicBool>,
    ) -> Result<Self> {
        let args = interactive_args(&options.command, &options.args);
        let (program, args) = sandbox.wrap(&options.command, &args, &options.cwd);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&options.cwd)
            .env("TERM", "dumb")
            .env("PYTHONUNBUFFERED", "1")
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so signals reach everything the child starts
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", program))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        if let Some(stdout) = child.stdout.take() {
            spawn_pump("stdout", stdout, Arc::clone(&output));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_pump("stderr", stderr, output);
        }

        let child = Arc::new(Mutex::new(child));
        let waiter = Arc::clone(&child);
        thread::spawn(move || {
            loop {
                let status = waiter.lock().unwrap_or_else(|e| e.into_inner()).try_wait();
                match status {
                    Ok(Some(status)) => {
                        log::debug!("Pipe child {} exited: {}", pid, status);
                        break;
                    }
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(e) => {
                        log::debug!("Waiting on pipe child {} failed: {}", pid, e);
                        break;
                    }
                }
            }
            alive.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            child,
            stdin: Mutex::new(stdin),
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn write(&self, data: &[u8]) -> std::io::Result<()> {
        let mut guard = self.stdin.lock().unwrap_or_else(|e| e.into_inner());
        let stdin = guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin is closed")
        })?;
        stdin.write_all(data)?;
        stdin.flush()
    }

    /// Close stdin, which is how end-of-input reaches a piped child
    pub fn close_input(&self) {
        self.stdin.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Hard-kill the immediate child
    pub fn kill(&self) -> std::io::Result<()> {
        self.child.lock().unwrap_or_else(|e| e.into_inner()).kill()
    }
}
