use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::json;
use termpilot_logging::{AuditEvent, AuditLog};
use termpilot_policy::{command_basename, normalize_path, CommandPolicy};
use termpilot_types::{CreatedSession, EngineError, EngineResult, SessionInfo};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::sandbox::{self, SandboxAdapter, SandboxConfig};
use super::session::Session;
use super::signal::Signal;
use super::terminal::{SpawnOptions, Terminal};
use super::{DEFAULT_COLS, DEFAULT_ROWS, DEFAULT_SCROLLBACK_LINES, MAX_CONCURRENT_SESSIONS, PROMPT_GRACE_PERIOD};

/// Session manager settings
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_sessions: usize,
    pub policy: CommandPolicy,
    /// Close sessions after this long without a write; `None` disables
    pub idle_timeout: Option<Duration>,
    pub default_cols: u16,
    pub default_rows: u16,
    /// Never attempt a pty
    pub force_pipe: bool,
    pub sandbox: SandboxConfig,
    /// Startup time allowed before the prompt is inferred
    pub prompt_grace: Duration,
    pub scrollback_lines: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: MAX_CONCURRENT_SESSIONS,
            policy: CommandPolicy::allow_all(),
            idle_timeout: Some(Duration::from_secs(30 * 60)),
            default_cols: DEFAULT_COLS,
            default_rows: DEFAULT_ROWS,
            force_pipe: false,
            sandbox: SandboxConfig::default(),
            prompt_grace: PROMPT_GRACE_PERIOD,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
        }
    }
}

/// Arguments for `create_session`
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub command: String,
    pub args: Vec<String>,
    pub name: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

impl CreateSessionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

struct IdleTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    config: ManagerConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Creations that passed the capacity check but are not registered yet
    creating: AtomicUsize,
    idle_timers: Mutex<HashMap<String, IdleTimer>>,
    timer_generation: AtomicU64,
    sandbox: Arc<dyn SandboxAdapter>,
    audit: Arc<AuditLog>,
}

/// Releases a reserved creation slot
struct SlotGuard<'a>(&'a AtomicUsize);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The single authority over which sessions exist.
///
/// Capacity and command/path policy are enforced before anything is
/// spawned. Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_sessions", &self.inner.config.max_sessions)
            .field("sandbox", &self.inner.sandbox.name())
            .finish()
    }
}

impl SessionManager {
    pub fn new(config: ManagerConfig, audit: Arc<AuditLog>) -> Self {
        let sandbox = sandbox::initialize(&config.sandbox);
        Self::with_sandbox(config, audit, sandbox)
    }

    pub fn with_sandbox(config: ManagerConfig, audit: Arc<AuditLog>, sandbox: Arc<dyn SandboxAdapter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: RwLock::new(HashMap::new()),
                creating: AtomicUsize::new(0),
                idle_timers: Mutex::new(HashMap::new()),
                timer_generation: AtomicU64::new(0),
                sandbox,
                audit,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.inner.config.policy
    }

    pub fn audit(&self) -> &AuditLog {
        &self.inner.audit
    }

    pub fn sandbox_name(&self) -> &str {
        self.inner.sandbox.name()
    }

    /// True when `path` is under an allowed root, or no roots are configured
    pub fn is_path_allowed(&self, path: &std::path::Path) -> bool {
        self.inner.config.policy.is_path_allowed(path)
    }

    async fn reserve_slot(&self) -> EngineResult<SlotGuard<'_>> {
        let sessions = self.inner.sessions.write().await;
        let max = self.inner.config.max_sessions;
        if sessions.len() + self.inner.creating.load(Ordering::SeqCst) >= max {
            return Err(EngineError::CapacityExceeded { max });
        }
        self.inner.creating.fetch_add(1, Ordering::SeqCst);
        Ok(SlotGuard(&self.inner.creating))
    }

    fn resolve_cwd(&self, requested: Option<&PathBuf>) -> PathBuf {
        let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        match requested {
            Some(path) => normalize_path(path, &current),
            None => self
                .inner
                .config
                .policy
                .allowed_paths
                .first()
                .map(|root| normalize_path(root, &current))
                .unwrap_or(current),
        }
    }

    /// Spawn a new session after capacity, command and path checks
    pub async fn create_session(&self, request: CreateSessionRequest) -> EngineResult<CreatedSession> {
        let _slot = self.reserve_slot().await?;
        let config = &self.inner.config;

        config.policy.check_command(&request.command)?;

        let cwd = self.resolve_cwd(request.cwd.as_ref());
        if !config.policy.is_path_allowed(&cwd) {
            return Err(EngineError::PathNotAllowed(cwd.display().to_string()));
        }

        let options = SpawnOptions {
            command: request.command.clone(),
            args: request.args.clone(),
            cwd: cwd.clone(),
            env: request.env.clone(),
            cols: request.cols.unwrap_or(config.default_cols),
            rows: request.rows.unwrap_or(config.default_rows),
            force_pipe: config.force_pipe,
            scrollback_lines: config.scrollback_lines,
        };
        let terminal = Terminal::spawn(&options, self.inner.sandbox.as_ref())?;

        tokio::time::sleep(config.prompt_grace).await;
        terminal.infer_prompt();

        let name = request
            .name
            .clone()
            .unwrap_or_else(|| command_basename(&request.command).to_string());
        let mode = terminal.mode();
        let pid = terminal.pid();

        let id = {
            let mut sessions = self.inner.sessions.write().await;
            let id = loop {
                let candidate = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            let session = Session::new(id.clone(), name.clone(), request.command.clone(), request.args.clone(), cwd.clone(), terminal);
            sessions.insert(id.clone(), Arc::new(session));
            id
        };

        self.arm_idle_timer(&id).await;

        log::info!("Created session {} ({}) running '{}' in {} mode", id, name, request.command, mode);
        self.inner.audit.record(
            AuditEvent::SessionCreate,
            Some(&id),
            json!({
                "name": name,
                "command": request.command,
                "args": request.args,
                "cwd": cwd.display().to_string(),
                "pid": pid,
                "mode": mode,
            }),
        );

        Ok(CreatedSession { session_id: id, name, pid, mode })
    }

    /// Look up a session, refreshing its liveness
    pub async fn get_session(&self, id: &str) -> EngineResult<Arc<Session>> {
        let session = self
            .inner
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        session.sync_liveness();
        Ok(session)
    }

    /// All registered sessions, oldest first
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Terminate a session and remove it from the table
    pub async fn close_session(&self, id: &str, signal: Option<Signal>) -> EngineResult<()> {
        let session = self.remove(id).await?;
        let signal = signal.unwrap_or_default();
        session.close(signal);

        log::info!("Closed session {} with {}", id, signal);
        self.inner
            .audit
            .record(AuditEvent::SessionClose, Some(id), json!({ "signal": signal.name() }));
        Ok(())
    }

    async fn remove(&self, id: &str) -> EngineResult<Arc<Session>> {
        let session = self
            .inner
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;
        if let Some(timer) = self.inner.idle_timers.lock().await.remove(id) {
            timer.handle.abort();
        }
        Ok(session)
    }

    /// Note a successful write: refresh last-activity and restart the idle timer
    pub async fn record_activity(&self, id: &str) {
        if let Ok(session) = self.get_session(id).await {
            session.touch();
            self.arm_idle_timer(id).await;
        }
    }

    /// Close every session. Failures are logged and skipped.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.inner.sessions.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.close_session(&id, None).await {
                log::warn!("Failed to close session {} during shutdown: {}", id, e);
            }
        }
    }

    async fn arm_idle_timer(&self, id: &str) {
        let Some(timeout) = self.inner.config.idle_timeout else {
            return;
        };

        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let session_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SessionManager { inner };
            manager.expire(&session_id, generation, timeout).await;
        });

        let mut timers = self.inner.idle_timers.lock().await;
        if let Some(previous) = timers.insert(id.to_string(), IdleTimer { generation, handle }) {
            previous.handle.abort();
        }
    }

    async fn expire(&self, id: &str, generation: u64, timeout: Duration) {
        {
            let mut timers = self.inner.idle_timers.lock().await;
            // Re-armed since this timer started
            if timers.get(id).map(|timer| timer.generation) != Some(generation) {
                return;
            }
            timers.remove(id);
        }

        let session = match self.inner.sessions.write().await.remove(id) {
            Some(session) => session,
            None => return,
        };
        session.close(Signal::default());

        log::info!("Closed session {} after {}s without activity", id, timeout.as_secs());
        self.inner.audit.record(
            AuditEvent::SessionIdleClose,
            Some(id),
            json!({ "idle_timeout_secs": timeout.as_secs() }),
        );
    }
}
