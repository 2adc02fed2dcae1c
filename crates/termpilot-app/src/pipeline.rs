//! The command pipeline every caller-submitted input passes through.
//!
//! Order of checks for input bound for a session:
//! 1. the session exists and is alive
//! 2. danger classification, with one-shot confirmations
//! 3. path policy for absolute paths and `cd` targets
//! 4. write, then wait for completion
//! 5. sanitize and redact the output (echo stripping only applies to a pty)

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use termpilot_logging::{safe_truncate, AuditEvent, AuditLog};
use termpilot_policy::{DangerDetector, DangerVerdict, OutputSanitizer, SecretRedactor};
use termpilot_terminal::{ControlKey, CreateSessionRequest, Session, SessionManager, Signal};
use termpilot_types::{
    CommandOutput, CreatedSession, EngineError, EngineResult, ScreenOutput, SessionInfo,
    TerminalMode, MIN_JUSTIFICATION_LEN,
};

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Character budget for returned output
    pub max_output_chars: usize,
    pub default_timeout: Duration,
    pub redact_secrets: bool,
    pub danger_detection: bool,
    /// How long `send_control` waits before reading
    pub control_wait: Duration,
    /// Confirmed dangerous commands get this many times the normal timeout
    pub confirm_timeout_factor: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_output_chars: 50_000,
            default_timeout: Duration::from_secs(30),
            redact_secrets: true,
            danger_detection: true,
            control_wait: Duration::from_millis(500),
            confirm_timeout_factor: 4,
        }
    }
}

/// Caller-facing operations over a [`SessionManager`]
pub struct CommandPipeline {
    manager: SessionManager,
    config: PipelineConfig,
    danger: DangerDetector,
    redactor: SecretRedactor,
    sanitizer: OutputSanitizer,
    audit: Arc<AuditLog>,
}

impl CommandPipeline {
    pub fn new(manager: SessionManager, config: PipelineConfig, audit: Arc<AuditLog>) -> Self {
        let sanitizer = OutputSanitizer::new(config.max_output_chars);
        Self {
            manager,
            config,
            danger: DangerDetector::new(),
            redactor: SecretRedactor::new(),
            sanitizer,
            audit,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn create_session(&self, request: CreateSessionRequest) -> EngineResult<CreatedSession> {
        self.manager.create_session(request).await
    }

    /// Run one input in a session and return its cleaned output
    pub async fn send_command(
        &self,
        session_id: &str,
        input: &str,
        timeout: Option<Duration>,
        max_chars: Option<usize>,
    ) -> EngineResult<CommandOutput> {
        let session = self.live_session(session_id).await?;

        if self.config.danger_detection {
            if let DangerVerdict::Dangerous(reason) = self.danger.detect(input) {
                if !session.take_confirmation(input) {
                    self.audit.record(
                        AuditEvent::CommandBlocked,
                        Some(session_id),
                        json!({
                            "input": self.scrub(input),
                            "reason": reason,
                            "matched": self.danger.detect_all(input),
                        }),
                    );
                    log::warn!(
                        "Blocked dangerous input in session {}: {} ({})",
                        session_id,
                        reason,
                        safe_truncate(&self.scrub(input), 80)
                    );
                    return Err(EngineError::DangerousCommand { reason: reason.to_string() });
                }
            }
        }

        self.check_paths(&session, input)?;

        let timeout = timeout.unwrap_or(self.config.default_timeout);
        self.execute(&session, input, timeout, max_chars).await
    }

    /// Run an input that was blocked as dangerous, once, with a justification
    pub async fn confirm_dangerous(
        &self,
        session_id: &str,
        input: &str,
        justification: &str,
        timeout: Option<Duration>,
    ) -> EngineResult<CommandOutput> {
        let session = self.live_session(session_id).await?;

        if justification.trim().chars().count() < MIN_JUSTIFICATION_LEN {
            return Err(EngineError::JustificationTooShort { min: MIN_JUSTIFICATION_LEN });
        }

        let DangerVerdict::Dangerous(reason) = self.danger.detect(input) else {
            return Err(EngineError::NotDangerous);
        };

        self.audit.record(
            AuditEvent::DangerousCommandConfirmed,
            Some(session_id),
            json!({
                "input": self.scrub(input),
                "reason": reason,
                "matched": self.danger.detect_all(input),
                "justification": justification,
            }),
        );
        log::info!("Dangerous input confirmed in session {}: {}", session_id, reason);

        let timeout = timeout.unwrap_or(self.config.default_timeout) * self.config.confirm_timeout_factor;
        session.add_confirmation(input);
        let result = self.send_command(session_id, input, Some(timeout), None).await;
        // Nothing consumes the entry when detection is off or the send failed early
        session.take_confirmation(input);
        result
    }

    /// Current screen, or full history, of a session
    pub async fn read_output(&self, session_id: &str, full: bool) -> EngineResult<ScreenOutput> {
        let session = self.manager.get_session(session_id).await?;
        let raw = session.terminal().read_screen(full);
        Ok(ScreenOutput {
            output: self.clean(&raw, None, None),
            alive: session.sync_liveness(),
        })
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.manager.list_sessions().await
    }

    pub async fn close_session(&self, session_id: &str, signal: Option<&str>) -> EngineResult<()> {
        let signal = signal.map(str::parse::<Signal>).transpose()?;
        self.manager.close_session(session_id, signal).await
    }

    /// Send a control key and return what the session printed shortly after
    pub async fn send_control(&self, session_id: &str, key: &str) -> EngineResult<ScreenOutput> {
        let session = self.live_session(session_id).await?;
        let key: ControlKey = key.parse()?;

        session.send_control(&key)?;
        self.manager.record_activity(session_id).await;
        self.audit
            .record(AuditEvent::ControlSend, Some(session_id), json!({ "key": key.name() }));

        tokio::time::sleep(self.config.control_wait).await;
        let raw = session.terminal().read_new_output();
        Ok(ScreenOutput {
            output: self.clean(&raw, None, None),
            alive: session.sync_liveness(),
        })
    }

    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> EngineResult<()> {
        let session = self.live_session(session_id).await?;
        session.terminal().resize(cols, rows)
    }

    /// Close every session
    pub async fn shutdown(&self) {
        self.manager.close_all().await;
    }

    async fn live_session(&self, session_id: &str) -> EngineResult<Arc<Session>> {
        let session = self.manager.get_session(session_id).await?;
        session.ensure_alive()?;
        Ok(session)
    }

    fn check_paths(&self, session: &Session, input: &str) -> EngineResult<()> {
        let Some(path) = self
            .manager
            .policy()
            .find_disallowed_path(input, session.working_dir())
        else {
            return Ok(());
        };

        self.audit.record(
            AuditEvent::PathBlocked,
            Some(session.id()),
            json!({ "input": self.scrub(input), "path": path.display().to_string() }),
        );
        Err(EngineError::PathNotAllowed(path.display().to_string()))
    }

    async fn execute(
        &self,
        session: &Session,
        input: &str,
        timeout: Duration,
        max_chars: Option<usize>,
    ) -> EngineResult<CommandOutput> {
        session.write_line(input)?;
        self.manager.record_activity(session.id()).await;
        self.audit
            .record(AuditEvent::Command, Some(session.id()), json!({ "input": self.scrub(input) }));

        let outcome = session.terminal().wait_for_output(timeout).await;
        let raw = session.terminal().read_new_output();
        let warning = (!outcome.complete).then(|| {
            format!(
                "Command did not complete within {}ms and may still be running. Use read_output to check for more output.",
                timeout.as_millis()
            )
        });

        // Only a pty echoes input back; in pipe mode a matching line is real output
        let echo = (session.terminal().mode() == TerminalMode::Pty).then_some(input);
        Ok(CommandOutput {
            output: self.clean(&raw, echo, max_chars),
            complete: outcome.complete,
            alive: session.sync_liveness(),
            warning,
        })
    }

    fn clean(&self, raw: &str, input: Option<&str>, max_chars: Option<usize>) -> String {
        let sanitized = self.sanitizer.sanitize(raw, input, max_chars);
        self.scrub(&sanitized)
    }

    /// Apply secret redaction when enabled
    fn scrub(&self, text: &str) -> String {
        if self.config.redact_secrets {
            self.redactor.redact(text)
        } else {
            text.to_string()
        }
    }
}
