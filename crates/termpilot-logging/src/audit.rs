use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    ServerStart,
    ServerStop,
    SessionCreate,
    SessionClose,
    SessionIdleClose,
    Command,
    CommandBlocked,
    PathBlocked,
    DangerousCommandConfirmed,
    ControlSend,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditEvent::ServerStart => "server_start",
            AuditEvent::ServerStop => "server_stop",
            AuditEvent::SessionCreate => "session_create",
            AuditEvent::SessionClose => "session_close",
            AuditEvent::SessionIdleClose => "session_idle_close",
            AuditEvent::Command => "command",
            AuditEvent::CommandBlocked => "command_blocked",
            AuditEvent::PathBlocked => "path_blocked",
            AuditEvent::DangerousCommandConfirmed => "dangerous_command_confirmed",
            AuditEvent::ControlSend => "control_send",
        };
        write!(f, "{}", name)
    }
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub details: Map<String, Value>,
}

/// Append-only JSON-lines audit sink.
///
/// Without a destination file, entries are forwarded to the `log` facade
/// under the `audit` target instead.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl AuditLog {
    /// Audit log that only forwards to the `log` facade
    pub fn disabled() -> Self {
        Self { path: None, file: None }
    }

    /// Open (or create) an append-only audit file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create audit log directory")?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path: Some(path),
            file: Some(Mutex::new(file)),
        })
    }

    /// Open the file if a destination is given, falling back to the log facade on failure
    pub fn from_destination(destination: Option<&Path>) -> Self {
        match destination {
            Some(path) => Self::open(path).unwrap_or_else(|e| {
                log::warn!("Audit log unavailable, using log output instead: {:#}", e);
                Self::disabled()
            }),
            None => Self::disabled(),
        }
    }

    /// Destination file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an event. Never fails; write errors are logged.
    pub fn record(&self, event: AuditEvent, session_id: Option<&str>, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            session_id: session_id.map(str::to_string),
            details,
        };

        if let Err(e) = self.write_entry(&entry) {
            log::error!("Failed to write audit entry {}: {:#}", event, e);
        }
    }

    fn write_entry(&self, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("Failed to serialize audit entry")?;

        match &self.file {
            Some(file) => {
                let mut file = file
                    .lock()
                    .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?;
                writeln!(file, "{}", line).context("Failed to write to audit log")?;
                file.flush()?;
            }
            None => log::info!(target: "audit", "{}", line),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_entries_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");

        let audit = AuditLog::open(&path).unwrap();
        audit.record(AuditEvent::ServerStart, None, json!({ "version": "test" }));
        audit.record(AuditEvent::Command, Some("abc123"), json!({ "command": "ls" }));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event, AuditEvent::Command);
        assert_eq!(second.session_id.as_deref(), Some("abc123"));
        assert_eq!(second.details.get("command"), Some(&json!("ls")));

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "server_start");
        assert!(first.get("session_id").is_none());
    }

    #[test]
    fn test_disabled_log_accepts_records() {
        let audit = AuditLog::disabled();
        audit.record(AuditEvent::ControlSend, Some("s1"), json!("ctrl+c"));
        assert!(audit.path().is_none());
    }
}
