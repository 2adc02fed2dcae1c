//! Safety policy for session input and output: destructive-input detection,
//! secret redaction, output sanitizing, and command/path restrictions.

pub mod danger;
pub mod paths;
pub mod sanitize;
pub mod secrets;

pub use danger::{DangerDetector, DangerVerdict};
pub use paths::{is_path_within, normalize_path, referenced_paths};
pub use sanitize::OutputSanitizer;
pub use secrets::SecretRedactor;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use termpilot_types::{EngineError, EngineResult};

/// Which commands may be spawned and where sessions may operate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPolicy {
    /// If non-empty, only these executable basenames may run
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Executable basenames that may never run
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    /// If non-empty, working directories and referenced paths must lie under one of these
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
}

impl CommandPolicy {
    /// Policy that allows everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Check an executable against the block and allow lists
    pub fn check_command(&self, command: &str) -> EngineResult<()> {
        let name = command_basename(command);

        if self.blocked_commands.iter().any(|c| c == name) {
            return Err(EngineError::CommandBlocked(name.to_string()));
        }

        if !self.allowed_commands.is_empty() && !self.allowed_commands.iter().any(|c| c == name) {
            return Err(EngineError::CommandNotAllowed(name.to_string()));
        }

        Ok(())
    }

    /// True when no roots are configured or `path` lies under one of them
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        is_path_within(path, &self.allowed_paths)
    }

    pub fn has_path_restrictions(&self) -> bool {
        !self.allowed_paths.is_empty()
    }

    /// First path referenced by `input` that falls outside the allowed roots
    pub fn find_disallowed_path(&self, input: &str, cwd: &Path) -> Option<PathBuf> {
        if !self.has_path_restrictions() {
            return None;
        }
        referenced_paths(input, cwd)
            .into_iter()
            .find(|path| !self.is_path_allowed(path))
    }
}

/// Final path component of a command, e.g. `/usr/bin/python3` -> `python3`
pub fn command_basename(command: &str) -> &str {
    Path::new(command)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_is_exclusive() {
        let policy = CommandPolicy {
            allowed_commands: vec!["bash".to_string()],
            ..Default::default()
        };
        assert!(policy.check_command("bash").is_ok());
        assert!(policy.check_command("/bin/bash").is_ok());
        let err = policy.check_command("python3").unwrap_err();
        assert!(err.to_string().contains("not in the allowed list"));
    }

    #[test]
    fn test_blocklist() {
        let policy = CommandPolicy {
            blocked_commands: vec!["nc".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            policy.check_command("/usr/bin/nc"),
            Err(EngineError::CommandBlocked(_))
        ));
        assert!(policy.check_command("sh").is_ok());
    }

    #[test]
    fn test_find_disallowed_path() {
        let policy = CommandPolicy {
            allowed_paths: vec![PathBuf::from("/srv/work")],
            ..Default::default()
        };
        let cwd = Path::new("/srv/work");
        assert_eq!(policy.find_disallowed_path("ls src", cwd), None);
        assert_eq!(policy.find_disallowed_path("cat /srv/work/a.txt", cwd), None);
        assert_eq!(
            policy.find_disallowed_path("cd ../..", cwd),
            Some(PathBuf::from("/"))
        );
        assert_eq!(
            policy.find_disallowed_path("cat /etc/shadow", cwd),
            Some(PathBuf::from("/etc/shadow"))
        );
        assert_eq!(CommandPolicy::allow_all().find_disallowed_path("cat /etc/shadow", cwd), None);
    }

    #[test]
    fn test_command_basename() {
        assert_eq!(command_basename("/usr/bin/python3"), "python3");
        assert_eq!(command_basename("bash"), "bash");
    }
}
