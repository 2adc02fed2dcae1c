use thiserror::Error;

/// Every condition a caller-facing operation can fail with
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Maximum concurrent sessions ({max}) reached. Close a session before creating a new one.")]
    CapacityExceeded { max: usize },
    #[error("Command '{0}' is blocked by policy")]
    CommandBlocked(String),
    #[error("Command '{0}' is not in the allowed list")]
    CommandNotAllowed(String),
    #[error("Path '{0}' is outside the allowed paths")]
    PathNotAllowed(String),
    #[error("Session '{0}' not found")]
    SessionNotFound(String),
    #[error("Unknown control key '{0}'")]
    UnknownControlKey(String),
    #[error("Unknown signal '{0}'")]
    UnknownSignal(String),
    #[error("Session '{0}' is not alive")]
    SessionNotAlive(String),
    #[error("Dangerous command blocked: {reason}. If this is intended, call confirm_dangerous_command with a justification.")]
    DangerousCommand { reason: String },
    #[error("Command is not classified as dangerous; use send_command instead")]
    NotDangerous,
    #[error("Justification must be at least {min} characters")]
    JustificationTooShort { min: usize },
    #[error("Terminal size {cols}x{rows} is invalid; columns and rows must be at least 1")]
    InvalidGeometry { cols: u16, rows: u16 },
    #[error("Failed to spawn '{command}': {cause}")]
    Spawn { command: String, cause: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short machine-readable name of the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::CapacityExceeded { .. } => "capacity",
            EngineError::CommandBlocked(_)
            | EngineError::CommandNotAllowed(_)
            | EngineError::PathNotAllowed(_) => "policy",
            EngineError::SessionNotFound(_)
            | EngineError::UnknownControlKey(_)
            | EngineError::UnknownSignal(_) => "not_found",
            EngineError::SessionNotAlive(_) => "liveness",
            EngineError::DangerousCommand { .. }
            | EngineError::NotDangerous
            | EngineError::JustificationTooShort { .. } => "safety",
            EngineError::InvalidGeometry { .. } => "invalid_arguments",
            EngineError::Spawn { .. } => "spawn",
            EngineError::Io(_) => "io",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::CapacityExceeded { max: 3 }.kind(), "capacity");
        assert_eq!(EngineError::CommandNotAllowed("python3".into()).kind(), "policy");
        assert_eq!(EngineError::SessionNotFound("x".into()).kind(), "not_found");
        assert_eq!(EngineError::NotDangerous.kind(), "safety");
        assert_eq!(EngineError::InvalidGeometry { cols: 0, rows: 24 }.kind(), "invalid_arguments");
    }

    #[test]
    fn test_not_allowed_message() {
        let err = EngineError::CommandNotAllowed("python3".into());
        assert!(err.to_string().contains("not in the allowed list"));
    }
}
