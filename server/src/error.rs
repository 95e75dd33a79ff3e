//! Error types for the registry, sessions, interactions and transport.
//!
//! Validation failures are returned to the caller as values. The transport
//! turns them into [`ErrorCode`]s for the originating client only.

use shared::ErrorCode;

/// Registry and session lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session is full")]
    Full,
    #[error("role is already taken")]
    RoleTaken,
    #[error("could not generate a unique room code after {attempts} attempts")]
    CodeExhausted { attempts: u32 },
    #[error("unknown level: {0}")]
    UnknownLevel(String),
    #[error("player is already in a session")]
    AlreadyInSession,
    #[error("player is not in this session")]
    NotInSession,
    #[error("both roles must be present")]
    NotReady,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound => ErrorCode::SessionNotFound,
            SessionError::Full => ErrorCode::SessionFull,
            SessionError::RoleTaken => ErrorCode::RoleTaken,
            SessionError::CodeExhausted { .. } => ErrorCode::CodeExhausted,
            SessionError::UnknownLevel(_) => ErrorCode::UnknownLevel,
            SessionError::AlreadyInSession => ErrorCode::AlreadyInSession,
            SessionError::NotInSession => ErrorCode::NotInSession,
            SessionError::NotReady => ErrorCode::NotReady,
        }
    }
}

/// Rejected interaction. Nothing is applied when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InteractionError {
    #[error("role may not use this object")]
    PermissionDenied,
    #[error("action not supported by this object")]
    InvalidAction,
    #[error("no such interactable")]
    InvalidTarget,
    #[error("destination is blocked")]
    Blocked,
    #[error("game is not running")]
    NotPlaying,
}

impl InteractionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            InteractionError::PermissionDenied => ErrorCode::PermissionDenied,
            InteractionError::InvalidAction => ErrorCode::InvalidAction,
            InteractionError::InvalidTarget => ErrorCode::InvalidTarget,
            InteractionError::Blocked => ErrorCode::Blocked,
            InteractionError::NotPlaying => ErrorCode::NotPlaying,
        }
    }
}

/// Errors that can occur when loading configuration or level files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}")]
    ReadError(#[source] std::io::Error),
    #[error("failed to parse json: {0}")]
    ParseError(#[source] serde_json::Error),
    #[error("duplicate level id: {0}")]
    DuplicateLevel(String),
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(SessionError::NotFound.code(), ErrorCode::SessionNotFound);
        assert_eq!(SessionError::Full.code(), ErrorCode::SessionFull);
        assert_eq!(
            SessionError::CodeExhausted { attempts: 3 }.code(),
            ErrorCode::CodeExhausted
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SessionError::CodeExhausted { attempts: 10 }.to_string(),
            "could not generate a unique room code after 10 attempts"
        );
        assert_eq!(
            InteractionError::PermissionDenied.to_string(),
            "role may not use this object"
        );
    }
}
