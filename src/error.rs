use thiserror::Error;

use crate::live::action_guard::CommandKind;

/// Failures surfaced by the synchronization layer. None of them are fatal: every
/// variant leaves the owning panel usable and the operation retriable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Failed to load {resource}: {message}")]
    Fetch { resource: String, message: String },
    #[error("Failed to {command} {entity}: {message}")]
    Command {
        entity: String,
        command: CommandKind,
        message: String,
    },
    #[error("A {command} request for {entity} is already in progress")]
    Conflict { entity: String, command: CommandKind },
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl SyncError {
    /// Conflicts and cancellations are structural and never shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, SyncError::Conflict { .. } | SyncError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::Command {
            entity: "web".to_string(),
            command: CommandKind::Restart,
            message: "HTTP 500".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to restart web: HTTP 500");

        let err = SyncError::Fetch {
            resource: "containers".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to load containers: connection refused");
    }

    #[test]
    fn test_conflict_is_not_user_visible() {
        let conflict = SyncError::Conflict {
            entity: "web".to_string(),
            command: CommandKind::Stop,
        };
        assert!(!conflict.is_user_visible());
        assert!(!SyncError::Cancelled("expire key".to_string()).is_user_visible());
        assert!(SyncError::Validation("user is required".to_string()).is_user_visible());
    }
}
