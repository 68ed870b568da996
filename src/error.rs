use thiserror::Error;

/// Failures surfaced by the transcript controller and its collaborators.
///
/// Nothing here is fatal: validation errors are shown inline, transport errors
/// leave the state machine where it was so the user can retry, and storage
/// errors are logged and replaced by an empty default.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Select a workspace before starting a session")]
    MissingWorkspacePath,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("No session selected")]
    NoSessionSelected,

    #[error("{0}")]
    Transport(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl ConsoleError {
    /// Local validation failures, as opposed to errors reported by a collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConsoleError::MissingWorkspacePath
                | ConsoleError::EmptyMessage
                | ConsoleError::NoSessionSelected
        )
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        ConsoleError::Transport(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        ConsoleError::Storage(err.to_string())
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified() {
        assert!(ConsoleError::MissingWorkspacePath.is_validation());
        assert!(ConsoleError::EmptyMessage.is_validation());
        assert!(ConsoleError::NoSessionSelected.is_validation());
        assert!(!ConsoleError::Transport("boom".into()).is_validation());
        assert!(!ConsoleError::Storage("disk".into()).is_validation());
    }

    #[test]
    fn transport_error_displays_message_verbatim() {
        let err = ConsoleError::transport("HTTP 502");
        assert_eq!(err.to_string(), "HTTP 502");
    }
}
