use thiserror::Error;

/// Unified error type for tag-mirror operations
///
/// Every variant is fatal to the run: the controller never retries a failed
/// step, it reports the error and terminates so the operator can inspect the
/// package repository before re-running.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Repository operation `{operation}` failed: {reason}")]
    Repository { operation: String, reason: String },

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in tag-mirror
pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        MirrorError::Version(msg.into())
    }

    /// Create a repository error carrying the failing operation for diagnosis
    pub fn repository(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::Repository {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a filesystem error with context
    pub fn filesystem(msg: impl Into<String>) -> Self {
        MirrorError::Filesystem(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        MirrorError::Config(msg.into())
    }

    /// The failing repository operation, if this is a repository error
    pub fn failed_operation(&self) -> Option<&str> {
        match self {
            MirrorError::Repository { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MirrorError::version("not a version: nightly");
        assert_eq!(
            err.to_string(),
            "Version parsing error: not a version: nightly"
        );
    }

    #[test]
    fn test_repository_error_carries_operation() {
        let err = MirrorError::repository("checkout 3.9", "branch not found");
        assert_eq!(err.failed_operation(), Some("checkout 3.9"));
        assert!(err.to_string().contains("checkout 3.9"));
        assert!(err.to_string().contains("branch not found"));
    }

    #[test]
    fn test_non_repository_errors_have_no_operation() {
        assert!(MirrorError::version("x").failed_operation().is_none());
        assert!(MirrorError::filesystem("x").failed_operation().is_none());
        assert!(MirrorError::config("x").failed_operation().is_none());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MirrorError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (MirrorError::version("x"), "Version parsing error"),
            (MirrorError::filesystem("x"), "Filesystem error"),
            (MirrorError::config("x"), "Configuration error"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }
}
