//! Unified error taxonomy for the toskose workspace.
//!
//! Every variant carries a sanitized, user-facing message. The raw cause
//! (engine response, I/O error, YAML diagnostics) is logged by the component
//! that caught it and never travels inside the error value.

use std::path::Path;

use thiserror::Error;

/// Suffix appended to the generic, user-facing error messages.
const SEE_LOGS: &str = "See logs for further details.";

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ToskoseError {
    /// The topology manifest or one of its blocks is malformed.
    #[error("parsing error: {message}")]
    Parsing {
        /// Description of the parsing failure.
        message: String,
    },

    /// The CSAR archive does not respect the expected layout.
    #[error("malformed CSAR archive: {message}")]
    MalformedCsar {
        /// Description of the structural problem.
        message: String,
    },

    /// The deployment configuration is invalid.
    #[error("invalid configuration: {message}")]
    Validation {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The deployment configuration is valid but lacks required data.
    #[error("incomplete configuration: {message}")]
    PartialValidation {
        /// Description of the missing data.
        message: String,
    },

    /// The user declined an interactive confirmation.
    #[error("operation aborted by the user: {message}")]
    OperationAbortedByUser {
        /// Description of the aborted operation.
        message: String,
    },

    /// Every registry authentication attempt failed.
    #[error("docker authentication failed: {message}")]
    DockerAuthenticationFailed {
        /// Description of the failed authentication.
        message: String,
    },

    /// The container engine reported a failure.
    #[error("docker operation failed: {message}")]
    DockerOperation {
        /// Description of the failed engine operation.
        message: String,
    },

    /// The deployment descriptor could not be rendered.
    #[error("translation error: {message}")]
    Translation {
        /// Description of the rendering failure.
        message: String,
    },

    /// Catch-all for unexpected and filesystem failures.
    #[error("fatal error: {message}")]
    Fatal {
        /// Description of the fatal error.
        message: String,
    },
}

impl ToskoseError {
    /// Builds a [`ToskoseError::Parsing`] with the given message.
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
        }
    }

    /// Builds a [`ToskoseError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds a [`ToskoseError::DockerOperation`] with the given message.
    pub fn docker(message: impl Into<String>) -> Self {
        Self::DockerOperation {
            message: message.into(),
        }
    }

    /// Builds a [`ToskoseError::Fatal`] with the given message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Logs a filesystem failure and wraps it into a sanitized [`ToskoseError::Fatal`].
    pub fn fatal_io(path: &Path, source: &std::io::Error) -> Self {
        tracing::error!(path = %path.display(), error = %source, "filesystem operation failed");
        Self::Fatal {
            message: format!("filesystem operation failed on {}. {SEE_LOGS}", path.display()),
        }
    }

    /// Returns `true` for errors raised by an interactive decline.
    pub const fn is_user_abort(&self) -> bool {
        matches!(self, Self::OperationAbortedByUser { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ToskoseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_io_hides_the_raw_cause() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "secret detail");
        let err = ToskoseError::fatal_io(Path::new("/tmp/ctx"), &source);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/ctx"), "got: {msg}");
        assert!(!msg.contains("secret detail"), "got: {msg}");
    }

    #[test]
    fn display_carries_variant_prefix() {
        let err = ToskoseError::parsing("node type unknown");
        assert_eq!(err.to_string(), "parsing error: node type unknown");
    }

    #[test]
    fn user_abort_is_detected() {
        let err = ToskoseError::OperationAbortedByUser {
            message: "declined".into(),
        };
        assert!(err.is_user_abort());
        assert!(!ToskoseError::fatal("x").is_user_abort());
    }
}
