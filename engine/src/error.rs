use std::path::PathBuf;
use std::time::Duration;

use rallyd_types::{DeploymentId, ReportFormatError};

/// Failure of a backend operation.
///
/// Variants map onto HTTP statuses at the server boundary, so pick the one that
/// describes the caller's problem rather than the mechanism that failed.
#[derive(Debug, thiserror::Error)]
pub enum RallyError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
    #[error("Tempest is not installed for deployment {deployment}")]
    TempestNotInstalled { deployment: DeploymentId },
    #[error("`{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` timed out after {}s", elapsed.as_secs())]
    Timeout { command: String, elapsed: Duration },
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unexpected output from `{command}`: {message}")]
    UnexpectedOutput { command: String, message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl RallyError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ReportFormatError> for RallyError {
    fn from(err: ReportFormatError) -> Self {
        Self::invalid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = RallyError::not_found("task", "abc");
        assert_eq!(err.to_string(), "task abc not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn report_format_error_is_invalid_input() {
        let err: RallyError = "pdf"
            .parse::<rallyd_types::TaskReportFormat>()
            .unwrap_err()
            .into();
        assert!(matches!(err, RallyError::InvalidInput { .. }));
    }
}
