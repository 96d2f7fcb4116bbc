use crate::types::DbId;

/// Domain error shared by every crate in the workspace.
///
/// The orchestration variants (`Connection` through `Cancelled`) classify
/// failures of remote and external work; the HTTP layer maps each to a
/// status code and an `{ success: false, error }` body.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The host could not be reached. Retryable.
    #[error("Connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    /// A remote command ran and exited non-zero (or timed out).
    #[error("Command `{command}` failed with exit code {exit_code:?}: {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A DNS provider, certificate authority, git host or object store
    /// returned an error.
    #[error("{service} error: {message}")]
    ExternalService { service: &'static str, message: String },

    /// The owning client's plan lacks a required feature.
    #[error("Entitlement missing: {0}")]
    Entitlement(String),

    /// The operation was abandoned at a checkpoint after a cancel request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Connection { .. })
    }

    /// Shorthand for an [`CoreError::ExternalService`] error.
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        CoreError::ExternalService {
            service,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_retryable() {
        let conn = CoreError::Connection {
            host: "web1".into(),
            message: "refused".into(),
        };
        let cmd = CoreError::Command {
            command: "false".into(),
            exit_code: Some(1),
            stderr: String::new(),
        };
        assert!(conn.is_retryable());
        assert!(!cmd.is_retryable());
        assert!(!CoreError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn command_error_message_includes_stderr() {
        let err = CoreError::Command {
            command: "nginx -t".into(),
            exit_code: Some(1),
            stderr: "unexpected }".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nginx -t"));
        assert!(msg.contains("unexpected }"));
    }
}
