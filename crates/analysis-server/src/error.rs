//
// error.rs
//
// Server errors reported to listeners
//

use std::fmt;

use serde::Serialize;

/// Category of a server error delivered through `on_server_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerErrorCode {
    /// A context-scoped command referenced a context that does not exist.
    InvalidContextId,
    /// The SDK path given to `create_context` could not be used.
    InvalidSdkPath,
    /// An operation failed or panicked while executing on the worker.
    OperationFailed,
}

impl fmt::Display for ServerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerErrorCode::InvalidContextId => "INVALID_CONTEXT_ID",
            ServerErrorCode::InvalidSdkPath => "INVALID_SDK_PATH",
            ServerErrorCode::OperationFailed => "OPERATION_FAILED",
        };
        f.write_str(name)
    }
}

/// A recoverable server error. Never stops the worker loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError {
    pub code: ServerErrorCode,
    pub message: String,
}

impl ServerError {
    pub fn new(code: ServerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_context_id(context_id: &str) -> Self {
        Self::new(
            ServerErrorCode::InvalidContextId,
            format!("Unknown context id: {}", context_id),
        )
    }

    /// Recovers the server error carried by `err`, or wraps the whole error
    /// chain as `OperationFailed`.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ServerError>() {
            Some(server_error) => server_error.clone(),
            None => Self::new(ServerErrorCode::OperationFailed, format!("{:#}", err)),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_keeps_code() {
        let err = anyhow::Error::new(ServerError::invalid_context_id("ctx-9"));
        let recovered = ServerError::from_anyhow(&err);
        assert_eq!(recovered.code, ServerErrorCode::InvalidContextId);
        assert!(recovered.message.contains("ctx-9"));
    }

    #[test]
    fn test_foreign_error_becomes_operation_failed() {
        let err = anyhow::anyhow!("disk on fire").context("while analyzing");
        let recovered = ServerError::from_anyhow(&err);
        assert_eq!(recovered.code, ServerErrorCode::OperationFailed);
        assert_eq!(recovered.message, "while analyzing: disk on fire");
    }

    #[test]
    fn test_display() {
        let err = ServerError::new(ServerErrorCode::InvalidSdkPath, "empty path");
        assert_eq!(err.to_string(), "INVALID_SDK_PATH: empty path");
    }
}
