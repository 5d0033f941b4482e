//! Error types for the probe proxy.
//!
//! Two layers of errors exist:
//! - [`RemoteError`]: raised by a Target API operation inside the worker. It is
//!   a tagged value (stable [`ErrorKind`] plus message and optional native code)
//!   so it can cross the process boundary and be rebuilt verbatim on the caller.
//! - [`ProxyError`]: everything the caller can observe, including local failures
//!   (unavailable, lock timeout, unknown operation) that never reach the worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Stable discriminant for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, surplus or ill-typed argument.
    InvalidArgument,
    /// The worker has no handler for the requested name.
    UnknownOperation,
    /// The operation is not valid in the target's current state.
    InvalidOperation,
    /// Address or length outside the target's memory map.
    OutOfRange,
    /// No probe or device connection.
    NotConnected,
    /// Blocked by readback or erase protection.
    Protected,
    Timeout,
    Io,
    /// Native library reported an error code with no closer match.
    Api,
    /// The operation panicked.
    Panic,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::OutOfRange => "out_of_range",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::Protected => "protected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Io => "io",
            ErrorKind::Api => "api",
            ErrorKind::Panic => "panic",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised by a Target API operation, transportable across processes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    /// Native error code, when the target library reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attach a native error code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperation,
            format!("Target API has no operation named '{}'", name),
        )
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "operation panicked with a non-string payload".to_string()
        };
        Self::new(ErrorKind::Panic, message)
    }
}

/// Errors observed by callers of the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Worker process terminated, probe API is unavailable")]
    Unavailable,

    #[error("Timed out after {0:?} waiting for exclusive access to the worker")]
    AcquisitionTimeout(Duration),

    #[error("Probe API has no operation named '{name}'")]
    UnknownOperation { name: String },

    /// Failure raised inside the worker, with its original kind and message.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Worker connection lost: {message}")]
    WorkerLost { message: String },

    #[error("Failed to spawn worker {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ProxyError {
    /// The remote error, if this failure came from the worker.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ProxyError::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Kind of the remote error, if any.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        self.remote().map(|e| e.kind)
    }

    /// Check if this error means the worker can no longer serve calls.
    pub fn is_worker_gone(&self) -> bool {
        matches!(self, ProxyError::Unavailable | ProxyError::WorkerLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::new(ErrorKind::OutOfRange, "address 0x1000 is outside flash");
        assert_eq!(err.to_string(), "out_of_range: address 0x1000 is outside flash");
    }

    #[test]
    fn test_remote_error_serialization_keeps_identity() {
        let err = RemoteError::new(ErrorKind::Protected, "readback protection enabled").with_code(-90);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"protected\""));

        let parsed: RemoteError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_remote_error_without_code_omits_field() {
        let err = RemoteError::invalid_argument("missing argument 'addr'");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("code"));
    }

    #[test]
    fn test_from_panic_payloads() {
        let static_str: Box<dyn std::any::Any + Send> = Box::new("attempt to divide by zero");
        let err = RemoteError::from_panic(static_str.as_ref());
        assert_eq!(err.kind, ErrorKind::Panic);
        assert_eq!(err.message, "attempt to divide by zero");

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(RemoteError::from_panic(owned.as_ref()).message, "boom");

        let other: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert!(RemoteError::from_panic(other.as_ref()).message.contains("non-string"));
    }

    #[test]
    fn test_proxy_error_remote_accessors() {
        let err = ProxyError::from(RemoteError::new(ErrorKind::NotConnected, "no probe"));
        assert_eq!(err.remote_kind(), Some(ErrorKind::NotConnected));
        assert_eq!(err.to_string(), "not_connected: no probe");
        assert!(!err.is_worker_gone());
        assert!(ProxyError::Unavailable.is_worker_gone());
        assert!(ProxyError::Unavailable.remote().is_none());
    }
}
