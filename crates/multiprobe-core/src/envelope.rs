//! Command and acknowledgement envelopes.
//!
//! One [`Command`] goes to the worker per call and exactly one
//! [`Acknowledgement`] comes back. Envelopes are immutable once built.
//!
//! ```text
//! Command         {"operation": "read_u32", "args": [4096], "kwargs": {}}
//! Acknowledgement {"result": 3735928559}
//!                 {"error": {"kind": "protected", ...}, "trace": "..."}
//!                 {}                                     (void)
//! ```

use crate::error::RemoteError;
use crate::target::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request to run one named operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    operation: String,
    #[serde(flatten)]
    arguments: Arguments,
}

impl Command {
    pub fn new(operation: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            operation: operation.into(),
            arguments: Arguments::new(args, kwargs),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

/// Outcome of one command: a result, an error with its trace, or nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    trace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl Acknowledgement {
    /// Acknowledge a completed operation. `None` means it returned no value.
    pub fn success(result: Option<Value>) -> Self {
        Self {
            error: None,
            trace: String::new(),
            result,
        }
    }

    /// Acknowledge a completed operation that returned no value.
    pub fn void() -> Self {
        Self::default()
    }

    pub fn failure(error: RemoteError, trace: impl Into<String>) -> Self {
        Self {
            error: Some(error),
            trace: trace.into(),
            result: None,
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// Diagnostic trace captured by the worker. Empty on success.
    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Consume the envelope. An error takes precedence over any result.
    pub fn into_outcome(self) -> Result<Option<Value>, (RemoteError, String)> {
        match self.error {
            Some(error) => Err((error, self.trace)),
            None => Ok(self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let mut kwargs = Map::new();
        kwargs.insert("control".to_string(), json!(false));
        let cmd = Command::new("write_u32", vec![json!(4096), json!(7)], kwargs);

        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            json!({"operation": "write_u32", "args": [4096, 7], "kwargs": {"control": false}})
        );

        let parsed: Command = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_command_defaults_missing_argument_lists() {
        let parsed: Command = serde_json::from_str(r#"{"operation": "open"}"#).unwrap();
        assert_eq!(parsed.operation(), "open");
        assert!(parsed.arguments().is_empty());
    }

    #[test]
    fn test_void_acknowledgement_is_empty_object() {
        let json = serde_json::to_string(&Acknowledgement::void()).unwrap();
        assert_eq!(json, "{}");
        assert_eq!(Acknowledgement::void().into_outcome().unwrap(), None);
    }

    #[test]
    fn test_success_acknowledgement() {
        let ack = Acknowledgement::success(Some(json!(42)));
        assert!(!ack.is_failure());
        assert_eq!(ack.result(), Some(&json!(42)));
        assert_eq!(ack.into_outcome().unwrap(), Some(json!(42)));
    }

    #[test]
    fn test_failure_acknowledgement_carries_trace() {
        let err = RemoteError::new(ErrorKind::Panic, "attempt to divide by zero");
        let ack = Acknowledgement::failure(err.clone(), "operation: divide");

        let parsed: Acknowledgement =
            serde_json::from_str(&serde_json::to_string(&ack).unwrap()).unwrap();
        assert_eq!(parsed.trace(), "operation: divide");

        let (error, trace) = parsed.into_outcome().unwrap_err();
        assert_eq!(error, err);
        assert_eq!(trace, "operation: divide");
    }
}
