//! Target API contract.
//!
//! A Target API is the single-instance object the worker owns. Instead of
//! reflective member lookup, each target declares its operations once in an
//! [`OperationRegistry`]: a map from operation name to a typed handler. The
//! facade only needs the names ([`OperationSet`]); the worker needs the handlers.

mod simulated;

pub use simulated::SimulatedProbe;

use crate::config::ProbeSettings;
use crate::error::RemoteError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// An object whose operations can be driven through the proxy.
pub trait TargetApi: Sized + Send + 'static {
    /// Construct the live instance. Called once, inside the worker.
    fn create(settings: &ProbeSettings) -> Result<Self, RemoteError>;

    /// The complete set of forwardable operations.
    fn registry() -> OperationRegistry<Self>;
}

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(rename = "args", default)]
    positional: Vec<Value>,
    #[serde(rename = "kwargs", default)]
    keyword: Map<String, Value>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>, keyword: Map<String, Value>) -> Self {
        Self { positional, keyword }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keyword(&self) -> &Map<String, Value> {
        &self.keyword
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Look up an argument by position, falling back to its keyword name.
    fn lookup(&self, index: usize, name: &str) -> Result<Option<&Value>, RemoteError> {
        match (self.positional.get(index), self.keyword.get(name)) {
            (Some(_), Some(_)) => Err(RemoteError::invalid_argument(format!(
                "got multiple values for argument '{}'",
                name
            ))),
            (Some(v), None) | (None, Some(v)) => Ok(Some(v)),
            (None, None) => Ok(None),
        }
    }

    /// Read a required argument.
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, RemoteError> {
        match self.lookup(index, name)? {
            Some(value) => decode(value, name),
            None => Err(RemoteError::invalid_argument(format!(
                "missing required argument '{}'",
                name
            ))),
        }
    }

    /// Read an optional argument. JSON `null` counts as absent.
    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, RemoteError> {
        match self.lookup(index, name)? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => decode(value, name).map(Some),
        }
    }

    /// Reject surplus positional arguments.
    pub fn expect_at_most(&self, count: usize) -> Result<(), RemoteError> {
        if self.positional.len() > count {
            return Err(RemoteError::invalid_argument(format!(
                "takes at most {} positional arguments but {} were given",
                count,
                self.positional.len()
            )));
        }
        Ok(())
    }

    /// Check the call against a parameter list: no more positional arguments
    /// than `params`, and no keyword outside it.
    pub fn expect_params(&self, params: &[&str]) -> Result<(), RemoteError> {
        self.expect_at_most(params.len())?;
        if let Some(unexpected) = self.keyword.keys().find(|k| !params.contains(&k.as_str())) {
            return Err(RemoteError::invalid_argument(format!(
                "got an unexpected keyword argument '{}'",
                unexpected
            )));
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(value: &Value, name: &str) -> Result<T, RemoteError> {
    T::deserialize(value).map_err(|e| {
        RemoteError::invalid_argument(format!("invalid value for argument '{}': {}", name, e))
    })
}

type Handler<T> = Box<dyn Fn(&mut T, &Arguments) -> Result<Option<Value>, RemoteError> + Send + Sync>;

/// Name-to-handler table for one Target API type.
pub struct OperationRegistry<T> {
    handlers: BTreeMap<&'static str, Handler<T>>,
}

impl<T> OperationRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register an operation. A later registration under the same name wins.
    pub fn register<F, R>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&mut T, &Arguments) -> Result<R, RemoteError> + Send + Sync + 'static,
        R: Serialize,
    {
        let handler: Handler<T> = Box::new(move |api, args| {
            let value = handler(api, args)?;
            match serde_json::to_value(value) {
                Ok(Value::Null) => Ok(None),
                Ok(v) => Ok(Some(v)),
                Err(e) => Err(RemoteError::new(
                    crate::error::ErrorKind::Other,
                    format!("failed to serialize result of '{}': {}", name, e),
                )),
            }
        });
        self.handlers.insert(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names of every registered operation.
    pub fn names(&self) -> OperationSet {
        OperationSet(self.handlers.keys().map(|n| n.to_string()).collect())
    }

    /// Run the named operation against `api`.
    pub fn invoke(&self, api: &mut T, name: &str, args: &Arguments) -> Result<Option<Value>, RemoteError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| RemoteError::unknown_operation(name))?;
        handler(api, args)
    }
}

impl<T> Default for OperationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for OperationRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The operation names a facade will forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSet(BTreeSet<String>);

impl OperationSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for OperationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        OperationSet(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    struct Counter {
        value: i64,
    }

    fn registry() -> OperationRegistry<Counter> {
        OperationRegistry::new()
            .register("get", |c: &mut Counter, _args: &Arguments| Ok(c.value))
            .register("add", |c: &mut Counter, args: &Arguments| {
                args.expect_at_most(1)?;
                let amount: i64 = args.required(0, "amount")?;
                c.value += amount;
                Ok(())
            })
    }

    fn args(positional: Value, keyword: Value) -> Arguments {
        let positional = positional.as_array().cloned().unwrap_or_default();
        let keyword = keyword.as_object().cloned().unwrap_or_default();
        Arguments::new(positional, keyword)
    }

    #[test]
    fn test_required_positional_then_keyword() {
        let a = args(json!([5]), json!({}));
        assert_eq!(a.required::<u32>(0, "addr").unwrap(), 5);

        let a = args(json!([]), json!({"addr": 7}));
        assert_eq!(a.required::<u32>(0, "addr").unwrap(), 7);
    }

    #[test]
    fn test_required_missing_is_invalid_argument() {
        let err = Arguments::default().required::<u32>(0, "addr").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("addr"));
    }

    #[test]
    fn test_duplicate_argument_rejected() {
        let a = args(json!([1]), json!({"addr": 2}));
        let err = a.required::<u32>(0, "addr").unwrap_err();
        assert!(err.message.contains("multiple values"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let a = args(json!(["not a number"]), json!({}));
        let err = a.required::<u32>(0, "addr").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_optional_treats_null_as_absent() {
        let a = args(json!([null]), json!({}));
        assert_eq!(a.optional::<u32>(0, "speed").unwrap(), None);
        assert_eq!(Arguments::default().optional::<u32>(0, "speed").unwrap(), None);
    }

    #[test]
    fn test_registry_invokes_handlers() {
        let reg = registry();
        let mut counter = Counter { value: 40 };

        let unit = reg.invoke(&mut counter, "add", &args(json!([2]), json!({}))).unwrap();
        assert_eq!(unit, None);
        assert_eq!(
            reg.invoke(&mut counter, "get", &Arguments::default()).unwrap(),
            Some(json!(42))
        );
    }

    #[test]
    fn test_registry_unknown_operation() {
        let reg = registry();
        let mut counter = Counter { value: 0 };
        let err = reg
            .invoke(&mut counter, "reset", &Arguments::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownOperation);
    }

    #[test]
    fn test_registry_rejects_surplus_arguments() {
        let reg = registry();
        let mut counter = Counter { value: 0 };
        let err = reg
            .invoke(&mut counter, "add", &args(json!([1, 2]), json!({})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(counter.value, 0);
    }

    #[test]
    fn test_expect_params_rejects_unknown_keyword() {
        let a = args(json!([0]), json!({"bogus": 1}));
        let err = a.expect_params(&["addr"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("'bogus'"));

        let a = args(json!([]), json!({"addr": 0}));
        assert!(a.expect_params(&["addr"]).is_ok());
    }

    #[test]
    fn test_expect_params_rejects_surplus_positional() {
        let a = args(json!([1, 2, 3]), json!({}));
        assert_eq!(a.expect_params(&[]).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert!(Arguments::default().expect_params(&[]).is_ok());
    }

    #[test]
    fn test_names_match_registrations() {
        let names = registry().names();
        assert_eq!(names.iter().collect::<Vec<_>>(), vec!["add", "get"]);
        assert!(names.contains("get"));
        assert!(!names.contains("reset"));
    }

    #[test]
    fn test_arguments_wire_format() {
        let a = args(json!([1, "x"]), json!({"flag": true}));
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json, json!({"args": [1, "x"], "kwargs": {"flag": true}}));
    }
}
