//! Error types: the structured assertion failure carried through test
//! results, and the registration/run errors returned to callers.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::diff::DiffResult;
use crate::value::{Kind, Value};

/// What a test body or hook produces.
pub type Outcome = Result<(), AssertionError>;

/// Return types accepted from test bodies and hooks: `()` or
/// `Result<(), E>` for any error convertible into an [`AssertionError`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Ok(())
    }
}

impl<E: Into<AssertionError>> IntoOutcome for Result<(), E> {
    fn into_outcome(self) -> Outcome {
        self.map_err(Into::into)
    }
}

/// Misuse of the engine surface. Returned synchronously to the caller.
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("cannot spy on `{property}`: property does not exist on the target object")]
    MissingProperty { property: String },

    #[error("cannot spy on `{property}`: expected a function, found {kind}")]
    NotCallable { property: String, kind: Kind },

    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error("unknown run order `{0}` (expected `sequence`, `random` or `parallel`)")]
    InvalidRunOrder(String),

    #[error("failed to start test runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// A failed expectation.
///
/// `message` is a template: `{{name}}` placeholders are filled from `locals`,
/// and `{{expected}}` / `{{actual}}` fall back to the rendered values.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionError {
    pub message: String,
    pub locals: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<DiffResult>,
}

impl AssertionError {
    pub fn new(message: impl Into<String>) -> Self {
        AssertionError {
            message: message.into(),
            locals: BTreeMap::new(),
            expected: None,
            actual: None,
            difference: None,
        }
    }

    pub fn with_local(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.locals.insert(key.into(), value.to_string());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_difference(mut self, difference: DiffResult) -> Self {
        self.difference = Some(difference);
        self
    }

    /// The per-test timeout failure.
    pub fn timeout(timeout_ms: u64) -> Self {
        AssertionError::new("Test timed out after {{timeout}}ms")
            .with_local("timeout", timeout_ms)
            .with_expected(timeout_ms)
    }

    /// Failure assigned to every test below a suite whose `before` hooks failed.
    pub fn before_hooks_failed() -> Self {
        AssertionError::new("Can not run if before hooks fail")
            .with_expected("Before hooks to not fail")
            .with_actual("Before hooks failed")
    }

    /// Re-label a `before_each` hook error as the failure of the test it guarded.
    pub fn into_before_each_failure(self) -> Self {
        self.with_expected("BeforeEach hook to not fail")
            .with_actual("BeforeEach hook failed")
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        AssertionError::new(format!("TypeError: {}", message.into()))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        AssertionError::new(panic_message(payload.as_ref()))
    }

    /// Message with placeholders substituted.
    pub fn local_message(&self) -> String {
        let mut out = String::with_capacity(self.message.len());
        let mut rest = self.message.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                return out;
            };
            let key = after[..end].trim();
            match self.lookup(key) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&rest[start..start + 2 + end + 2]),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        out
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(local) = self.locals.get(key) {
            return Some(local.clone());
        }
        match key {
            "expected" => self.expected.as_ref().map(ToString::to_string),
            "actual" => self.actual.as_ref().map(ToString::to_string),
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.local_message())
    }
}

impl std::error::Error for AssertionError {}

impl From<String> for AssertionError {
    fn from(message: String) -> Self {
        AssertionError::new(message)
    }
}

impl From<&str> for AssertionError {
    fn from(message: &str) -> Self {
        AssertionError::new(message)
    }
}

impl From<TesterError> for AssertionError {
    fn from(err: TesterError) -> Self {
        AssertionError::new(err.to_string())
    }
}

/// A thrown [`Value`] caught at a test boundary.
impl From<Value> for AssertionError {
    fn from(thrown: Value) -> Self {
        AssertionError::new(thrown.message()).with_actual(thrown)
    }
}

/// Serializable projection of an [`AssertionError`] stored on results and in
/// hook error lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub local_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<DiffResult>,
}

impl From<&AssertionError> for ErrorReport {
    fn from(err: &AssertionError) -> Self {
        ErrorReport {
            message: err.message.clone(),
            local_message: err.local_message(),
            expected: err.expected.clone(),
            actual: err.actual.clone(),
            difference: err.difference.clone(),
        }
    }
}

impl From<AssertionError> for ErrorReport {
    fn from(err: AssertionError) -> Self {
        ErrorReport::from(&err)
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_message_substitutes_locals_and_values() {
        let err = AssertionError::new("Expected {{actual}} to equal {{expected}} ({{note}})")
            .with_expected(2)
            .with_actual("two")
            .with_local("note", "strict");
        assert_eq!(err.local_message(), r#"Expected "two" to equal 2 (strict)"#);
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let err = AssertionError::new("{{missing}} and {{ unterminated");
        assert_eq!(err.local_message(), "{{missing}} and {{ unterminated");
    }

    #[test]
    fn test_timeout_shape() {
        let err = AssertionError::timeout(50);
        assert_eq!(err.message, "Test timed out after {{timeout}}ms");
        assert_eq!(err.local_message(), "Test timed out after 50ms");
        assert_eq!(err.expected, Some(Value::from(50)));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = AssertionError::before_hooks_failed().report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["localMessage"], "Can not run if before hooks fail");
        assert_eq!(json["expected"], "Before hooks to not fail");
        assert!(json.get("difference").is_none());
    }
}
