//! Assertion layer: `expect(value).to_equal(...)` and friends.
//!
//! Every operation returns an [`Outcome`] so test bodies can use `?`.
//! Failure messages are templates; `{{not}}` expands to `"not "` when the
//! expectation was negated.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::Regex;

use crate::diff::{diff, diff_with, DiffOptions, DiffResult};
use crate::error::{AssertionError, Outcome};
use crate::matcher;
use crate::mock::{CallResult, MockFunction};
use crate::value::Value;

/// Wrap a value for assertions.
pub fn expect(actual: impl Into<Value>) -> Expect {
    Expect {
        actual: actual.into(),
        negated: false,
    }
}

/// Wrap a fallible future for settle-state assertions.
pub fn expect_future<F>(future: F) -> ExpectFuture<F>
where
    F: Future<Output = Result<Value, Value>>,
{
    ExpectFuture {
        future,
        negated: false,
    }
}

/// What a thrown value must look like for [`Expect::to_throw_with`].
#[derive(Debug, Clone)]
pub enum ThrowMatch {
    /// The thrown message contains this text.
    Message(String),
    /// The thrown message matches this pattern.
    Pattern(Regex),
    /// The thrown value is structurally equal to this value.
    Error(Value),
}

impl ThrowMatch {
    fn matches(&self, thrown: &Value) -> bool {
        match self {
            ThrowMatch::Message(text) => thrown.message().contains(text.as_str()),
            ThrowMatch::Pattern(re) => re.is_match(&thrown.message()),
            ThrowMatch::Error(expected) => diff(expected, thrown).same(),
        }
    }

    fn expected(&self) -> Value {
        match self {
            ThrowMatch::Message(text) => Value::from(text.as_str()),
            ThrowMatch::Pattern(re) => Value::from(format!("/{}/", re.as_str())),
            ThrowMatch::Error(expected) => expected.clone(),
        }
    }
}

/// What a string must contain for [`Expect::to_match`].
#[derive(Debug, Clone)]
pub enum TextMatch {
    Substring(String),
    Pattern(Regex),
}

impl TextMatch {
    fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Substring(needle) => text.contains(needle.as_str()),
            TextMatch::Pattern(re) => re.is_match(text),
        }
    }

    fn expected(&self) -> Value {
        match self {
            TextMatch::Substring(needle) => Value::from(needle.as_str()),
            TextMatch::Pattern(re) => Value::from(format!("/{}/", re.as_str())),
        }
    }
}

impl From<&str> for TextMatch {
    fn from(needle: &str) -> Self {
        TextMatch::Substring(needle.to_string())
    }
}

impl From<String> for TextMatch {
    fn from(needle: String) -> Self {
        TextMatch::Substring(needle)
    }
}

impl From<Regex> for TextMatch {
    fn from(re: Regex) -> Self {
        TextMatch::Pattern(re)
    }
}

impl From<&Regex> for TextMatch {
    fn from(re: &Regex) -> Self {
        TextMatch::Pattern(re.clone())
    }
}

pub struct Expect {
    actual: Value,
    negated: bool,
}

impl Expect {
    /// Flip the expectation. Applies to the next (and only) operation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn actual(&self) -> &Value {
        &self.actual
    }

    fn check(&self, pass: bool, template: &str, expected: Option<Value>) -> Outcome {
        self.check_diff(pass, template, expected, None)
    }

    fn check_diff(
        &self,
        pass: bool,
        template: &str,
        expected: Option<Value>,
        difference: Option<DiffResult>,
    ) -> Outcome {
        if pass != self.negated {
            return Ok(());
        }

        let mut err = AssertionError::new(template)
            .with_local("not", if self.negated { "not " } else { "" })
            .with_actual(self.actual.clone());
        if let Some(expected) = expected {
            err = err.with_expected(expected);
        }
        if let (Some(difference), false) = (difference, self.negated) {
            err = err.with_difference(difference);
        }
        Err(err)
    }

    fn number(&self) -> Result<f64, AssertionError> {
        self.actual.as_number().ok_or_else(|| {
            AssertionError::type_error("Expected {{actual}} to be a number")
                .with_actual(self.actual.clone())
        })
    }

    fn mock(&self) -> Result<MockFunction, AssertionError> {
        self.actual
            .as_function()
            .and_then(|f| f.mock())
            .cloned()
            .ok_or_else(|| {
                AssertionError::type_error("Expected {{actual}} to be a mock function")
                    .with_actual(self.actual.clone())
            })
    }

    // ---- Equality ------------------------------------------------------------

    /// Identity: same primitive value or same container handle.
    pub fn to_be(self, expected: impl Into<Value>) -> Outcome {
        let expected = expected.into();
        let pass = self.actual.is_identical(&expected);
        self.check(pass, "Expected {{actual}} {{not}}to be {{expected}}", Some(expected))
    }

    /// Deep structural equality. Matchers may appear anywhere in `expected`.
    pub fn to_equal(self, expected: impl Into<Value>) -> Outcome {
        let expected = expected.into();
        let difference = diff(&expected, &self.actual);
        self.check_diff(
            difference.same(),
            "Expected {{actual}} {{not}}to equal {{expected}}",
            Some(expected),
            Some(difference),
        )
    }

    /// Like [`to_equal`](Self::to_equal) but extra keys on the actual side are
    /// ignored.
    pub fn to_match_object(self, expected: impl Into<Value>) -> Outcome {
        let expected = expected.into();
        let difference = diff_with(
            &expected,
            &self.actual,
            DiffOptions {
                ignore_extra_keys: true,
            },
        );
        self.check_diff(
            difference.same(),
            "Expected {{actual}} {{not}}to match object {{expected}}",
            Some(expected),
            Some(difference),
        )
    }

    // ---- Predicates ----------------------------------------------------------

    pub fn to_be_truthy(self) -> Outcome {
        let pass = self.actual.is_truthy();
        self.check(pass, "Expected {{actual}} {{not}}to be truthy", None)
    }

    pub fn to_be_falsy(self) -> Outcome {
        let pass = !self.actual.is_truthy();
        self.check(pass, "Expected {{actual}} {{not}}to be falsy", None)
    }

    pub fn to_be_null(self) -> Outcome {
        let pass = self.actual.is_null();
        self.check(pass, "Expected {{actual}} {{not}}to be null", Some(Value::Null))
    }

    pub fn to_be_undefined(self) -> Outcome {
        let pass = self.actual.is_undefined();
        self.check(pass, "Expected {{actual}} {{not}}to be undefined", Some(Value::Undefined))
    }

    pub fn to_be_defined(self) -> Outcome {
        let pass = !self.actual.is_undefined();
        self.check(pass, "Expected {{actual}} {{not}}to be defined", None)
    }

    pub fn to_be_nan(self) -> Outcome {
        let pass = self.actual.as_number().is_some_and(f64::is_nan);
        self.check(pass, "Expected {{actual}} {{not}}to be NaN", None)
    }

    // ---- Ordering ------------------------------------------------------------

    fn compare(self, expected: Value, verb: &str, op: fn(f64, f64) -> bool) -> Outcome {
        let actual = self.number()?;
        let Some(operand) = expected.as_number() else {
            return Err(AssertionError::type_error("Expected {{expected}} to be a number")
                .with_expected(expected));
        };
        let template = format!("Expected {{{{actual}}}} {{{{not}}}}to be {verb} {{{{expected}}}}");
        self.check(op(actual, operand), &template, Some(expected))
    }

    pub fn to_be_greater_than(self, expected: impl Into<Value>) -> Outcome {
        self.compare(expected.into(), "greater than", |a, b| a > b)
    }

    pub fn to_be_greater_than_or_equal(self, expected: impl Into<Value>) -> Outcome {
        self.compare(expected.into(), "greater than or equal to", |a, b| a >= b)
    }

    pub fn to_be_less_than(self, expected: impl Into<Value>) -> Outcome {
        self.compare(expected.into(), "less than", |a, b| a < b)
    }

    pub fn to_be_less_than_or_equal(self, expected: impl Into<Value>) -> Outcome {
        self.compare(expected.into(), "less than or equal to", |a, b| a <= b)
    }

    /// Numeric closeness to `digits` decimal places.
    pub fn to_be_close_to(self, expected: f64, digits: i32) -> Outcome {
        let actual = self.number()?;
        let pass = matcher::close_to(actual, expected, digits);
        self.check(
            pass,
            "Expected {{actual}} {{not}}to be close to {{expected}} ({{digits}} digits)",
            Some(Value::from(expected)),
        )
        .map_err(|e| e.with_local("digits", digits))
    }

    // ---- Containment ---------------------------------------------------------

    /// Substring for strings, identity membership for sequences.
    pub fn to_contain(self, item: impl Into<Value>) -> Outcome {
        let item = item.into();
        let pass = match (&self.actual, &item) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), _) => items.to_vec().iter().any(|v| v.is_identical(&item)),
            _ => {
                return Err(AssertionError::type_error(
                    "Expected {{actual}} to be a string or a sequence",
                )
                .with_actual(self.actual.clone()))
            }
        };
        self.check(pass, "Expected {{actual}} {{not}}to contain {{expected}}", Some(item))
    }

    /// Structural membership for sequences.
    pub fn to_contain_equal(self, item: impl Into<Value>) -> Outcome {
        let item = item.into();
        let Some(items) = self.actual.as_array() else {
            return Err(AssertionError::type_error("Expected {{actual}} to be a sequence")
                .with_actual(self.actual.clone()));
        };
        let pass = items.to_vec().iter().any(|v| diff(&item, v).same());
        self.check(pass, "Expected {{actual}} {{not}}to contain equal {{expected}}", Some(item))
    }

    pub fn to_have_length(self, length: usize) -> Outcome {
        let actual_len = match &self.actual {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => match o.get("length").and_then(|v| v.as_number()) {
                Some(n) => n as usize,
                None => {
                    return Err(AssertionError::type_error("Expected {{actual}} to have a length")
                        .with_actual(self.actual.clone()))
                }
            },
            _ => {
                return Err(AssertionError::type_error("Expected {{actual}} to have a length")
                    .with_actual(self.actual.clone()))
            }
        };
        self.check(
            actual_len == length,
            "Expected {{actual}} {{not}}to have length {{expected}} (found {{found}})",
            Some(Value::from(length)),
        )
        .map_err(|e| e.with_local("found", actual_len))
    }

    // ---- Properties ----------------------------------------------------------

    /// A value exists at the dot-separated `path`.
    pub fn to_have_property(self, path: &str) -> Outcome {
        let pass = lookup_path(&self.actual, path).is_some();
        self.check(pass, "Expected {{actual}} {{not}}to have property {{path}}", None)
            .map_err(|e| e.with_local("path", path))
    }

    /// A value exists at `path` and structurally equals `expected`.
    pub fn to_have_property_value(self, path: &str, expected: impl Into<Value>) -> Outcome {
        let expected = expected.into();
        let (pass, difference) = match lookup_path(&self.actual, path) {
            Some(found) => {
                let d = diff(&expected, &found);
                (d.same(), Some(d))
            }
            None => (false, None),
        };
        self.check_diff(
            pass,
            "Expected {{actual}} {{not}}to have property {{path}} equal to {{expected}}",
            Some(expected),
            difference,
        )
        .map_err(|e| e.with_local("path", path))
    }

    // ---- Strings -------------------------------------------------------------

    /// A regex or a plain substring.
    pub fn to_match(self, pattern: impl Into<TextMatch>) -> Outcome {
        let pattern = pattern.into();
        let Some(text) = self.actual.as_str() else {
            return Err(AssertionError::type_error("Expected {{actual}} to be a string")
                .with_actual(self.actual.clone()));
        };
        let pass = pattern.matches(text);
        self.check(
            pass,
            "Expected {{actual}} {{not}}to match {{expected}}",
            Some(pattern.expected()),
        )
    }

    // ---- Exceptions ----------------------------------------------------------

    /// Invoke the wrapped zero-argument callable and expect it to throw.
    pub fn to_throw(self) -> Outcome {
        self.throw_check(None)
    }

    pub fn to_throw_with(self, expected: ThrowMatch) -> Outcome {
        self.throw_check(Some(expected))
    }

    fn throw_check(self, expected: Option<ThrowMatch>) -> Outcome {
        let Some(function) = self.actual.as_function() else {
            return Err(AssertionError::type_error("Expected {{actual}} to be a function")
                .with_actual(self.actual.clone()));
        };

        let thrown = match catch_unwind(AssertUnwindSafe(|| function.call(&Value::Undefined, &[]))) {
            Ok(Ok(_)) => None,
            Ok(Err(thrown)) => Some(thrown),
            Err(payload) => Some(Value::error(crate::error::panic_message(payload.as_ref()))),
        };

        let pass = match (&thrown, &expected) {
            (Some(thrown), Some(expected)) => expected.matches(thrown),
            (Some(_), None) => true,
            (None, _) => false,
        };

        if pass == self.negated {
            let template = if expected.is_some() {
                "Expected function {{not}}to throw {{expected}}"
            } else {
                "Expected function {{not}}to throw"
            };
            let mut err = AssertionError::new(template)
                .with_local("not", if self.negated { "not " } else { "" })
                .with_actual(thrown.unwrap_or(Value::Undefined));
            if let Some(expected) = expected {
                err = err.with_expected(expected.expected());
            }
            return Err(err);
        }
        Ok(())
    }

    // ---- Mocks ---------------------------------------------------------------

    pub fn to_have_been_called(self) -> Outcome {
        let count = self.mock()?.call_count();
        self.check(count > 0, "Expected mock {{not}}to have been called", None)
            .map_err(|e| e.with_actual(count))
    }

    pub fn to_have_been_called_times(self, times: usize) -> Outcome {
        let count = self.mock()?.call_count();
        self.check(
            count == times,
            "Expected mock {{not}}to have been called {{expected}} times, but it was called {{actual}} times",
            Some(Value::from(times)),
        )
        .map_err(|e| e.with_actual(count))
    }

    /// Some recorded call's arguments structurally equal `args`.
    pub fn to_have_been_called_with<V: Into<Value>>(self, args: impl IntoIterator<Item = V>) -> Outcome {
        let mock = self.mock()?;
        let expected = Value::array(args);
        let calls = mock.calls();
        let pass = calls
            .iter()
            .any(|call| diff(&expected, &Value::array(call.args.clone())).same());
        self.check(
            pass,
            "Expected mock {{not}}to have been called with {{expected}}",
            Some(expected),
        )
        .map_err(|e| e.with_actual(recorded_args(&mock)))
    }

    pub fn to_have_been_last_called_with<V: Into<Value>>(
        self,
        args: impl IntoIterator<Item = V>,
    ) -> Outcome {
        let mock = self.mock()?;
        let expected = Value::array(args);
        let last = mock
            .last_call()
            .map(|call| Value::array(call.args))
            .unwrap_or(Value::Undefined);
        let difference = diff(&expected, &last);
        self.check_diff(
            difference.same(),
            "Expected mock {{not}}to have been last called with {{expected}}",
            Some(expected),
            Some(difference),
        )
        .map_err(|e| e.with_actual(last))
    }

    /// Some recorded call returned (not threw) a value structurally equal to `value`.
    pub fn to_have_returned_with(self, value: impl Into<Value>) -> Outcome {
        let mock = self.mock()?;
        let expected = value.into();
        let pass = mock.calls().iter().any(|call| match &call.result {
            CallResult::Return(v) => diff(&expected, v).same(),
            CallResult::Throw(_) | CallResult::Incomplete => false,
        });
        self.check(
            pass,
            "Expected mock {{not}}to have returned {{expected}}",
            Some(expected),
        )
    }
}

fn recorded_args(mock: &MockFunction) -> Value {
    Value::array(mock.calls().into_iter().map(|call| Value::array(call.args)))
}

/// Walk a dot-separated path. Sequences accept numeric segments.
fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root.clone();
    for segment in path.split('.') {
        current = match &current {
            Value::Object(o) => o.get(segment)?,
            Value::Array(a) => a.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ============================================================================
// Futures
// ============================================================================

/// Assertions over how a future settles.
pub struct ExpectFuture<F> {
    future: F,
    negated: bool,
}

impl<F> ExpectFuture<F>
where
    F: Future<Output = Result<Value, Value>>,
{
    #[allow(clippy::should_implement_trait)]
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub async fn to_resolve(self) -> Outcome {
        self.settle(true, None).await
    }

    pub async fn to_resolve_with(self, expected: impl Into<Value>) -> Outcome {
        self.settle(true, Some(expected.into())).await
    }

    pub async fn to_reject(self) -> Outcome {
        self.settle(false, None).await
    }

    pub async fn to_reject_with(self, expected: impl Into<Value>) -> Outcome {
        self.settle(false, Some(expected.into())).await
    }

    async fn settle(self, want_resolve: bool, expected: Option<Value>) -> Outcome {
        let negated = self.negated;
        let settled = self.future.await;

        let (resolved, value) = match settled {
            Ok(v) => (true, v),
            Err(v) => (false, v),
        };
        let pass = resolved == want_resolve
            && expected
                .as_ref()
                .map_or(true, |expected| diff(expected, &value).same());

        if pass != negated {
            return Ok(());
        }

        let verb = if want_resolve { "resolve" } else { "reject" };
        let template = if expected.is_some() {
            format!("Expected future {{{{not}}}}to {verb} with {{{{expected}}}}, but it {{{{settled}}}} with {{{{actual}}}}")
        } else {
            format!("Expected future {{{{not}}}}to {verb}, but it {{{{settled}}}} with {{{{actual}}}}")
        };

        let mut err = AssertionError::new(template)
            .with_local("not", if negated { "not " } else { "" })
            .with_local("settled", if resolved { "resolved" } else { "rejected" })
            .with_actual(value);
        if let Some(expected) = expected {
            err = err.with_expected(expected);
        }
        Err(err)
    }
}
