//! Asymmetric matchers: predicates that stand in for a literal value on the
//! expected side of a comparison.
//!
//! ```rust
//! use assay::matchers;
//! use assay::{diff, Value};
//!
//! let expected = Value::object([("id", matchers::any(assay::Kind::Number))]);
//! let actual = Value::object([("id", 42)]);
//! assert!(diff(&expected, &actual).same());
//! ```

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::diff::diff;
use crate::value::{Kind, Value};

/// The capability the diff engine looks for on the expected side.
pub trait Matcher: fmt::Debug + Send + Sync {
    fn matches(&self, value: &Value) -> bool;

    /// Short human-readable form used in failure messages.
    fn describe(&self) -> String;
}

/// Wrap any matcher into a [`Value`].
pub fn matcher(m: impl Matcher + 'static) -> Value {
    Value::Matcher(Arc::new(m))
}

#[derive(Debug)]
struct Anything;

impl Matcher for Anything {
    fn matches(&self, value: &Value) -> bool {
        !value.kind().is_nullish()
    }

    fn describe(&self) -> String {
        "Anything".into()
    }
}

#[derive(Debug)]
struct Any(Kind);

impl Matcher for Any {
    fn matches(&self, value: &Value) -> bool {
        value.kind() == self.0
    }

    fn describe(&self) -> String {
        format!("Any<{}>", self.0)
    }
}

#[derive(Debug)]
struct StringContaining(String);

impl Matcher for StringContaining {
    fn matches(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| s.contains(&self.0))
    }

    fn describe(&self) -> String {
        format!("StringContaining<{:?}>", self.0)
    }
}

#[derive(Debug)]
struct StringMatching(Regex);

impl Matcher for StringMatching {
    fn matches(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|s| self.0.is_match(s))
    }

    fn describe(&self) -> String {
        format!("StringMatching</{}/>", self.0.as_str())
    }
}

#[derive(Debug)]
struct ArrayContaining(Vec<Value>);

impl Matcher for ArrayContaining {
    fn matches(&self, value: &Value) -> bool {
        let Some(array) = value.as_array() else {
            return false;
        };
        let items = array.to_vec();
        self.0
            .iter()
            .all(|wanted| items.iter().any(|item| diff(wanted, item).same()))
    }

    fn describe(&self) -> String {
        format!("ArrayContaining<{}>", Value::array(self.0.clone()))
    }
}

#[derive(Debug)]
struct ObjectContaining(Vec<(String, Value)>);

impl Matcher for ObjectContaining {
    fn matches(&self, value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        self.0.iter().all(|(key, wanted)| match object.get(key) {
            Some(found) => diff(wanted, &found).same(),
            None => false,
        })
    }

    fn describe(&self) -> String {
        format!("ObjectContaining<{}>", Value::object(self.0.clone()))
    }
}

#[derive(Debug)]
struct CloseTo {
    target: f64,
    digits: i32,
}

impl Matcher for CloseTo {
    fn matches(&self, value: &Value) -> bool {
        value
            .as_number()
            .is_some_and(|n| close_to(n, self.target, self.digits))
    }

    fn describe(&self) -> String {
        format!("CloseTo<{} ({} digits)>", Value::from(self.target), self.digits)
    }
}

#[derive(Debug)]
struct Not(Arc<dyn Matcher>);

impl Matcher for Not {
    fn matches(&self, value: &Value) -> bool {
        !self.0.matches(value)
    }

    fn describe(&self) -> String {
        format!("Not<{}>", self.0.describe())
    }
}

/// `|actual - expected| < 10^-digits / 2`
pub(crate) fn close_to(actual: f64, expected: f64, digits: i32) -> bool {
    if actual == expected {
        return true;
    }
    (actual - expected).abs() < 10f64.powi(-digits) / 2.0
}

/// Matches anything except `null` and `undefined`.
pub fn anything() -> Value {
    matcher(Anything)
}

/// Matches any value of the given kind.
pub fn any(kind: Kind) -> Value {
    matcher(Any(kind))
}

pub fn string_containing(needle: impl Into<String>) -> Value {
    matcher(StringContaining(needle.into()))
}

pub fn string_matching(pattern: Regex) -> Value {
    matcher(StringMatching(pattern))
}

/// Matches a sequence containing every given item (structurally, any order).
pub fn array_containing<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Value {
    matcher(ArrayContaining(items.into_iter().map(Into::into).collect()))
}

/// Matches a keyed map holding at least the given entries.
pub fn object_containing<K: Into<String>, V: Into<Value>>(
    entries: impl IntoIterator<Item = (K, V)>,
) -> Value {
    matcher(ObjectContaining(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    ))
}

pub fn close_to_number(target: f64, digits: i32) -> Value {
    matcher(CloseTo { target, digits })
}

/// Negate a matcher value. Non-matcher values are negated as structural equality.
pub fn not(inner: Value) -> Value {
    match inner {
        Value::Matcher(m) => matcher(Not(m)),
        literal => matcher(Not(Arc::new(Equals(literal)))),
    }
}

#[derive(Debug)]
struct Equals(Value);

impl Matcher for Equals {
    fn matches(&self, value: &Value) -> bool {
        diff(&self.0, value).same()
    }

    fn describe(&self) -> String {
        self.0.to_string()
    }
}
