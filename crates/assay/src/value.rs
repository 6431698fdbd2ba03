//! Dynamic values compared by the diff engine, recorded by mocks and carried
//! by assertion failures.
//!
//! Containers are shared handles: cloning a [`Value::Array`] or
//! [`Value::Object`] clones the handle, not the contents, so identity is
//! observable and cyclic graphs can be built.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::matcher::Matcher;
use crate::mock::MockFunction;

/// Signature of a native callable: receiver, arguments, and either a return
/// value or a thrown value.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, Value> + Send + Sync>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
    Function(Function),
    Matcher(Arc<dyn Matcher>),
}

/// Closed classification of a [`Value`], computed once per comparison step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Null,
    Undefined,
    Number,
    String,
    Boolean,
    Sequence,
    KeyedMap,
    Callable,
    Opaque,
}

impl Kind {
    pub fn of(value: &Value) -> Kind {
        match value {
            Value::Undefined => Kind::Undefined,
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Sequence,
            Value::Object(_) => Kind::KeyedMap,
            Value::Function(_) => Kind::Callable,
            Value::Matcher(_) => Kind::Opaque,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, Kind::Sequence | Kind::KeyedMap)
    }

    pub fn is_nullish(self) -> bool {
        matches!(self, Kind::Null | Kind::Undefined)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Undefined => "undefined",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Boolean => "boolean",
            Kind::Sequence => "sequence",
            Kind::KeyedMap => "keyed-map",
            Kind::Callable => "callable",
            Kind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Containers
// ============================================================================

/// Shared, mutable, ordered sequence.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Array(Arc::new(RwLock::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    /// Store at `index`, padding with `Undefined` when writing past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.write();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Snapshot of the current items. Children are handles, so this is cheap.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Array::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

/// Shared, mutable, insertion-ordered keyed map.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<IndexMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.write().shift_remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Invoke the callable stored under `name` with this object as receiver.
    ///
    /// Calling a missing or non-callable property throws an error value.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, Value> {
        match self.get(name) {
            Some(Value::Function(function)) => function.call(&Value::Object(self.clone()), args),
            Some(other) => Err(Value::error(format!("{name} is not a function (got {other})"))),
            None => Err(Value::error(format!("{name} is not a function (got undefined)"))),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<IndexMap<_, _>>();
        Object(Arc::new(RwLock::new(map)))
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A callable value. Either a native closure or a mock stand-in.
#[derive(Clone)]
pub struct Function(Arc<FunctionInner>);

struct FunctionInner {
    name: String,
    body: Callable,
}

enum Callable {
    Native(NativeFn),
    Mock(MockFunction),
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&Value, &[Value]) -> Result<Value, Value> + Send + Sync + 'static,
    ) -> Self {
        Function(Arc::new(FunctionInner {
            name: name.into(),
            body: Callable::Native(Arc::new(body)),
        }))
    }

    pub(crate) fn from_mock(mock: MockFunction) -> Self {
        Function(Arc::new(FunctionInner {
            name: mock.name().to_string(),
            body: Callable::Mock(mock),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, Value> {
        match &self.0.body {
            Callable::Native(f) => f(this, args),
            Callable::Mock(mock) => mock.call_with_this(this, args),
        }
    }

    /// The mock behind this callable, if it is one.
    pub fn mock(&self) -> Option<&MockFunction> {
        match &self.0.body {
            Callable::Mock(mock) => Some(mock),
            Callable::Native(_) => None,
        }
    }

    /// Identity. Two handles onto the same mock are the same function.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self.mock(), other.mock()) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => Arc::ptr_eq(&self.0, &other.0),
        }
    }
}

// ============================================================================
// Value helpers
// ============================================================================

impl Value {
    /// An error-shaped object: `{ name: "Error", message }`.
    pub fn error(message: impl Into<String>) -> Value {
        let object = Object::new();
        object.set("name", "Error");
        object.set("message", message.into());
        Value::Object(object)
    }

    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Value {
        Value::Array(items.into_iter().collect())
    }

    pub fn object<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Value {
        Value::Object(entries.into_iter().collect())
    }

    pub fn function(
        name: impl Into<String>,
        body: impl Fn(&Value, &[Value]) -> Result<Value, Value> + Send + Sync + 'static,
    ) -> Value {
        Value::Function(Function::new(name, body))
    }

    pub fn kind(&self) -> Kind {
        Kind::of(self)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_matcher(&self) -> Option<&dyn Matcher> {
        match self {
            Value::Matcher(m) => Some(m.as_ref()),
            _ => None,
        }
    }

    /// Reference/value identity: primitives by value (NaN is identical to
    /// itself), everything else by handle.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Matcher(a), Value::Matcher(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Message carried by a thrown value: the string itself, or the `message`
    /// property of an error-shaped object.
    pub fn message(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Object(o) => match o.get("message") {
                Some(Value::String(s)) => s,
                _ => self.to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Convert to JSON, replacing back-references with `"[Circular]"`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut stack = Vec::new();
        self.to_json_inner(&mut stack)
    }

    fn to_json_inner(&self, stack: &mut Vec<usize>) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Json::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Json::Number)
                        .unwrap_or_else(|| Json::String(format_number(*n)))
                }
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Array(a) => {
                let addr = a.addr();
                if stack.contains(&addr) {
                    return Json::String("[Circular]".into());
                }
                stack.push(addr);
                let items = a.to_vec().iter().map(|v| v.to_json_inner(stack)).collect();
                stack.pop();
                Json::Array(items)
            }
            Value::Object(o) => {
                let addr = o.addr();
                if stack.contains(&addr) {
                    return Json::String("[Circular]".into());
                }
                stack.push(addr);
                let map = o
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(stack)))
                    .collect();
                stack.pop();
                Json::Object(map)
            }
            Value::Function(f) => Json::String(format!("[Function {}]", f.name())),
            Value::Matcher(m) => Json::String(m.describe()),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, stack: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => {
                let addr = a.addr();
                if stack.contains(&addr) {
                    return f.write_str("[Circular]");
                }
                stack.push(addr);
                f.write_str("[")?;
                for (i, item) in a.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.render(f, stack)?;
                }
                stack.pop();
                f.write_str("]")
            }
            Value::Object(o) => {
                let addr = o.addr();
                if stack.contains(&addr) {
                    return f.write_str("[Circular]");
                }
                stack.push(addr);
                f.write_str("{")?;
                for (i, (key, item)) in o.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    item.render(f, stack)?;
                }
                stack.pop();
                f.write_str("}")
            }
            Value::Function(func) => write!(f, "[Function {}]", func.name()),
            Value::Matcher(m) => f.write_str(&m.describe()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Structural equality, as computed by [`crate::diff::diff`].
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        crate::diff::diff(self, other).same()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ============================================================================
// Conversions
// ============================================================================

macro_rules! from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Undefined)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::array(items),
            Json::Object(map) => Value::object(map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Kind::of(&Value::Null), Kind::Null);
        assert_eq!(Kind::of(&Value::from(1)), Kind::Number);
        assert_eq!(Kind::of(&Value::from(json!([1]))), Kind::Sequence);
        assert_eq!(Kind::of(&Value::from(json!({"a": 1}))), Kind::KeyedMap);
        assert!(Kind::KeyedMap.is_container());
        assert!(!Kind::Callable.is_container());
    }

    #[test]
    fn test_display_renders_nested_values() {
        let value = Value::from(json!({"a": [1, 2.5, "x"], "b": null}));
        assert_eq!(value.to_string(), r#"{"a": [1, 2.5, "x"], "b": null}"#);
    }

    #[test]
    fn test_display_and_json_survive_cycles() {
        let object = Object::new();
        object.set("self", Value::Object(object.clone()));
        let value = Value::Object(object);

        assert_eq!(value.to_string(), r#"{"self": [Circular]}"#);
        assert_eq!(value.to_json(), json!({"self": "[Circular]"}));
    }

    #[test]
    fn test_identity_is_by_handle_for_containers() {
        let a = Value::from(json!([1]));
        let b = Value::from(json!([1]));
        assert!(a.is_identical(&a.clone()));
        assert!(!a.is_identical(&b));
        assert!(Value::from(f64::NAN).is_identical(&Value::from(f64::NAN)));
    }

    #[test]
    fn test_call_method_binds_receiver() {
        let counter = Object::new();
        counter.set("count", 0);
        counter.set(
            "increment",
            Value::function("increment", |this, _args| {
                let this = this.as_object().ok_or_else(|| Value::error("no receiver"))?;
                let next = this.get("count").and_then(|v| v.as_number()).unwrap_or(0.0) + 1.0;
                this.set("count", next);
                Ok(Value::from(next))
            }),
        );

        assert_eq!(counter.call_method("increment", &[]), Ok(Value::from(1)));
        assert_eq!(counter.get("count"), Some(Value::from(1)));
        assert!(counter.call_method("missing", &[]).is_err());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(Value::error("boom").message(), "boom");
        assert_eq!(Value::from("plain").message(), "plain");
    }
}
