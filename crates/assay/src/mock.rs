//! Call-tracking mocks and spies.
//!
//! A [`MockFunction`] is a cheap, cloneable handle: every clone and every
//! [`Value`] produced by [`MockFunction::as_value`] share one call log and one
//! implementation slot.
//!
//! Resolution order for a call:
//! 1. a queued one-shot implementation,
//! 2. the return value of the first scenario whose arguments are structurally
//!    equal to the call's arguments,
//! 3. the default implementation (for spies: the original method),
//! 4. `Value::Undefined`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::diff::diff;
use crate::error::TesterError;
use crate::value::{Function, NativeFn, Object, Value};

/// Outcome of one recorded call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CallResult {
    Return(Value),
    Throw(Value),
    /// The call has not returned yet.
    Incomplete,
}

impl CallResult {
    pub fn value(&self) -> Option<&Value> {
        match self {
            CallResult::Return(v) | CallResult::Throw(v) => Some(v),
            CallResult::Incomplete => None,
        }
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, Serialize)]
pub struct MockCall {
    pub index: usize,
    pub args: Vec<Value>,
    pub result: CallResult,
    #[serde(skip)]
    pub this: Value,
}

struct Scenario {
    args: Value,
    returns: Value,
}

#[derive(Default)]
struct MockState {
    implementation: Option<NativeFn>,
    once: VecDeque<NativeFn>,
    scenarios: Vec<Scenario>,
    calls: Vec<MockCall>,
    /// Survives `reset()`. Spies keep forwarding to the original through it.
    fallback: Option<NativeFn>,
}

struct MockInner {
    name: String,
    state: Mutex<MockState>,
}

/// A synthesized callable that records its invocations.
#[derive(Clone)]
pub struct MockFunction {
    inner: Arc<MockInner>,
}

enum Resolved {
    Run(NativeFn),
    Return(Value),
    Nothing,
}

impl Default for MockFunction {
    fn default() -> Self {
        MockFunction::new()
    }
}

impl MockFunction {
    pub fn new() -> Self {
        MockFunction::named("mockFn")
    }

    pub fn named(name: impl Into<String>) -> Self {
        MockFunction {
            inner: Arc::new(MockInner {
                name: name.into(),
                state: Mutex::new(MockState::default()),
            }),
        }
    }

    fn with_fallback(name: impl Into<String>, fallback: NativeFn) -> Self {
        let mock = MockFunction::named(name);
        mock.inner.state.lock().fallback = Some(fallback);
        mock
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &MockFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A [`Value::Function`] backed by this mock.
    pub fn as_value(&self) -> Value {
        Value::Function(Function::from_mock(self.clone()))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Value> {
        self.call_with_this(&Value::Undefined, args)
    }

    pub fn call_with_this(&self, this: &Value, args: &[Value]) -> Result<Value, Value> {
        let (index, resolved) = {
            let mut state = self.inner.state.lock();
            let index = state.calls.len();
            state.calls.push(MockCall {
                index,
                args: args.to_vec(),
                result: CallResult::Incomplete,
                this: this.clone(),
            });

            let resolved = if let Some(once) = state.once.pop_front() {
                Resolved::Run(once)
            } else if let Some(scenario) = state
                .scenarios
                .iter()
                .find(|s| scenario_matches(&s.args, args))
            {
                Resolved::Return(scenario.returns.clone())
            } else if let Some(f) = state.implementation.clone().or_else(|| state.fallback.clone()) {
                Resolved::Run(f)
            } else {
                Resolved::Nothing
            };
            (index, resolved)
        };

        // The lock is released here so implementations may call back into the mock.
        let result = match resolved {
            Resolved::Run(f) => f(this, args),
            Resolved::Return(v) => Ok(v),
            Resolved::Nothing => Ok(Value::Undefined),
        };

        // A reset during the call drops its record.
        if let Some(call) = self.inner.state.lock().calls.get_mut(index) {
            if matches!(call.result, CallResult::Incomplete) {
                call.result = match &result {
                    Ok(v) => CallResult::Return(v.clone()),
                    Err(e) => CallResult::Throw(e.clone()),
                };
            }
        }

        result
    }

    /// Replace the default implementation.
    pub fn mock_implementation(
        &self,
        f: impl Fn(&Value, &[Value]) -> Result<Value, Value> + Send + Sync + 'static,
    ) -> &Self {
        self.inner.state.lock().implementation = Some(Arc::new(f));
        self
    }

    /// Queue an implementation used for exactly one call.
    pub fn mock_implementation_once(
        &self,
        f: impl Fn(&Value, &[Value]) -> Result<Value, Value> + Send + Sync + 'static,
    ) -> &Self {
        self.inner.state.lock().once.push_back(Arc::new(f));
        self
    }

    pub fn mock_return_value(&self, value: impl Into<Value>) -> &Self {
        let value = value.into();
        self.mock_implementation(move |_, _| Ok(value.clone()))
    }

    pub fn mock_return_value_once(&self, value: impl Into<Value>) -> &Self {
        let value = value.into();
        self.mock_implementation_once(move |_, _| Ok(value.clone()))
    }

    /// Make every call throw `error`.
    pub fn mock_throw(&self, error: impl Into<Value>) -> &Self {
        let error = error.into();
        self.mock_implementation(move |_, _| Err(error.clone()))
    }

    /// Return `returns` whenever the call arguments structurally equal `args`.
    /// Matchers may be used inside `args`.
    pub fn scenario<V: Into<Value>>(
        &self,
        args: impl IntoIterator<Item = V>,
        returns: impl Into<Value>,
    ) -> &Self {
        self.inner.state.lock().scenarios.push(Scenario {
            args: Value::array(args),
            returns: returns.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.state.lock().calls.len()
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.inner.state.lock().calls.last().cloned()
    }

    /// Clear the call log, scenarios and implementations.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.implementation = None;
        state.once.clear();
        state.scenarios.clear();
        state.calls.clear();
    }
}

fn scenario_matches(pattern: &Value, args: &[Value]) -> bool {
    diff(pattern, &Value::array(args.iter().cloned())).same()
}

impl std::fmt::Debug for MockFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFunction")
            .field("name", &self.inner.name)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl From<&MockFunction> for Value {
    fn from(mock: &MockFunction) -> Self {
        mock.as_value()
    }
}

impl From<MockFunction> for Value {
    fn from(mock: MockFunction) -> Self {
        mock.as_value()
    }
}

// ============================================================================
// Spy
// ============================================================================

/// A mock installed in place of a live object's method.
///
/// Calls forward to the original with the caller's receiver until another
/// implementation is configured. [`Spy::restore`] reinstates the original.
pub struct Spy {
    mock: MockFunction,
    target: Object,
    property: String,
    original: Function,
}

/// Replace `target[property]` with a tracking stand-in.
pub fn spy_on(target: &Object, property: &str) -> Result<Spy, TesterError> {
    let original = match target.get(property) {
        Some(Value::Function(f)) => f,
        Some(other) => {
            return Err(TesterError::NotCallable {
                property: property.to_string(),
                kind: other.kind(),
            })
        }
        None => {
            return Err(TesterError::MissingProperty {
                property: property.to_string(),
            })
        }
    };

    let forward = original.clone();
    let mock = MockFunction::with_fallback(
        property,
        Arc::new(move |this: &Value, args: &[Value]| forward.call(this, args)),
    );
    target.set(property, mock.as_value());

    Ok(Spy {
        mock,
        target: target.clone(),
        property: property.to_string(),
        original,
    })
}

impl Spy {
    pub fn mock(&self) -> &MockFunction {
        &self.mock
    }

    pub fn original(&self) -> &Function {
        &self.original
    }

    pub fn restore(&self) {
        self.target
            .set(self.property.clone(), Value::Function(self.original.clone()));
    }
}

impl std::ops::Deref for Spy {
    type Target = MockFunction;

    fn deref(&self) -> &MockFunction {
        &self.mock
    }
}

impl From<&Spy> for Value {
    fn from(spy: &Spy) -> Self {
        spy.mock.as_value()
    }
}
