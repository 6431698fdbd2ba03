//! Structural diff engine.
//!
//! [`diff`] walks two values in lockstep and returns a [`DiffResult`] tree.
//! Cycles are detected per side with identity-keyed maps that only live for
//! the duration of one call: an entry is added when descending into a
//! container and removed on the way back out, so they always describe the
//! current path.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::{Array, Object, Value};

/// Typed difference tree.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiffResult {
    Same {
        value: Value,
    },
    Different {
        expected: Value,
        actual: Value,
    },
    /// Present only on the actual side.
    Added {
        value: Value,
    },
    /// Present only on the expected side.
    Removed {
        value: Value,
    },
    Object {
        keys: IndexMap<String, DiffResult>,
        same: bool,
    },
    Array {
        items: Vec<DiffResult>,
        same: bool,
    },
    /// A back-reference. `path` is where the container was first seen.
    Circular {
        path: Vec<String>,
        same: bool,
    },
}

impl DiffResult {
    pub fn same(&self) -> bool {
        match self {
            DiffResult::Same { .. } => true,
            DiffResult::Different { .. } | DiffResult::Added { .. } | DiffResult::Removed { .. } => {
                false
            }
            DiffResult::Object { same, .. }
            | DiffResult::Array { same, .. }
            | DiffResult::Circular { same, .. } => *same,
        }
    }
}

/// Knobs for [`diff_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Keys only present on the actual side are dropped instead of reported
    /// as `Added`. Sequences are unaffected.
    pub ignore_extra_keys: bool,
}

/// Compare `expected` against `actual`.
pub fn diff(expected: &Value, actual: &Value) -> DiffResult {
    diff_with(expected, actual, DiffOptions::default())
}

pub fn diff_with(expected: &Value, actual: &Value, options: DiffOptions) -> DiffResult {
    let mut differ = Differ {
        options,
        expected_seen: HashMap::new(),
        actual_seen: HashMap::new(),
    };
    differ.compare(expected, actual, &mut Vec::new())
}

struct Differ {
    options: DiffOptions,
    expected_seen: HashMap<usize, Vec<String>>,
    actual_seen: HashMap<usize, Vec<String>>,
}

enum Containers<'a> {
    Arrays(&'a Array, &'a Array),
    Objects(&'a Object, &'a Object),
}

impl Differ {
    fn compare(&mut self, expected: &Value, actual: &Value, path: &mut Vec<String>) -> DiffResult {
        if let Some(matcher) = expected.as_matcher() {
            return if matcher.matches(actual) {
                DiffResult::Same {
                    value: actual.clone(),
                }
            } else {
                different(expected, actual)
            };
        }

        if expected.is_identical(actual) {
            return DiffResult::Same {
                value: actual.clone(),
            };
        }

        let (expected_kind, actual_kind) = (expected.kind(), actual.kind());
        if expected_kind.is_nullish() || actual_kind.is_nullish() || expected_kind != actual_kind {
            return different(expected, actual);
        }

        let containers = match (expected, actual) {
            (Value::Array(e), Value::Array(a)) => Containers::Arrays(e, a),
            (Value::Object(e), Value::Object(a)) => Containers::Objects(e, a),
            _ => return different(expected, actual),
        };

        let (expected_addr, actual_addr) = match containers {
            Containers::Arrays(e, a) => (e.addr(), a.addr()),
            Containers::Objects(e, a) => (e.addr(), a.addr()),
        };

        let seen_expected = self.expected_seen.get(&expected_addr).cloned();
        let seen_actual = self.actual_seen.get(&actual_addr).cloned();
        if seen_expected.is_some() || seen_actual.is_some() {
            let same = seen_expected.is_some() && seen_expected == seen_actual;
            return DiffResult::Circular {
                path: seen_expected.or(seen_actual).unwrap_or_default(),
                same,
            };
        }

        self.expected_seen.insert(expected_addr, path.clone());
        self.actual_seen.insert(actual_addr, path.clone());

        let result = match containers {
            Containers::Arrays(e, a) => self.compare_arrays(e, a, path),
            Containers::Objects(e, a) => self.compare_objects(e, a, path),
        };

        self.expected_seen.remove(&expected_addr);
        self.actual_seen.remove(&actual_addr);
        result
    }

    fn compare_arrays(&mut self, expected: &Array, actual: &Array, path: &mut Vec<String>) -> DiffResult {
        let expected = expected.to_vec();
        let actual = actual.to_vec();
        let len = expected.len().max(actual.len());

        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            let item = match (expected.get(index), actual.get(index)) {
                (Some(e), Some(a)) => {
                    path.push(index.to_string());
                    let item = self.compare(e, a, path);
                    path.pop();
                    item
                }
                (Some(e), None) => DiffResult::Removed { value: e.clone() },
                (None, Some(a)) => DiffResult::Added { value: a.clone() },
                (None, None) => break,
            };
            items.push(item);
        }

        let same = items.iter().all(DiffResult::same);
        DiffResult::Array { items, same }
    }

    fn compare_objects(&mut self, expected: &Object, actual: &Object, path: &mut Vec<String>) -> DiffResult {
        let expected_entries = expected.entries();
        let mut keys = IndexMap::with_capacity(expected_entries.len());

        for (key, e) in &expected_entries {
            let item = match actual.get(key) {
                Some(a) => {
                    path.push(key.clone());
                    let item = self.compare(e, &a, path);
                    path.pop();
                    item
                }
                None => DiffResult::Removed { value: e.clone() },
            };
            keys.insert(key.clone(), item);
        }

        if !self.options.ignore_extra_keys {
            for (key, a) in actual.entries() {
                if !expected.has(&key) {
                    keys.insert(key, DiffResult::Added { value: a });
                }
            }
        }

        let same = keys.values().all(DiffResult::same);
        DiffResult::Object { keys, same }
    }
}

fn different(expected: &Value, actual: &Value) -> DiffResult {
    DiffResult::Different {
        expected: expected.clone(),
        actual: actual.clone(),
    }
}
