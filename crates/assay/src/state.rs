//! Serializable snapshots of the test tree and the observer list they are
//! pushed to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::ErrorReport;
use crate::result::TestResult;
use crate::tree::{Entry, NodeId, NodeStatus, TestId, TestOptions, TestStatus, Tree};

/// Whole-run snapshot. Callables are omitted; hooks are reduced to their
/// error lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTestingTree {
    pub identifier: String,
    pub status: NodeStatus,
    pub tree: StateNode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateNode {
    pub id: NodeId,
    pub name: String,
    pub options: TestOptions,
    pub status: NodeStatus,
    pub tests: Vec<StateTest>,
    pub children: Vec<StateNode>,
    pub before_hooks_errors: Vec<ErrorReport>,
    pub after_hooks_errors: Vec<ErrorReport>,
    pub before_hooks_have_run: bool,
    pub completed: bool,
    /// Interleaving of `tests` and `children` as registered.
    #[serde(skip)]
    slots: Vec<Slot>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Test,
    Child,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTest {
    pub id: TestId,
    pub name: String,
    pub options: TestOptions,
    pub status: TestStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<TestResult>,
    pub after_each_hooks_errors: Vec<ErrorReport>,
}

impl StateTestingTree {
    /// Walk suite names from the root.
    pub fn node(&self, path: &[&str]) -> Option<&StateNode> {
        let mut node = &self.tree;
        for name in path {
            node = node.children.iter().find(|c| c.name == *name)?;
        }
        Some(node)
    }

    /// Every test, depth-first in registration order.
    pub fn tests(&self) -> Vec<&StateTest> {
        fn walk<'a>(node: &'a StateNode, out: &mut Vec<&'a StateTest>) {
            let mut tests = node.tests.iter();
            let mut children = node.children.iter();
            for slot in &node.slots {
                match slot {
                    Slot::Test => out.extend(tests.next()),
                    Slot::Child => {
                        if let Some(child) = children.next() {
                            walk(child, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.tree, &mut out);
        out
    }
}

impl StateNode {
    pub fn test(&self, name: &str) -> Option<&StateTest> {
        self.tests.iter().find(|t| t.name == name)
    }
}

pub(crate) fn snapshot(identifier: &str, status: NodeStatus, tree: &Tree) -> StateTestingTree {
    StateTestingTree {
        identifier: identifier.to_string(),
        status,
        tree: project_node(tree, Tree::ROOT),
    }
}

fn project_node(tree: &Tree, id: NodeId) -> StateNode {
    let node = tree.node(id);
    StateNode {
        id,
        name: node.name.clone(),
        options: node.options.clone(),
        status: node.status,
        tests: node.tests().map(|t| project_test(tree, t)).collect(),
        children: node.children().map(|c| project_node(tree, c)).collect(),
        before_hooks_errors: node.before_hooks_errors.clone(),
        after_hooks_errors: node.after_hooks_errors.clone(),
        before_hooks_have_run: node.before_hooks_have_run,
        completed: node.completed,
        slots: node
            .entries
            .iter()
            .map(|e| match e {
                Entry::Test(_) => Slot::Test,
                Entry::Node(_) => Slot::Child,
            })
            .collect(),
    }
}

fn project_test(tree: &Tree, id: TestId) -> StateTest {
    let test = tree.test(id);
    StateTest {
        id,
        name: test.name.clone(),
        options: test.options.clone(),
        status: test.status,
        started_at: test.started_at,
        ended_at: test.ended_at,
        result: test.result.clone(),
        after_each_hooks_errors: test.after_each_hooks_errors.clone(),
    }
}

pub type Listener = Arc<dyn Fn(&StateTestingTree) + Send + Sync>;

/// Synchronous fan-out to `change` subscribers.
#[derive(Default)]
pub(crate) struct Emitter {
    listeners: Mutex<Vec<Listener>>,
}

impl Emitter {
    pub(crate) fn subscribe(&self, listener: Listener) {
        self.listeners.lock().push(listener);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub(crate) fn emit(&self, state: &StateTestingTree) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(state);
        }
    }
}
