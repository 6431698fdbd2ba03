//! The registered test tree.
//!
//! Nodes and tests live in two arenas owned by [`Tree`]; parent and owner
//! back-references are plain indices. Node 0 is the implicit root that holds
//! top-level tests, suites and hooks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;

use crate::config::serialize_opt_ms;
use crate::error::{ErrorReport, IntoOutcome, Outcome};
use crate::result::TestResult;

/// A test body or hook, type-erased.
pub(crate) type Body = Arc<dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync>;

pub(crate) fn body<F, Fut>(f: F) -> Body
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    Arc::new(move || {
        let fut = f();
        async move { fut.await.into_outcome() }.boxed()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TestId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failure,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Success | TestStatus::Failure | TestStatus::Skipped
        )
    }
}

/// Per-test and per-suite options.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    pub only: bool,
    pub skip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(serialize_with = "serialize_opt_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// Suites take the same option shape as tests.
pub type SuiteOptions = TestOptions;

impl TestOptions {
    pub fn only() -> Self {
        TestOptions {
            only: true,
            ..Default::default()
        }
    }

    pub fn skip(reason: Option<String>) -> Self {
        TestOptions {
            skip: true,
            skip_reason: reason,
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(ms));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Before,
    BeforeEach,
    AfterEach,
    After,
}

#[derive(Default)]
pub(crate) struct Hooks {
    before: Vec<Body>,
    before_each: Vec<Body>,
    after_each: Vec<Body>,
    after: Vec<Body>,
}

impl Hooks {
    pub(crate) fn get(&self, kind: HookKind) -> &[Body] {
        match kind {
            HookKind::Before => &self.before,
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
            HookKind::After => &self.after,
        }
    }

    fn push(&mut self, kind: HookKind, hook: Body) {
        match kind {
            HookKind::Before => self.before.push(hook),
            HookKind::BeforeEach => self.before_each.push(hook),
            HookKind::AfterEach => self.after_each.push(hook),
            HookKind::After => self.after.push(hook),
        }
    }
}

/// Registration-ordered child of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Test(TestId),
    Node(NodeId),
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) options: TestOptions,
    pub(crate) entries: Vec<Entry>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) hooks: Hooks,
    pub(crate) before_hooks_errors: Vec<ErrorReport>,
    pub(crate) after_hooks_errors: Vec<ErrorReport>,
    pub(crate) before_hooks_have_run: bool,
    pub(crate) completed: bool,
    pub(crate) status: NodeStatus,
}

impl Node {
    fn new(name: String, options: TestOptions, parent: Option<NodeId>) -> Self {
        Node {
            name,
            options,
            entries: Vec::new(),
            parent,
            hooks: Hooks::default(),
            before_hooks_errors: Vec::new(),
            after_hooks_errors: Vec::new(),
            before_hooks_have_run: false,
            completed: false,
            status: NodeStatus::Idle,
        }
    }

    pub(crate) fn tests(&self) -> impl Iterator<Item = TestId> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Test(id) => Some(*id),
            Entry::Node(_) => None,
        })
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Node(id) => Some(*id),
            Entry::Test(_) => None,
        })
    }
}

pub(crate) struct Test {
    pub(crate) name: String,
    pub(crate) body: Body,
    pub(crate) options: TestOptions,
    pub(crate) node: NodeId,
    pub(crate) status: TestStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) result: Option<TestResult>,
    pub(crate) after_each_hooks_errors: Vec<ErrorReport>,
}

pub(crate) struct Tree {
    nodes: Vec<Node>,
    tests: Vec<Test>,
}

impl Tree {
    pub(crate) const ROOT: NodeId = NodeId(0);

    pub(crate) fn new() -> Self {
        Tree {
            nodes: vec![Node::new(String::new(), TestOptions::default(), None)],
            tests: Vec::new(),
        }
    }

    pub(crate) fn add_node(&mut self, parent: NodeId, name: String, options: TestOptions) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, options, Some(parent)));
        self.nodes[parent.0].entries.push(Entry::Node(id));
        id
    }

    pub(crate) fn add_test(&mut self, node: NodeId, name: String, body: Body, options: TestOptions) -> TestId {
        let id = TestId(self.tests.len());
        self.tests.push(Test {
            name,
            body,
            options,
            node,
            status: TestStatus::Idle,
            started_at: None,
            ended_at: None,
            result: None,
            after_each_hooks_errors: Vec::new(),
        });
        self.nodes[node.0].entries.push(Entry::Test(id));
        id
    }

    pub(crate) fn add_hook(&mut self, node: NodeId, kind: HookKind, hook: Body) {
        self.nodes[node.0].hooks.push(kind, hook);
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn test(&self, id: TestId) -> &Test {
        &self.tests[id.0]
    }

    pub(crate) fn test_mut(&mut self, id: TestId) -> &mut Test {
        &mut self.tests[id.0]
    }

    /// `node` and its ancestors, root first.
    pub(crate) fn lineage(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut current = self.node(node).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).parent;
        }
        chain.reverse();
        chain
    }

    /// Suite names then the test name, root excluded.
    pub(crate) fn path(&self, test: TestId) -> Vec<String> {
        let test = self.test(test);
        let mut path: Vec<String> = self
            .lineage(test.node)
            .into_iter()
            .filter(|id| *id != Self::ROOT)
            .map(|id| self.node(id).name.clone())
            .collect();
        path.push(test.name.clone());
        path
    }

    /// Every test in depth-first registration order.
    pub(crate) fn tests_in_order(&self) -> Vec<TestId> {
        let mut out = Vec::with_capacity(self.tests.len());
        self.collect_tests(Self::ROOT, &mut out);
        out
    }

    pub(crate) fn subtree_tests(&self, node: NodeId) -> Vec<TestId> {
        let mut out = Vec::new();
        self.collect_tests(node, &mut out);
        out
    }

    fn collect_tests(&self, node: NodeId, out: &mut Vec<TestId>) {
        for entry in &self.node(node).entries {
            match entry {
                Entry::Test(id) => out.push(*id),
                Entry::Node(child) => self.collect_tests(*child, out),
            }
        }
    }

    /// Every node, children before parents.
    pub(crate) fn nodes_post_order(&self) -> Vec<NodeId> {
        fn walk(tree: &Tree, node: NodeId, out: &mut Vec<NodeId>) {
            for child in tree.node(node).children() {
                walk(tree, child, out);
            }
            out.push(node);
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        walk(self, Self::ROOT, &mut out);
        out
    }

    /// Own option, else nearest ancestor's, else `default`.
    pub(crate) fn effective_timeout(&self, test: TestId, default: Duration) -> Duration {
        let test = self.test(test);
        if let Some(timeout) = test.options.timeout {
            return timeout;
        }
        self.lineage(test.node)
            .into_iter()
            .rev()
            .find_map(|id| self.node(id).options.timeout)
            .unwrap_or(default)
    }

    /// Status derived from the tests below `node`.
    pub(crate) fn derive_status(&self, node: NodeId) -> NodeStatus {
        let tests = self.subtree_tests(node);
        if tests
            .iter()
            .any(|id| self.test(*id).status == TestStatus::Failure)
        {
            return NodeStatus::Failure;
        }
        if tests
            .iter()
            .all(|id| matches!(self.test(*id).status, TestStatus::Success | TestStatus::Skipped))
        {
            return NodeStatus::Success;
        }
        if tests
            .iter()
            .any(|id| self.test(*id).status != TestStatus::Idle)
            || self.node(node).before_hooks_have_run
        {
            NodeStatus::Running
        } else {
            NodeStatus::Idle
        }
    }

    /// Clear everything a previous run left behind. Registration is kept.
    pub(crate) fn reset_run_state(&mut self) {
        for node in &mut self.nodes {
            node.before_hooks_errors.clear();
            node.after_hooks_errors.clear();
            node.before_hooks_have_run = false;
            node.completed = false;
            node.status = NodeStatus::Idle;
        }
        for test in &mut self.tests {
            test.status = TestStatus::Idle;
            test.started_at = None;
            test.ended_at = None;
            test.result = None;
            test.after_each_hooks_errors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Body {
        body(|| async {})
    }

    #[test]
    fn test_registration_order_is_depth_first() {
        let mut tree = Tree::new();
        let a = tree.add_node(Tree::ROOT, "a".into(), TestOptions::default());
        let t1 = tree.add_test(a, "t1".into(), noop(), TestOptions::default());
        let b = tree.add_node(a, "b".into(), TestOptions::default());
        let t2 = tree.add_test(b, "t2".into(), noop(), TestOptions::default());
        let t3 = tree.add_test(a, "t3".into(), noop(), TestOptions::default());
        let t0 = tree.add_test(Tree::ROOT, "t0".into(), noop(), TestOptions::default());

        assert_eq!(tree.tests_in_order(), vec![t1, t2, t3, t0]);
        assert_eq!(tree.path(t2), vec!["a", "b", "t2"]);
        assert_eq!(tree.path(t0), vec!["t0"]);
        assert_eq!(tree.lineage(b), vec![Tree::ROOT, a, b]);
        assert_eq!(tree.nodes_post_order(), vec![b, a, Tree::ROOT]);
    }

    #[test]
    fn test_effective_timeout_prefers_closest() {
        let mut tree = Tree::new();
        let outer = tree.add_node(Tree::ROOT, "outer".into(), TestOptions::default().with_timeout_ms(100));
        let inner = tree.add_node(outer, "inner".into(), TestOptions::default().with_timeout_ms(50));
        let a = tree.add_test(inner, "a".into(), noop(), TestOptions::default());
        let b = tree.add_test(inner, "b".into(), noop(), TestOptions::default().with_timeout_ms(10));
        let c = tree.add_test(Tree::ROOT, "c".into(), noop(), TestOptions::default());

        let default = Duration::from_millis(5000);
        assert_eq!(tree.effective_timeout(a, default), Duration::from_millis(50));
        assert_eq!(tree.effective_timeout(b, default), Duration::from_millis(10));
        assert_eq!(tree.effective_timeout(c, default), default);
    }

    #[test]
    fn test_derive_status() {
        let mut tree = Tree::new();
        let suite = tree.add_node(Tree::ROOT, "s".into(), TestOptions::default());
        let a = tree.add_test(suite, "a".into(), noop(), TestOptions::default());
        let b = tree.add_test(suite, "b".into(), noop(), TestOptions::default());

        assert_eq!(tree.derive_status(suite), NodeStatus::Idle);
        tree.test_mut(a).status = TestStatus::Success;
        assert_eq!(tree.derive_status(suite), NodeStatus::Running);
        tree.test_mut(b).status = TestStatus::Skipped;
        assert_eq!(tree.derive_status(suite), NodeStatus::Success);
        tree.test_mut(b).status = TestStatus::Failure;
        assert_eq!(tree.derive_status(Tree::ROOT), NodeStatus::Failure);
    }
}
