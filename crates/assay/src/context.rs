//! Registration API: suites, tests and hooks on a [`Tester`], plus the
//! [`TestBuilder`] decorator handle.

use std::future::Future;
use std::time::Duration;

use crate::error::IntoOutcome;
use crate::result::TestResult;
use crate::table::TableBuilder;
use crate::tester::Tester;
use crate::tree::{body, Body, HookKind, NodeId, NodeStatus, SuiteOptions, TestOptions, Tree};

// ============================================================================
// Registry: the tree plus the active-suite stack
// ============================================================================

pub(crate) struct Registry {
    pub(crate) tree: Tree,
    stack: Vec<NodeId>,
    pub(crate) status: NodeStatus,
    pub(crate) results: Vec<TestResult>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            tree: Tree::new(),
            stack: vec![Tree::ROOT],
            status: NodeStatus::Idle,
            results: Vec::new(),
        }
    }

    pub(crate) fn push_group(&mut self, name: String, options: SuiteOptions) -> NodeId {
        let id = self.tree.add_node(self.current(), name, options);
        self.stack.push(id);
        id
    }

    pub(crate) fn pop_group(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub(crate) fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(Tree::ROOT)
    }

    fn add_hook(&mut self, kind: HookKind, hook: Body) {
        let node = self.current();
        self.tree.add_hook(node, kind, hook);
    }
}

// ============================================================================
// Tester registration surface
// ============================================================================

impl Tester {
    // ---- Describe ------------------------------------------------------------

    /// Register a suite. `body` runs immediately and registers nested suites,
    /// tests and hooks against it.
    pub fn describe(&self, name: &str, body: impl FnOnce(&Tester)) {
        self.describe_with(name, SuiteOptions::default(), body);
    }

    pub fn describe_with(&self, name: &str, options: SuiteOptions, body: impl FnOnce(&Tester)) {
        self.registry.lock().push_group(name.to_string(), options);
        body(self);
        self.registry.lock().pop_group();
    }

    /// Focused suite: once any `only` exists, tests outside focused scopes are skipped.
    pub fn describe_only(&self, name: &str, body: impl FnOnce(&Tester)) {
        self.describe_with(name, SuiteOptions::only(), body);
    }

    pub fn describe_skip(&self, name: &str, body: impl FnOnce(&Tester)) {
        self.describe_with(name, SuiteOptions::skip(None), body);
    }

    // ---- Test ----------------------------------------------------------------

    /// Register a test on the active suite. Returns a [`TestBuilder`] for
    /// optional decorators; the test is registered when it drops.
    ///
    /// ```rust,no_run
    /// # use assay::{expect, Tester};
    /// let tester = Tester::default();
    /// tester.test("adds", || async { expect(1 + 1).to_be(2) });
    /// tester.test("slow", || async {}).timeout(50);
    /// ```
    pub fn test<F, Fut>(&self, name: &str, f: F) -> TestBuilder<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        TestBuilder::new(self, name.to_string(), body(f), TestOptions::default())
    }

    pub fn test_with<F, Fut>(&self, name: &str, options: TestOptions, f: F) -> TestBuilder<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        TestBuilder::new(self, name.to_string(), body(f), options)
    }

    pub fn test_only<F, Fut>(&self, name: &str, f: F) -> TestBuilder<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.test(name, f).only()
    }

    pub fn test_skip<F, Fut>(&self, name: &str, f: F) -> TestBuilder<'_>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.test(name, f).skip()
    }

    // ---- Hooks ---------------------------------------------------------------

    pub fn before<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.registry.lock().add_hook(HookKind::Before, body(f));
    }

    pub fn before_each<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.registry.lock().add_hook(HookKind::BeforeEach, body(f));
    }

    pub fn after_each<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.registry.lock().add_hook(HookKind::AfterEach, body(f));
    }

    pub fn after<F, Fut>(&self, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        self.registry.lock().add_hook(HookKind::After, body(f));
    }

    // ---- Table-driven --------------------------------------------------------

    /// Start a parameterized suite.
    ///
    /// ```rust,no_run
    /// # use assay::{expect, Tester};
    /// # let tester = Tester::default();
    /// tester
    ///     .describe_table("arithmetic")
    ///     .case("addition", (2, 3, 5))
    ///     .case("negative", (-2, -3, -5))
    ///     .run(|(a, b, sum): (i32, i32, i32)| async move { expect(a + b).to_be(sum) });
    /// ```
    pub fn describe_table<T>(&self, name: &str) -> TableBuilder<'_, T> {
        TableBuilder::new(self, name.to_string())
    }

    pub(crate) fn register_test(&self, node: NodeId, name: String, body: Body, options: TestOptions) {
        self.registry.lock().tree.add_test(node, name, body, options);
    }

    pub(crate) fn current_node(&self) -> NodeId {
        self.registry.lock().current()
    }
}

// ============================================================================
// TestBuilder: fluent decorator API, registers test on Drop
// ============================================================================

/// Builder returned by [`Tester::test`]. Registers the test when dropped.
pub struct TestBuilder<'a> {
    tester: &'a Tester,
    node: NodeId,
    name: String,
    body: Option<Body>,
    options: TestOptions,
}

impl<'a> TestBuilder<'a> {
    fn new(tester: &'a Tester, name: String, body: Body, options: TestOptions) -> Self {
        TestBuilder {
            node: tester.current_node(),
            tester,
            name,
            body: Some(body),
            options,
        }
    }

    pub fn only(mut self) -> Self {
        self.options.only = true;
        self
    }

    pub fn skip(mut self) -> Self {
        self.options.skip = true;
        self
    }

    /// Skip with a reason reported on the result.
    pub fn skip_reason(mut self, reason: impl Into<String>) -> Self {
        self.options.skip = true;
        self.options.skip_reason = Some(reason.into());
        self
    }

    /// Fail the test if its body exceeds `ms` milliseconds.
    pub fn timeout(mut self, ms: u64) -> Self {
        self.options.timeout = Some(Duration::from_millis(ms));
        self
    }
}

impl Drop for TestBuilder<'_> {
    fn drop(&mut self) {
        if let Some(body) = self.body.take() {
            self.tester.register_test(
                self.node,
                std::mem::take(&mut self.name),
                body,
                std::mem::take(&mut self.options),
            );
        }
    }
}
