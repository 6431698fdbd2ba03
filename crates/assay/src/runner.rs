//! The scheduler.
//!
//! A run has three phases:
//!
//! 1. **Resolution**: `only` and `skip` are applied once, before anything
//!    executes. Skipped tests never touch a hook.
//! 2. **Dispatch**: `sequence` walks the tree depth-first, `random` shuffles
//!    the runnable tests first, `parallel` starts every runnable test at once
//!    with each suite's `before` hooks gating its own subtree.
//! 3. **Settling**: a suite completes when every test below it is resolved;
//!    its `after` hooks run then, provided its `before` hooks ran cleanly.
//!
//! Every tree mutation happens inside one lock scope together with the
//! snapshot pushed to observers, so events never interleave mid-transition.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, trace, warn};

use crate::config::{RunOrder, TesterOptions};
use crate::context::Registry;
use crate::error::{AssertionError, ErrorReport, Outcome};
use crate::result::{RunSummary, TestResult};
use crate::state::{snapshot, Emitter};
use crate::tree::{Body, HookKind, NodeId, NodeStatus, TestId, TestStatus, Tree};

/// Skip reason for tests outside every focused scope.
pub const ONLY_ACTIVE: &str = "\"only\" tests are active";

pub(crate) struct Scheduler<'a> {
    registry: &'a Mutex<Registry>,
    emitter: &'a Emitter,
    identifier: &'a str,
    options: &'a TesterOptions,
    bailed: AtomicBool,
}

struct Plan {
    order: Vec<TestId>,
    skipped: Vec<(TestId, Option<String>)>,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        registry: &'a Mutex<Registry>,
        emitter: &'a Emitter,
        identifier: &'a str,
        options: &'a TesterOptions,
    ) -> Self {
        Scheduler {
            registry,
            emitter,
            identifier,
            options,
            bailed: AtomicBool::new(false),
        }
    }

    /// Mutate the registry and push the resulting snapshot to observers.
    fn transition<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut registry = self.registry.lock();
        let out = f(&mut registry);
        if !self.emitter.is_empty() {
            let state = snapshot(self.identifier, registry.status, &registry.tree);
            self.emitter.emit(&state);
        }
        out
    }

    /// Mutate the registry without emitting.
    fn update<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.registry.lock())
    }

    fn bailed(&self) -> bool {
        self.bailed.load(Ordering::SeqCst)
    }

    fn note_failure(&self) {
        if self.options.bail && !self.bailed.swap(true, Ordering::SeqCst) {
            debug!("bail: no further tests will start");
        }
    }

    pub(crate) async fn run(&self) -> Vec<TestResult> {
        let started = Instant::now();
        let plan = self.transition(|r| {
            r.tree.reset_run_state();
            r.results.clear();
            r.status = NodeStatus::Running;
            resolve(&r.tree)
        });

        debug!(
            identifier = self.identifier,
            order = ?self.options.run_order,
            tests = plan.order.len(),
            skipped = plan.skipped.len(),
            "run started"
        );

        for (id, reason) in &plan.skipped {
            self.transition(|r| mark_skipped(&mut r.tree, *id, reason.clone()));
        }

        match self.options.run_order {
            RunOrder::Sequence => self.run_queue(plan.order).await,
            RunOrder::Random => {
                let mut eligible = Vec::with_capacity(plan.order.len());
                for id in plan.order {
                    if self.update(|r| record_if_skipped(r, id)) {
                        continue;
                    }
                    eligible.push(id);
                }
                let mut rng = match self.options.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                eligible.shuffle(&mut rng);
                self.run_queue(eligible).await;
            }
            RunOrder::Parallel => {
                for id in &plan.order {
                    self.update(|r| record_if_skipped(r, *id));
                }
                self.run_node(Tree::ROOT).await;
            }
        }

        self.close_open_nodes().await;

        let order = self.options.run_order;
        let results = self.transition(|r| {
            if order == RunOrder::Parallel {
                let position: HashMap<TestId, usize> = r
                    .tree
                    .tests_in_order()
                    .into_iter()
                    .enumerate()
                    .map(|(i, id)| (id, i))
                    .collect();
                r.results
                    .sort_by_key(|result| position.get(&result.id).copied().unwrap_or(usize::MAX));
            }
            r.status = if r.results.iter().any(TestResult::failed) {
                NodeStatus::Failure
            } else {
                NodeStatus::Success
            };
            r.results.clone()
        });

        let summary = RunSummary::from_results(&results);
        debug!(
            identifier = self.identifier,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        results
    }

    // ---- Sequence / random ---------------------------------------------------

    async fn run_queue(&self, queue: Vec<TestId>) {
        for id in queue {
            if self.bailed() {
                break;
            }
            let (status, node) = self.update(|r| {
                let test = r.tree.test(id);
                (test.status, test.node)
            });
            match status {
                TestStatus::Idle => self.run_test(id).await,
                TestStatus::Skipped => {
                    self.update(|r| record_if_skipped(r, id));
                    self.settle(node).await;
                }
                // Already failed by a `before` hook.
                _ => {}
            }
        }
    }

    // ---- Parallel ------------------------------------------------------------

    fn run_node<'s>(&'s self, id: NodeId) -> BoxFuture<'s, ()> {
        async move {
            if self.bailed() {
                return;
            }
            let (pending, tests, children) = self.update(|r| {
                let tree = &r.tree;
                let pending = tree
                    .subtree_tests(id)
                    .into_iter()
                    .any(|t| tree.test(t).status == TestStatus::Idle);
                let node = tree.node(id);
                let tests: Vec<TestId> = node
                    .tests()
                    .filter(|t| tree.test(*t).status == TestStatus::Idle)
                    .collect();
                let children: Vec<NodeId> = node.children().collect();
                (pending, tests, children)
            });
            if !pending || self.ensure_before(id).await.is_err() {
                return;
            }

            let mut tasks: Vec<BoxFuture<'s, ()>> = Vec::with_capacity(tests.len() + children.len());
            tasks.extend(tests.into_iter().map(|t| self.run_test(t).boxed()));
            tasks.extend(children.into_iter().map(|c| self.run_node(c)));
            join_all(tasks).await;
        }
        .boxed()
    }

    // ---- One test ------------------------------------------------------------

    async fn run_test(&self, id: TestId) {
        if self.bailed() {
            return;
        }
        let node = self.update(|r| r.tree.test(id).node);
        if self.ensure_before(node).await.is_err() {
            return;
        }

        let default_timeout = self.options.timeout;
        let Some((body, timeout, lineage, spec)) = self.transition(|r| {
            if r.tree.test(id).status != TestStatus::Idle {
                return None;
            }
            let timeout = r.tree.effective_timeout(id, default_timeout);
            let lineage = r.tree.lineage(node);
            let spec = r.tree.path(id).join(" > ");
            let test = r.tree.test_mut(id);
            test.status = TestStatus::Running;
            test.started_at = Some(Utc::now());
            let body = test.body.clone();
            refresh(&mut r.tree, node);
            Some((body, timeout, lineage, spec))
        }) else {
            return;
        };

        trace!(test = %spec, timeout_ms = timeout.as_millis() as u64, "test started");
        let started = Instant::now();

        let mut failure = None;
        for suite in &lineage {
            for hook in self.hooks(*suite, HookKind::BeforeEach) {
                if let Err(err) = invoke(hook).await {
                    warn!(test = %spec, error = %err, "beforeEach hook failed");
                    if failure.is_none() {
                        failure = Some(err.into_before_each_failure());
                    }
                }
            }
        }

        if failure.is_none() {
            failure = run_body(body, timeout).await.err();
        }

        let mut after_errors = Vec::new();
        for suite in &lineage {
            for hook in self.hooks(*suite, HookKind::AfterEach) {
                if let Err(err) = invoke(hook).await {
                    warn!(test = %spec, error = %err, "afterEach hook failed");
                    after_errors.push(err.report());
                }
            }
        }

        let duration = started.elapsed();
        let passed = failure.is_none();
        trace!(test = %spec, passed, elapsed_ms = duration.as_millis() as u64, "test finished");

        self.transition(|r| {
            let path = r.tree.path(id);
            let result = TestResult {
                id,
                spec: path.join(" > "),
                path,
                passed,
                error: failure.as_ref().map(ErrorReport::from),
                skipped: false,
                skip_reason: None,
                duration,
                after_each_hooks_errors: after_errors.clone(),
            };
            let test = r.tree.test_mut(id);
            test.status = if passed {
                TestStatus::Success
            } else {
                TestStatus::Failure
            };
            test.ended_at = Some(Utc::now());
            test.after_each_hooks_errors = after_errors;
            test.result = Some(result.clone());
            r.results.push(result);
            refresh(&mut r.tree, node);
        });

        if !passed {
            self.note_failure();
        }
        self.settle(node).await;
    }

    fn hooks(&self, node: NodeId, kind: HookKind) -> Vec<Body> {
        self.update(|r| r.tree.node(node).hooks.get(kind).to_vec())
    }

    // ---- Before hooks --------------------------------------------------------

    /// Run any `before` hooks on the path to `node` that have not run yet.
    /// `Err` means some suite on the path failed its `before` hooks and the
    /// tests below it are already resolved.
    async fn ensure_before(&self, node: NodeId) -> Result<(), ()> {
        let lineage = self.update(|r| r.tree.lineage(node));

        for suite in lineage {
            let pending = self.update(|r| {
                let n = r.tree.node_mut(suite);
                if n.before_hooks_have_run {
                    return Err(!n.before_hooks_errors.is_empty());
                }
                n.before_hooks_have_run = true;
                let hooks = n.hooks.get(HookKind::Before).to_vec();
                refresh(&mut r.tree, suite);
                Ok(hooks)
            });

            let hooks = match pending {
                Ok(hooks) => hooks,
                Err(true) => return Err(()),
                Err(false) => continue,
            };

            let mut errors = Vec::new();
            for hook in hooks {
                if let Err(err) = invoke(hook).await {
                    errors.push(err.report());
                }
            }

            if !errors.is_empty() {
                let name = self.update(|r| r.tree.node(suite).name.clone());
                warn!(suite = %name, errors = errors.len(), "before hook failed");
                self.fail_subtree(suite, errors);
                self.settle(suite).await;
                return Err(());
            }
        }

        Ok(())
    }

    fn fail_subtree(&self, suite: NodeId, errors: Vec<ErrorReport>) {
        let tests = self.update(|r| {
            r.tree.node_mut(suite).before_hooks_errors = errors;
            let tree = &r.tree;
            tree.subtree_tests(suite)
                .into_iter()
                .filter(|t| tree.test(*t).status == TestStatus::Idle)
                .collect::<Vec<_>>()
        });

        let report = AssertionError::before_hooks_failed().report();
        for id in tests {
            self.transition(|r| {
                let path = r.tree.path(id);
                let result = TestResult {
                    id,
                    spec: path.join(" > "),
                    path,
                    passed: false,
                    error: Some(report.clone()),
                    skipped: false,
                    skip_reason: None,
                    duration: Duration::ZERO,
                    after_each_hooks_errors: Vec::new(),
                };
                let test = r.tree.test_mut(id);
                let node = test.node;
                test.status = TestStatus::Failure;
                test.ended_at = Some(Utc::now());
                test.result = Some(result.clone());
                r.results.push(result);
                refresh(&mut r.tree, node);
            });
            self.note_failure();
        }
    }

    // ---- Completion ----------------------------------------------------------

    /// Complete `node` and its ancestors as far as their subtrees are resolved.
    async fn settle(&self, node: NodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(hooks) = self.claim(id, false) else {
                return;
            };
            self.complete(id, hooks).await;
            current = self.update(|r| r.tree.node(id).parent);
        }
    }

    /// Suites whose `before` hooks ran but whose tests never all resolved
    /// (bail) still get their `after` hooks, deepest first.
    async fn close_open_nodes(&self) {
        let nodes = self.update(|r| r.tree.nodes_post_order());
        for id in nodes {
            if let Some(hooks) = self.claim(id, true) {
                self.complete(id, hooks).await;
            }
        }
    }

    /// Mark `id` completed if it is ready and return the `after` hooks it
    /// should run. `None` if it is not ready or already completed.
    fn claim(&self, id: NodeId, closing: bool) -> Option<Vec<Body>> {
        self.update(|r| {
            let tree = &mut r.tree;
            let node = tree.node(id);
            if node.completed {
                return None;
            }
            let resolved = tree
                .subtree_tests(id)
                .into_iter()
                .all(|t| tree.test(t).status.is_terminal());
            if !(resolved || (closing && node.before_hooks_have_run)) {
                return None;
            }

            let node = tree.node_mut(id);
            node.completed = true;
            let clean = node.before_hooks_have_run && node.before_hooks_errors.is_empty();
            Some(if clean {
                node.hooks.get(HookKind::After).to_vec()
            } else {
                Vec::new()
            })
        })
    }

    async fn complete(&self, id: NodeId, hooks: Vec<Body>) {
        let mut errors = Vec::new();
        for hook in hooks {
            if let Err(err) = invoke(hook).await {
                errors.push(err.report());
            }
        }
        if !errors.is_empty() {
            let name = self.update(|r| r.tree.node(id).name.clone());
            warn!(suite = %name, errors = errors.len(), "after hook failed");
        }

        self.transition(|r| {
            r.tree.node_mut(id).after_hooks_errors.extend(errors);
            refresh(&mut r.tree, id);
        });
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn resolve(tree: &Tree) -> Plan {
    let order = tree.tests_in_order();
    let focus = order.iter().any(|id| tree.test(*id).options.only)
        || tree
            .nodes_post_order()
            .into_iter()
            .any(|id| tree.node(id).options.only);

    let skipped = order
        .iter()
        .filter_map(|id| skip_reason(tree, *id, focus).map(|reason| (*id, reason)))
        .collect();

    Plan { order, skipped }
}

/// `Some(reason)` if the test is skipped this run.
fn skip_reason(tree: &Tree, id: TestId, focus: bool) -> Option<Option<String>> {
    let test = tree.test(id);
    let lineage = tree.lineage(test.node);

    if focus
        && !test.options.only
        && !lineage.iter().any(|n| tree.node(*n).options.only)
    {
        return Some(Some(ONLY_ACTIVE.to_string()));
    }

    let mut declared = test.options.skip;
    let mut reason = if test.options.skip {
        test.options.skip_reason.clone()
    } else {
        None
    };
    for node in lineage.iter().rev() {
        let options = &tree.node(*node).options;
        if options.skip {
            declared = true;
            if reason.is_none() {
                reason = options.skip_reason.clone();
            }
        }
    }

    declared.then_some(reason)
}

fn mark_skipped(tree: &mut Tree, id: TestId, reason: Option<String>) {
    let path = tree.path(id);
    let test = tree.test_mut(id);
    let node = test.node;
    test.status = TestStatus::Skipped;
    test.result = Some(TestResult::skipped(id, path, reason));
    refresh(tree, node);
}

/// Append a skipped test's result. Returns whether it was skipped.
fn record_if_skipped(registry: &mut Registry, id: TestId) -> bool {
    let test = registry.tree.test(id);
    if test.status != TestStatus::Skipped {
        return false;
    }
    let already = registry.results.iter().any(|r| r.id == id);
    if let (false, Some(result)) = (already, test.result.clone()) {
        registry.results.push(result);
    }
    true
}

/// Recompute the status of `node` and its ancestors.
fn refresh(tree: &mut Tree, node: NodeId) {
    for id in tree.lineage(node) {
        let status = tree.derive_status(id);
        tree.node_mut(id).status = status;
    }
}

// ============================================================================
// Invocation
// ============================================================================

async fn invoke(hook: Body) -> Outcome {
    match AssertUnwindSafe(async move { hook().await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => Err(AssertionError::from_panic(payload)),
    }
}

/// Race the body against its timeout. On expiry the body future is dropped.
async fn run_body(body: Body, timeout: Duration) -> Outcome {
    match tokio::time::timeout(timeout, invoke(body)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "test body timed out");
            Err(AssertionError::timeout(timeout.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{body, TestOptions};

    fn noop() -> Body {
        body(|| async {})
    }

    #[test]
    fn test_only_anywhere_skips_everything_unfocused() {
        let mut tree = Tree::new();
        let focused = tree.add_node(Tree::ROOT, "focused".into(), TestOptions::only());
        let inside = tree.add_test(focused, "inside".into(), noop(), TestOptions::default());
        let other = tree.add_node(Tree::ROOT, "other".into(), TestOptions::default());
        let outside = tree.add_test(other, "outside".into(), noop(), TestOptions::default());
        let picked = tree.add_test(other, "picked".into(), noop(), TestOptions::only());

        let plan = resolve(&tree);
        assert_eq!(plan.order, vec![inside, outside, picked]);
        assert_eq!(plan.skipped, vec![(outside, Some(ONLY_ACTIVE.to_string()))]);
    }

    #[test]
    fn test_skip_reason_closest_wins() {
        let mut tree = Tree::new();
        let outer = tree.add_node(Tree::ROOT, "outer".into(), TestOptions::skip(Some("outer".into())));
        let inner = tree.add_node(outer, "inner".into(), TestOptions::skip(Some("inner".into())));
        let plain = tree.add_test(inner, "plain".into(), noop(), TestOptions::default());
        let own = tree.add_test(inner, "own".into(), noop(), TestOptions::skip(Some("own".into())));
        let bare = tree.add_node(Tree::ROOT, "bare".into(), TestOptions::skip(None));
        let unnamed = tree.add_test(bare, "unnamed".into(), noop(), TestOptions::default());

        assert_eq!(skip_reason(&tree, plain, false), Some(Some("inner".to_string())));
        assert_eq!(skip_reason(&tree, own, false), Some(Some("own".to_string())));
        assert_eq!(skip_reason(&tree, unnamed, false), Some(None));
    }

    #[test]
    fn test_unskipped_test_resolves_to_none() {
        let mut tree = Tree::new();
        let id = tree.add_test(Tree::ROOT, "runs".into(), noop(), TestOptions::default());
        assert_eq!(skip_reason(&tree, id, false), None);
    }

    #[tokio::test]
    async fn test_run_body_times_out() {
        let slow = body(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        let err = run_body(slow, Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.local_message(), "Test timed out after 10ms");
    }

    #[tokio::test]
    async fn test_invoke_turns_panics_into_failures() {
        async fn explode() {
            panic!("exploded");
        }

        let err = invoke(body(explode)).await.unwrap_err();
        assert_eq!(err.message, "exploded");
    }
}
