//! The engine handle: owns the registered tree, options and observers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::TesterOptions;
use crate::context::Registry;
use crate::error::TesterError;
use crate::expect::{expect, Expect};
use crate::mock::{spy_on, MockFunction, Spy};
use crate::result::TestResult;
use crate::runner::Scheduler;
use crate::state::{snapshot, Emitter, StateTestingTree};
use crate::value::{Object, Value};

/// A test engine instance.
///
/// Register suites, tests and hooks, then [`run`](Tester::run). The tree
/// survives a run, so the same registration can be run again; each run
/// starts from clean results.
///
/// ```rust,no_run
/// use assay::{expect, Tester, TesterOptions};
///
/// # async fn demo() -> Result<(), assay::TesterError> {
/// let mut tester = Tester::new(TesterOptions::default().bail(true));
/// tester.describe("math", |t| {
///     t.test("adds", || async { expect(2 + 3).to_be(5) });
/// });
/// let results = tester.run().await?;
/// assert!(results[0].passed);
/// # Ok(())
/// # }
/// ```
pub struct Tester {
    options: TesterOptions,
    identifier: String,
    pub(crate) registry: Mutex<Registry>,
    emitter: Emitter,
}

impl Default for Tester {
    fn default() -> Self {
        Tester::new(TesterOptions::default())
    }
}

impl Tester {
    pub fn new(options: TesterOptions) -> Self {
        let identifier = options
            .identifier
            .clone()
            .unwrap_or_else(|| format!("tester-{:08x}", rand::random::<u32>()));
        Tester {
            options,
            identifier,
            registry: Mutex::new(Registry::new()),
            emitter: Emitter::default(),
        }
    }

    pub fn options(&self) -> &TesterOptions {
        &self.options
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Execute every registered test. Results are in start order for
    /// `sequence`/`random` and registration order for `parallel`.
    pub async fn run(&mut self) -> Result<Vec<TestResult>, TesterError> {
        if self.options.timeout.is_zero() {
            return Err(TesterError::InvalidTimeout);
        }
        let scheduler = Scheduler::new(&self.registry, &self.emitter, &self.identifier, &self.options);
        Ok(scheduler.run().await)
    }

    /// [`run`](Tester::run) on a fresh current-thread runtime, for
    /// `harness = false` test targets.
    pub fn run_blocking(&mut self) -> Result<Vec<TestResult>, TesterError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Subscribe to state snapshots. Listeners are called synchronously after
    /// every transition and must not block.
    pub fn on_change(&self, listener: impl Fn(&StateTestingTree) + Send + Sync + 'static) {
        self.emitter.subscribe(Arc::new(listener));
    }

    pub fn state(&self) -> StateTestingTree {
        let registry = self.registry.lock();
        snapshot(&self.identifier, registry.status, &registry.tree)
    }

    /// Results of the last run.
    pub fn results(&self) -> Vec<TestResult> {
        self.registry.lock().results.clone()
    }

    pub fn expect(&self, actual: impl Into<Value>) -> Expect {
        expect(actual)
    }

    pub fn mock_fn(&self) -> MockFunction {
        MockFunction::new()
    }

    pub fn spy_on(&self, target: &Object, property: &str) -> Result<Spy, TesterError> {
        spy_on(target, property)
    }
}
