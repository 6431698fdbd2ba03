//! # assay, an embeddable test-execution engine
//!
//! Register nested suites, tests and lifecycle hooks on a [`Tester`], run them
//! in sequence, shuffled or concurrently, and get structured results back.
//! Assertions produce typed failures with a structural [`DiffResult`];
//! [`MockFunction`] and [`Spy`] record calls.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use assay::{expect, matchers, Tester, Value};
//!
//! fn main() -> Result<(), assay::TesterError> {
//!     let mut tester = Tester::default();
//!
//!     tester.describe("Calculator", |t| {
//!         t.test("adds two numbers", || async { expect(2 + 3).to_be(5) });
//!
//!         t.describe("with objects", |t| {
//!             t.test("matches loosely", || async {
//!                 let actual = Value::object([("id", Value::from(7)), ("name", Value::from("x"))]);
//!                 expect(actual).to_equal(Value::object([
//!                     ("id", matchers::any(assay::Kind::Number)),
//!                     ("name", matchers::anything()),
//!                 ]))
//!             });
//!         });
//!     });
//!
//!     let results = tester.run_blocking()?;
//!     assert!(results.iter().all(|r| r.passed));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): the [`suite!`] DSL

pub mod config;
mod context;
pub mod diff;
pub mod error;
pub mod expect;
pub mod matcher;
pub mod mock;
pub mod result;
mod runner;
pub mod state;
pub mod table;
mod tester;
pub mod tree;
pub mod value;

pub use config::{RunOrder, TesterOptions, DEFAULT_TIMEOUT};
pub use context::TestBuilder;
pub use diff::{diff, diff_with, DiffOptions, DiffResult};
pub use error::{AssertionError, ErrorReport, IntoOutcome, Outcome, TesterError};
pub use expect::{expect, expect_future, Expect, ExpectFuture, TextMatch, ThrowMatch};
pub use matcher::Matcher;
pub use mock::{spy_on, CallResult, MockCall, MockFunction, Spy};
pub use result::{RunSummary, TestResult};
pub use runner::ONLY_ACTIVE;
pub use state::{StateNode, StateTest, StateTestingTree};
pub use tester::Tester;
pub use tree::{NodeId, NodeStatus, SuiteOptions, TestId, TestOptions, TestStatus};
pub use value::{Array, Function, Kind, Object, Value};

/// Asymmetric matchers for use on the expected side of a comparison.
pub use crate::matcher as matchers;

/// Declarative registration DSL. Available with the `macros` feature.
#[cfg(feature = "macros")]
pub use assay_macros::suite;
