//! Proc macros for the `assay` test engine.

mod codegen;
mod dsl;

/// Declarative registration against an `assay::Tester`.
///
/// The first item is the tester expression followed by `;`. Every test and
/// hook body becomes an `async move` block returning
/// `Result<(), assay::AssertionError>`, so `?` works on assertions. A body may
/// also end in an assertion without `;`; its outcome is the test's outcome.
///
/// # Example
///
/// ```text
/// let mut tester = assay::Tester::default();
///
/// assay::suite! {
///     tester;
///
///     describe "Calculator" {
///         before_each { reset_display(); }
///
///         it "adds two numbers" {
///             assay::expect(2 + 3).to_be(5)?;
///         }
///
///         it "is fast enough" timeout(50) {
///             assay::expect(1).to_be_greater_than(0)?;
///         }
///
///         xit "divides by zero" skip_reason("undefined behaviour") {}
///     }
/// }
///
/// let results = tester.run_blocking()?;
/// ```
///
/// # Supported DSL keywords
///
/// ## Suites
/// - `describe "name" { ... }` / `context "name" { ... }`
/// - `fdescribe` / `fcontext`: only (focused)
/// - `xdescribe` / `xcontext`: skipped
///
/// ## Tests
/// - `it "name" { ... }` / `test "name" { ... }`
/// - `fit` / `ftest`: only (focused)
/// - `xit` / `xtest`: skipped
///
/// ## Lifecycle hooks
/// - `before { ... }` (alias `before_all`): once before the suite's tests
/// - `before_each { ... }`: before every test in this suite and nested suites
/// - `after_each { ... }`: after every test, also when the test failed
/// - `after { ... }` (alias `after_all`): once after the suite completes
///
/// ## Decorators (on suites and tests)
/// - `timeout(ms)`: per-test timeout, inherited by nested tests when set on a suite
/// - `skip_reason("...")`: skip with a reported reason
///
/// ## Table-driven tests
/// ```text
/// describe_table "arithmetic" (a: i32, b: i32, expected: i32) [
///     "addition" (2, 3, 5),
///     (5, -3, 2),
/// ] {
///     assay::expect(a + b).to_be(expected)?;
/// }
/// ```
/// Unlabelled rows are named `case_1`, `case_2`, ...
#[proc_macro]
pub fn suite(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let suite = syn::parse_macro_input!(input as dsl::Suite);
    codegen::generate(suite).into()
}
