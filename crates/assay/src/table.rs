//! Table-driven tests: parameterized cases via a builder.

use std::future::Future;
use std::sync::Arc;

use crate::error::IntoOutcome;
use crate::tester::Tester;
use crate::tree::{body, SuiteOptions, TestOptions};

/// Builder for table-driven (parameterized) tests.
///
/// Each `.case()` becomes a separate test inside a suite named after the table.
pub struct TableBuilder<'a, T> {
    tester: &'a Tester,
    name: String,
    cases: Vec<(String, T)>,
    auto_index: usize,
}

impl<'a, T> TableBuilder<'a, T> {
    pub(crate) fn new(tester: &'a Tester, name: String) -> Self {
        TableBuilder {
            tester,
            name,
            cases: Vec::new(),
            auto_index: 0,
        }
    }

    /// Add a named case.
    pub fn case(mut self, label: &str, data: T) -> Self {
        self.cases.push((label.to_string(), data));
        self
    }

    /// Add a case named `case_1`, `case_2`, ... Only unnamed cases are counted.
    pub fn case_unnamed(mut self, data: T) -> Self {
        self.auto_index += 1;
        let label = format!("case_{}", self.auto_index);
        self.cases.push((label, data));
        self
    }

    /// Register the suite. The test function receives its own copy of the case
    /// data on every run.
    pub fn run<F, Fut>(self, test_fn: F)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome,
    {
        let test_fn = Arc::new(test_fn);
        let cases = self.cases;

        self.tester
            .describe_with(&self.name, SuiteOptions::default(), |tester| {
                let node = tester.current_node();
                for (label, data) in cases {
                    let test_fn = test_fn.clone();
                    let case = body(move || test_fn(data.clone()));
                    tester.register_test(node, label, case, TestOptions::default());
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use crate::tester::Tester;

    #[test]
    fn test_cases_become_tests_in_one_suite() {
        let tester = Tester::default();
        tester
            .describe_table("parity")
            .case("two", 2)
            .case_unnamed(4)
            .case("eight", 8)
            .case_unnamed(6)
            .run(|n: i32| async move {
                if n % 2 == 0 {
                    Ok(())
                } else {
                    Err(format!("{n} is odd"))
                }
            });

        let registry = tester.registry.lock();
        let paths: Vec<String> = registry
            .tree
            .tests_in_order()
            .into_iter()
            .map(|id| registry.tree.path(id).join(" > "))
            .collect();
        assert_eq!(paths, vec![
                "parity > two",
                "parity > case_1",
                "parity > eight",
                "parity > case_2",
            ]);
    }
}
