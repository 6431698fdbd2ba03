use std::sync::atomic::{AtomicU32, Ordering};

use assay::{expect, NodeStatus, RunOrder, Tester, TesterOptions, ONLY_ACTIVE};

fn specs(results: &[assay::TestResult]) -> Vec<&str> {
    results.iter().map(|r| r.spec.as_str()).collect()
}

// ============================================================================
// Nesting, aliases and results
// ============================================================================

#[tokio::test]
async fn nested_describe_and_context() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "basic nesting" {
            it "runs a simple test" {
                expect(2 + 2).to_be(4)?;
            }

            describe "inner describe" {
                test "runs nested test" {
                    expect(3 * 3).to_be(9)?;
                }
            }

            context "with context alias" {
                it "also works" {
                    expect(true).to_be_truthy()?;
                }
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert!(results.iter().all(|r| r.passed));
    assert_eq!(
        specs(&results),
        vec![
            "basic nesting > runs a simple test",
            "basic nesting > inner describe > runs nested test",
            "basic nesting > with context alias > also works",
        ]
    );
}

#[tokio::test]
async fn question_mark_and_panics_fail_the_test() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "failures" {
            it "returns early" {
                expect(1).to_be(2)?;
                assert_eq!(1, 0, "not reached");
            }

            it "panics" {
                assert_eq!(1, 2, "numbers differ");
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert!(results.iter().all(|r| !r.passed));
    assert_eq!(
        results[0].error.as_ref().unwrap().local_message,
        "Expected 1 to be 2"
    );
    assert!(results[1]
        .error
        .as_ref()
        .unwrap()
        .message
        .contains("numbers differ"));
}

#[tokio::test]
async fn trailing_assertion_decides_the_outcome() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "tail" {
            it "fails without a question mark" {
                expect(1).to_be(2)
            }

            it "passes without a question mark" {
                let total = 2 + 2;
                expect(total).to_be(4)
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert!(!results[0].passed);
    assert_eq!(
        results[0].error.as_ref().unwrap().local_message,
        "Expected 1 to be 2"
    );
    assert!(results[1].passed);
    assert_eq!(tester.state().status, NodeStatus::Failure);
}

// ============================================================================
// Hooks
// ============================================================================

static BEFORE: AtomicU32 = AtomicU32::new(0);
static BEFORE_EACH: AtomicU32 = AtomicU32::new(0);
static AFTER_EACH: AtomicU32 = AtomicU32::new(0);
static AFTER: AtomicU32 = AtomicU32::new(0);

#[tokio::test]
async fn hooks_run_around_tests() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "hooks" {
            before_all { BEFORE.fetch_add(1, Ordering::SeqCst); }
            before_each { BEFORE_EACH.fetch_add(1, Ordering::SeqCst); }
            after_each { AFTER_EACH.fetch_add(1, Ordering::SeqCst); }
            after_all { AFTER.fetch_add(1, Ordering::SeqCst); }

            it "sees before" {
                expect(BEFORE.load(Ordering::SeqCst)).to_be(1)?;
                expect(AFTER.load(Ordering::SeqCst)).to_be(0)?;
            }

            context "nested" {
                it "inherits before_each" {
                    expect(BEFORE_EACH.load(Ordering::SeqCst)).to_be(2)?;
                    expect(AFTER_EACH.load(Ordering::SeqCst)).to_be(1)?;
                }
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert!(results.iter().all(|r| r.passed), "{results:?}");
    assert_eq!(BEFORE.load(Ordering::SeqCst), 1);
    assert_eq!(BEFORE_EACH.load(Ordering::SeqCst), 2);
    assert_eq!(AFTER_EACH.load(Ordering::SeqCst), 2);
    assert_eq!(AFTER.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_before_hook_from_the_dsl() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "broken setup" {
            before {
                expect("connected").to_be("disconnected")?;
            }

            it "never runs" {}
        }
    }

    let results = tester.run().await.unwrap();
    assert_eq!(
        results[0].error.as_ref().unwrap().local_message,
        "Can not run if before hooks fail"
    );
    let state = tester.state();
    assert_eq!(state.node(&["broken setup"]).unwrap().before_hooks_errors.len(), 1);
}

// ============================================================================
// Focus, skip and decorators
// ============================================================================

static SKIPPED_HOOK: AtomicU32 = AtomicU32::new(0);
static FOCUSED_RAN: AtomicU32 = AtomicU32::new(0);
static UNFOCUSED_RAN: AtomicU32 = AtomicU32::new(0);

#[tokio::test]
async fn focused_and_skipped_items() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "focus" {
            fit "focused" {
                FOCUSED_RAN.fetch_add(1, Ordering::SeqCst);
            }

            it "unfocused" {
                UNFOCUSED_RAN.fetch_add(1, Ordering::SeqCst);
            }
        }

        fcontext "focused context" {
            it "inherits focus" {
                FOCUSED_RAN.fetch_add(1, Ordering::SeqCst);
            }

            xit "skipped anyway" {
                UNFOCUSED_RAN.fetch_add(1, Ordering::SeqCst);
            }

            it "skipped with reason" skip_reason("waiting on upstream") {
                UNFOCUSED_RAN.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert_eq!(FOCUSED_RAN.load(Ordering::SeqCst), 2);
    assert_eq!(UNFOCUSED_RAN.load(Ordering::SeqCst), 0);

    let reasons: Vec<(&str, Option<&str>)> = results
        .iter()
        .filter(|r| r.skipped)
        .map(|r| (r.spec.as_str(), r.skip_reason.as_deref()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("focus > unfocused", Some(ONLY_ACTIVE)),
            ("focused context > skipped anyway", None),
            ("focused context > skipped with reason", Some("waiting on upstream")),
        ]
    );
    assert_eq!(tester.state().status, NodeStatus::Success);
}

#[tokio::test]
async fn xdescribe_skips_the_whole_suite() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        xdescribe "pending" {
            before { SKIPPED_HOOK.fetch_add(1, Ordering::SeqCst); }
            it "a" {}
            it "b" {}
        }
    }

    let results = tester.run().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.skipped && r.error.is_none()));
    assert_eq!(SKIPPED_HOOK.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn timeout_decorator() {
    let mut tester = Tester::default();

    assay::suite! {
        tester;

        describe "slow things" timeout(20) {
            it "inherits the suite timeout" {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }

            it "overrides it" timeout(1000) {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            }
        }
    }

    let results = tester.run().await.unwrap();
    assert_eq!(
        results[0].error.as_ref().unwrap().local_message,
        "Test timed out after 20ms"
    );
    assert!(results[1].passed);
}

// ============================================================================
// Tables
// ============================================================================

#[tokio::test]
async fn describe_table_registers_one_test_per_row() {
    let mut tester = Tester::new(TesterOptions::default().run_order(RunOrder::Parallel));

    assay::suite! {
        tester;

        describe_table "addition" (a: i32, b: i32, sum: i32) [
            "small" (1, 2, 3),
            "negative" (-2, -3, -5),
            (10, 5, 15),
            "wrong" (1, 1, 3),
        ] {
            expect(a + b).to_be(sum)?;
        }
    }

    let results = tester.run().await.unwrap();
    assert_eq!(
        specs(&results),
        vec![
            "addition > small",
            "addition > negative",
            "addition > case_1",
            "addition > wrong",
        ]
    );
    let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
    assert_eq!(passed, vec![true, true, true, false]);
}

#[tokio::test]
async fn dsl_and_closure_api_mix() {
    let mut tester = Tester::default();

    tester.describe("closure suite", |t| {
        assay::suite! {
            t;

            it "registered through the macro" {
                expect("a").not().to_be("b")?;
            }
        }
        t.test("registered directly", || async { expect(1).to_be(1) });
    });

    let results = tester.run().await.unwrap();
    assert_eq!(
        specs(&results),
        vec![
            "closure suite > registered through the macro",
            "closure suite > registered directly",
        ]
    );
    assert!(results.iter().all(|r| r.passed));
}
