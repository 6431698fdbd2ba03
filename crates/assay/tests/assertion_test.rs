use assay::{
    diff, expect, expect_future, matchers, spy_on, CallResult, DiffResult, Kind, MockFunction, Object,
    TesterError, ThrowMatch, Value,
};

fn samples() -> Vec<Value> {
    vec![
        Value::Undefined,
        Value::Null,
        Value::from(true),
        Value::from(0),
        Value::from(1.5),
        Value::from(f64::NAN),
        Value::from("text"),
        Value::array([1, 2, 3]),
        Value::array([1, 2]),
        Value::object([("a", Value::from(1)), ("b", Value::from("x"))]),
        Value::object([("a", Value::from(1))]),
        Value::object([("a", Value::array([Value::Null]))]),
    ]
}

fn cyclic(key: &str) -> Value {
    let object = Object::new();
    object.set("name", "node");
    object.set(key, Value::Object(object.clone()));
    Value::Object(object)
}

// ============================================================================
// Diff properties
// ============================================================================

#[test]
fn diff_is_reflexive_and_symmetric_without_matchers() {
    let values = samples();
    for a in &values {
        assert!(diff(a, a).same(), "{a} should equal itself");
        for b in &values {
            assert_eq!(
                diff(a, b).same(),
                diff(b, a).same(),
                "asymmetric result for {a} vs {b}"
            );
        }
    }
}

#[test]
fn diff_mirrors_added_and_removed() {
    let longer = Value::array([1, 2, 3]);
    let shorter = Value::array([1, 2]);

    let DiffResult::Array { items, same } = diff(&longer, &shorter) else {
        panic!("expected an array diff");
    };
    assert!(!same);
    assert!(matches!(items[2], DiffResult::Removed { .. }));

    let DiffResult::Array { items, .. } = diff(&shorter, &longer) else {
        panic!("expected an array diff");
    };
    assert!(matches!(items[2], DiffResult::Added { .. }));
}

#[test]
fn diff_handles_cycles() {
    assert!(diff(&cyclic("self"), &cyclic("self")).same());
    assert!(!diff(&cyclic("self"), &Value::object([("name", "node")])).same());

    // Same shape, back-reference recorded under a different key.
    let DiffResult::Object { keys, same } = diff(&cyclic("self"), &cyclic("me")) else {
        panic!("expected an object diff");
    };
    assert!(!same);
    assert!(matches!(keys["self"], DiffResult::Removed { .. }));
    assert!(matches!(keys["me"], DiffResult::Added { .. }));

    // Both sides cycle under `child.back`, but to different ancestors.
    let to_root = Object::new();
    let inner = Object::new();
    inner.set("back", Value::Object(to_root.clone()));
    to_root.set("child", Value::Object(inner));

    let to_child = Object::new();
    let inner = Object::new();
    inner.set("back", Value::Object(inner.clone()));
    to_child.set("child", Value::Object(inner));

    let DiffResult::Object { keys, same } = diff(&Value::Object(to_root), &Value::Object(to_child)) else {
        panic!("expected an object diff");
    };
    assert!(!same);
    let DiffResult::Object { keys, .. } = &keys["child"] else {
        panic!("expected an object diff under `child`");
    };
    assert!(matches!(
        &keys["back"],
        DiffResult::Circular { path, same: false } if path.is_empty()
    ));
}

#[test]
fn matchers_apply_on_the_expected_side() {
    let actual = Value::object([
        ("id", Value::from(42)),
        ("name", Value::from("assay engine")),
        ("tags", Value::array(["a", "b", "c"])),
    ]);
    let expected = Value::object([
        ("id", matchers::any(Kind::Number)),
        ("name", matchers::string_containing("engine")),
        ("tags", matchers::array_containing(["c", "a"])),
    ]);
    assert!(diff(&expected, &actual).same());
    assert!(expect(actual.clone()).to_equal(expected).is_ok());
    assert!(expect(actual)
        .to_match_object(Value::object([("id", Value::from(42))]))
        .is_ok());
}

#[test]
fn negated_literals_compare_structurally() {
    let negated = matchers::not(Value::array([1, 2]));
    assert!(!diff(&negated, &Value::array([1, 2])).same());
    assert!(diff(&negated, &Value::array([1, 3])).same());
}

// ============================================================================
// Expect
// ============================================================================

#[test]
fn failing_expectations_carry_both_sides() {
    let err = expect(Value::array([1, 2])).to_equal(Value::array([1, 3])).unwrap_err();
    assert_eq!(err.expected, Some(Value::array([1, 3])));
    assert_eq!(err.actual, Some(Value::array([1, 2])));
    assert!(!err.difference.as_ref().unwrap().same());
    assert_eq!(err.local_message(), "Expected [1, 2] to equal [1, 3]");

    let err = expect(1).not().to_be(1).unwrap_err();
    assert!(err.local_message().contains("not to be"));
}

#[test]
fn throw_expectations() {
    let throws = Value::function("throws", |_, _| Err(Value::error("bad input")));
    let returns = Value::function("returns", |_, _| Ok(Value::from(1)));

    assert!(expect(throws.clone()).to_throw().is_ok());
    assert!(expect(throws.clone())
        .to_throw_with(ThrowMatch::Message("bad".into()))
        .is_ok());
    assert!(expect(throws).to_throw_with(ThrowMatch::Message("other".into())).is_err());
    assert!(expect(returns.clone()).to_throw().is_err());
    assert!(expect(returns).not().to_throw().is_ok());
}

#[tokio::test]
async fn future_expectations() {
    assert!(expect_future(async { Ok::<_, Value>(Value::from(3)) })
        .to_resolve()
        .await
        .is_ok());
    assert!(expect_future(async { Err::<Value, _>(Value::error("nope")) })
        .to_reject()
        .await
        .is_ok());
}

// ============================================================================
// Mocks & spies
// ============================================================================

#[test]
fn mock_scenarios_match_structurally() {
    let mock = MockFunction::new();
    mock.scenario([1, 2], "x");

    assert_eq!(mock.call(&[Value::from(1), Value::from(2)]).unwrap(), Value::from("x"));
    assert!(mock.call(&[Value::from(2), Value::from(1)]).unwrap().is_undefined());
    assert!(mock.call(&[]).unwrap().is_undefined());

    assert_eq!(mock.call_count(), 3);
    assert!(expect(&mock).to_have_been_called_with([1, 2]).is_ok());
    assert!(expect(&mock).to_have_been_last_called_with(Vec::<Value>::new()).is_ok());
    assert!(expect(&mock).to_have_returned_with("x").is_ok());
}

#[test]
fn mock_implementations_resolve_in_order() {
    let mock = MockFunction::new();
    mock.mock_return_value(1).mock_return_value_once(2);
    mock.scenario(["s"], 3);

    assert_eq!(mock.call(&[Value::from("s")]).unwrap(), Value::from(2));
    assert_eq!(mock.call(&[Value::from("s")]).unwrap(), Value::from(3));
    assert_eq!(mock.call(&[]).unwrap(), Value::from(1));

    mock.mock_throw("boom");
    assert!(mock.call(&[]).is_err());
    assert!(matches!(mock.last_call().unwrap().result, CallResult::Throw(_)));

    mock.reset();
    assert_eq!(mock.call_count(), 0);
    assert!(mock.call(&[]).unwrap().is_undefined());
}

#[test]
fn spies_forward_with_the_receiver_and_restore() {
    let counter = Object::new();
    counter.set("step", 2);
    counter.set(
        "next",
        Value::function("next", |this, args| {
            let step = this
                .as_object()
                .and_then(|o| o.get("step"))
                .and_then(|v| v.as_number())
                .unwrap_or(0.0);
            let base = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::from(base + step))
        }),
    );

    let spy = spy_on(&counter, "next").unwrap();
    assert_eq!(counter.call_method("next", &[Value::from(10)]).unwrap(), Value::from(12));
    assert_eq!(spy.call_count(), 1);
    assert!(spy.calls()[0].this.as_object().unwrap().ptr_eq(&counter));

    spy.mock_return_value(0);
    assert_eq!(counter.call_method("next", &[Value::from(10)]).unwrap(), Value::from(0));

    spy.restore();
    assert_eq!(counter.call_method("next", &[Value::from(1)]).unwrap(), Value::from(3));
    assert_eq!(spy.call_count(), 2);
}

#[test]
fn spying_on_missing_or_plain_properties_fails() {
    let target = Object::new();
    target.set("value", 1);

    assert!(matches!(
        spy_on(&target, "missing"),
        Err(TesterError::MissingProperty { .. })
    ));
    assert!(matches!(
        spy_on(&target, "value"),
        Err(TesterError::NotCallable { kind: Kind::Number, .. })
    ));
}
