use {
    proptest::prelude::*,
    tokio::join,
    tally_common::{ActionInput, ActionResult, Value},
    tally_expr::EvalError,
    tally_runtime::{
        COUNTER_KEY,
        CounterAction,
        action::StoreOutcome,
        config::RuntimeConfig,
        error::ActionError,
        kv::{KvStore, MemoryStore, SqliteStore, StoredValue},
    },
    crate::stores::{InterleavingStore, StoreCall, TestStore},
};


#[tokio::test]
async fn empty_store() {
    let store = TestStore::new();
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("1+1")).await.unwrap();

    assert_eq!(ActionResult::new(0, Value::Integer(2)), result);
    assert_eq!(Some(StoredValue::Integer(1)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn counter_stored_as_text() {
    let store = TestStore::new().with_value(COUNTER_KEY, StoredValue::from("5")).await;
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("'hello'")).await.unwrap();

    assert_eq!(ActionResult::new(5, Value::from("hello")), result);
    assert_eq!(Some(StoredValue::Integer(6)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn counter_stored_as_integer() {
    let store = TestStore::new().with_value(COUNTER_KEY, StoredValue::Integer(10)).await;
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("2*3")).await.unwrap();

    assert_eq!(ActionResult::new(10, Value::Integer(6)), result);
    assert_eq!(Some(StoredValue::Integer(11)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn read_failure_counts_from_zero() {
    let store = TestStore::new()
        .with_value(COUNTER_KEY, StoredValue::Integer(41)).await
        .failing_reads();
    let (result, event) = CounterAction::new(store.clone()).invoke_traced(&ActionInput::text("7")).await.unwrap();

    assert_eq!(ActionResult::new(0, Value::Integer(7)), result);
    assert_eq!(Some(StoredValue::Integer(1)), store.stored(COUNTER_KEY).await);
    assert!(matches!(event.read, StoreOutcome::Failed { .. }));
    assert_eq!(StoreOutcome::Succeeded, event.write);
}

#[tokio::test]
async fn non_numeric_counter_counts_from_zero() {
    let store = TestStore::new().with_value(COUNTER_KEY, StoredValue::from("not a number")).await;
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("1")).await.unwrap();

    assert_eq!(0, result.count);
    assert_eq!(Some(StoredValue::Integer(1)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn write_failure_does_not_change_result() {
    let store = TestStore::new()
        .with_value(COUNTER_KEY, StoredValue::Integer(3)).await
        .failing_writes();
    let (result, event) = CounterAction::new(store.clone()).invoke_traced(&ActionInput::text("'x' + 1")).await.unwrap();

    assert_eq!(ActionResult::new(3, Value::from("x1")), result);
    assert_eq!(StoreOutcome::Succeeded, event.read);
    assert!(matches!(event.write, StoreOutcome::Failed { .. }));
    // write was attempted with the incremented value, but did not land
    assert_eq!(
        vec![
            StoreCall::Get(COUNTER_KEY.to_owned()),
            StoreCall::Set(COUNTER_KEY.to_owned(), StoredValue::Integer(4)),
        ],
        store.calls(),
    );
    assert_eq!(Some(StoredValue::Integer(3)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn both_store_calls_failing() {
    let store = TestStore::new().failing_reads().failing_writes();
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("2 ** 10")).await.unwrap();

    assert_eq!(ActionResult::new(0, Value::Integer(1024)), result);
    assert_eq!(
        vec![
            StoreCall::Get(COUNTER_KEY.to_owned()),
            StoreCall::Set(COUNTER_KEY.to_owned(), StoredValue::Integer(1)),
        ],
        store.calls(),
    );
}

#[tokio::test]
async fn evaluation_failure_does_not_touch_store() {
    let store = TestStore::new().with_value(COUNTER_KEY, StoredValue::Integer(3)).await;
    let action = CounterAction::new(store.clone());

    match action.invoke(&ActionInput::text("1/0")).await {
        Err(ActionError::Evaluation(EvalError::DivisionByZero)) => {}
        other => panic!("expected division by zero, got: {other:?}"),
    }
    match action.invoke(&ActionInput::text("1 +")).await {
        Err(ActionError::Evaluation(EvalError::UnexpectedEnd)) => {}
        other => panic!("expected parse error, got: {other:?}"),
    }
    assert!(matches!(action.invoke(&ActionInput::new()).await, Err(ActionError::MissingText)));

    assert_eq!(Vec::<StoreCall>::new(), store.calls());
    assert_eq!(Some(StoredValue::Integer(3)), store.stored(COUNTER_KEY).await);
}

#[tokio::test]
async fn read_happens_before_write() {
    let store = TestStore::new();
    CounterAction::new(store.clone()).invoke(&ActionInput::text("0")).await.unwrap();

    assert_eq!(
        vec![
            StoreCall::Get(COUNTER_KEY.to_owned()),
            StoreCall::Set(COUNTER_KEY.to_owned(), StoredValue::Integer(1)),
        ],
        store.calls(),
    );
}

#[tokio::test]
async fn count_is_value_before_increment() {
    let store = MemoryStore::new();
    let action = CounterAction::new(store.clone());

    for expected in 0..5 {
        let result = action.invoke(&ActionInput::text("1")).await.unwrap();
        assert_eq!(expected, result.count);
    }
    assert_eq!(Some(StoredValue::Integer(5)), store.get(COUNTER_KEY).await.unwrap());
}

#[tokio::test]
async fn counter_saturates() {
    let store = MemoryStore::new();
    store.set(COUNTER_KEY, StoredValue::Integer(i64::MAX)).await.unwrap();
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("1")).await.unwrap();

    assert_eq!(i64::MAX, result.count);
    assert_eq!(Some(StoredValue::Integer(i64::MAX)), store.get(COUNTER_KEY).await.unwrap());
}

#[tokio::test]
async fn result_does_not_depend_on_store() {
    let healthy = CounterAction::new(MemoryStore::new());
    let broken = CounterAction::new(TestStore::new().failing_reads().failing_writes());

    for text in ["1+1", "'a' + 'b'", "7 / 2", "!(1 < 2) || null"] {
        let input = ActionInput::text(text);
        assert_eq!(
            healthy.invoke(&input).await.unwrap().result,
            broken.invoke(&input).await.unwrap().result,
        );
    }
}

#[tokio::test]
async fn concurrent_invocations_lose_an_increment() {
    let store = MemoryStore::new();
    let action = CounterAction::new(InterleavingStore::new(store.clone(), 2));

    let first_input = ActionInput::text("1");
    let second_input = ActionInput::text("2");
    let (first, second) = join!(
        action.invoke(&first_input),
        action.invoke(&second_input),
    );

    assert_eq!(0, first.unwrap().count);
    assert_eq!(0, second.unwrap().count);
    // two invocations, but the counter only moved by one
    assert_eq!(Some(StoredValue::Integer(1)), store.get(COUNTER_KEY).await.unwrap());
}

#[tokio::test]
async fn counter_persists_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tally.sqlite");

    {
        let action = CounterAction::new(SqliteStore::new(&path).unwrap());
        action.invoke(&ActionInput::text("1")).await.unwrap();
        action.invoke(&ActionInput::text("1")).await.unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    assert_eq!(Some(StoredValue::Integer(2)), store.get(COUNTER_KEY).await.unwrap());

    // somebody else wrote the counter as text, e.g. from the cli
    store.set(COUNTER_KEY, StoredValue::from("40")).await.unwrap();
    let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("2")).await.unwrap();
    assert_eq!(ActionResult::new(40, Value::Integer(2)), result);
    assert_eq!(Some(StoredValue::Integer(41)), store.get(COUNTER_KEY).await.unwrap());
}

#[tokio::test]
async fn store_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("tally.yaml");
    tokio::fs::write(&config_path, "kv:\n  driver: sqlite\n  path: data/kv.sqlite\n  namespace: demo\n").await.unwrap();

    let config = RuntimeConfig::load(config_path).await.unwrap();
    let action = CounterAction::from_boxed(config.store().unwrap());
    action.invoke(&ActionInput::text("1")).await.unwrap();

    assert!(dir.path().join("data").join("kv.sqlite").exists());

    let backing = SqliteStore::new(dir.path().join("data").join("kv.sqlite")).unwrap();
    assert_eq!(Some(StoredValue::Integer(1)), backing.get("demo:counter").await.unwrap());
    assert_eq!(None, backing.get(COUNTER_KEY).await.unwrap());
}

/// Runs the action once against a store holding `counter`, returns the result and what was written back.
fn invoke_with_counter(counter: StoredValue) -> (ActionResult, Option<StoredValue>) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let store = TestStore::new().with_value(COUNTER_KEY, counter).await;
        let result = CounterAction::new(store.clone()).invoke(&ActionInput::text("1")).await.unwrap();
        (result, store.stored(COUNTER_KEY).await)
    })
}

proptest! {
    #[test]
    fn integer_counter_is_returned_and_incremented(n in 0..i64::MAX) {
        let (result, stored) = invoke_with_counter(StoredValue::Integer(n));
        prop_assert_eq!(n, result.count);
        prop_assert_eq!(Some(StoredValue::Integer(n + 1)), stored);
    }

    #[test]
    fn text_counter_is_returned_and_incremented(n in 0..i64::MAX) {
        let (result, stored) = invoke_with_counter(StoredValue::Text(n.to_string()));
        prop_assert_eq!(n, result.count);
        prop_assert_eq!(Some(StoredValue::Integer(n + 1)), stored);
    }

    #[test]
    fn non_numeric_text_counts_as_zero(text in "([a-zA-Z_.:,]{1,16}[0-9a-z ]{0,4})?") {
        let (result, stored) = invoke_with_counter(StoredValue::Text(text));
        prop_assert_eq!(0, result.count);
        prop_assert_eq!(Some(StoredValue::Integer(1)), stored);
    }
}
