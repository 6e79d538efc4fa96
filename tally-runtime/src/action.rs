use {
    tracing::debug,
    tally_common::{ActionInput, ActionResult, Value},
    crate::{
        error::ActionError,
        kv::{BoxedStore, KvStore, StoredValue},
    },
};

/// Key the shared counter lives under.
pub const COUNTER_KEY: &str = "counter";

/// Action that evaluates the `text` field of its input and bumps a shared counter.
///
/// The counter is read and then written without any locking, so two concurrent invocations
/// may read the same value and one increment is lost.
#[derive(Clone)]
pub struct CounterAction {
    store: BoxedStore,
}

/// Stage an invocation is in. Invocations always pass through every stage in order, the only
/// exception being an evaluation failure that ends the invocation in `Evaluating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Start,
    Evaluating,
    Reading,
    Writing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    NotIssued,
    Succeeded,
    Failed {
        reason: String,
    },
}

/// What happened during an invocation. Store failures end up here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationEvent {
    pub states: Vec<InvocationState>,
    pub read: StoreOutcome,
    pub write: StoreOutcome,
}

impl InvocationEvent {
    fn new() -> Self {
        Self {
            states: vec![InvocationState::Start],
            read: StoreOutcome::NotIssued,
            write: StoreOutcome::NotIssued,
        }
    }

    fn enter(&mut self, state: InvocationState) {
        self.states.push(state);
    }
}

impl CounterAction {
    pub fn new<T: KvStore + 'static>(store: T) -> Self {
        Self::from_boxed(BoxedStore::new(store))
    }

    pub fn from_boxed(store: BoxedStore) -> Self {
        Self { store }
    }

    pub async fn invoke(&self, input: &ActionInput) -> Result<ActionResult, ActionError> {
        self.invoke_traced(input).await.map(|(result, _event)| result)
    }

    pub async fn invoke_traced(&self, input: &ActionInput) -> Result<(ActionResult, InvocationEvent), ActionError> {
        let mut event = InvocationEvent::new();

        event.enter(InvocationState::Evaluating);
        let result = evaluate_input(input)?;

        event.enter(InvocationState::Reading);
        let count = match self.store.get(COUNTER_KEY).await {
            Ok(reply) => {
                event.read = StoreOutcome::Succeeded;
                as_count(reply.as_ref())
            },
            Err(err) => {
                debug!("failed to read counter, starting from zero: {err:?}");
                event.read = StoreOutcome::Failed { reason: err.to_string() };
                0
            }
        };

        event.enter(InvocationState::Writing);
        event.write = match self.store.set(COUNTER_KEY, StoredValue::Integer(count.saturating_add(1))).await {
            Ok(()) => StoreOutcome::Succeeded,
            Err(err) => StoreOutcome::Failed { reason: err.to_string() },
        };

        event.enter(InvocationState::Done);
        Ok((ActionResult::new(count, result), event))
    }
}

fn evaluate_input(input: &ActionInput) -> Result<Value, ActionError> {
    let text = match input.get("text") {
        Some(serde_json::Value::String(v)) => v,
        Some(other) => return Err(ActionError::TextNotString { found: json_type_name(other) }),
        None => return Err(ActionError::MissingText),
    };

    let result = tally_expr::evaluate(text)?;
    debug!(text = %text, result = %result, "evaluated expression");
    Ok(result)
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Turns whatever the store replied with into a counter value. Anything that does not look
/// like a number counts as zero.
pub fn as_count(reply: Option<&StoredValue>) -> i64 {
    match reply {
        Some(StoredValue::Integer(v)) => *v,
        Some(StoredValue::Text(v)) => parse_int_prefix(v).unwrap_or(0),
        None => 0,
    }
}

/// Base-10 parse of the leading integer in `text`: leading whitespace and a sign are allowed,
/// anything after the digits is ignored.
fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let sign_len = text.len() - unsigned.len();

    let digits = unsigned.bytes().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    text[..sign_len + digits].parse().ok()
}
