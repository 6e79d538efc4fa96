use {
    std::cmp::Ordering,
    tally_common::Value,
    crate::{
        error::EvalError,
        parser::{BinaryOp, Expr, UnaryOp},
    },
};

impl Expr {
    pub fn eval(&self) -> Result<Value, EvalError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Unary { op, operand } => eval_unary(*op, operand.eval()?),
            Self::Binary { op: BinaryOp::And, left, right } => {
                let left = left.eval()?;
                if left.is_truthy() { right.eval() } else { Ok(left) }
            }
            Self::Binary { op: BinaryOp::Or, left, right } => {
                let left = left.eval()?;
                if left.is_truthy() { Ok(left) } else { right.eval() }
            }
            Self::Binary { op, left, right } => eval_binary(*op, left.eval()?, right.eval()?),
        }
    }
}

fn eval_unary(op: UnaryOp, operand: Value) -> Result<Value, EvalError> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Integer(v)) => v.checked_neg()
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { operator: op.symbol() }),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Plus, v @ (Value::Integer(_) | Value::Float(_))) => Ok(v),
        (op, other) => Err(EvalError::UnaryTypeMismatch {
            operator: op.symbol(),
            operand: other.type_name(),
        }),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => divide(left, right),
        BinaryOp::Rem => remainder(left, right),
        BinaryOp::Pow => power(left, right),
        BinaryOp::Eq => Ok(Value::Bool(equals(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, &left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        // short-circuiting operators are handled in Expr::eval
        BinaryOp::And | BinaryOp::Or => Err(mismatch(op, &left, &right)),
    }
}

fn add(left: Value, right: Value) -> Result<Value, EvalError> {
    match (&left, &right) {
        (Value::Text(_), _) | (_, Value::Text(_)) => Ok(Value::Text(format!("{left}{right}"))),
        _ => arithmetic(BinaryOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

fn arithmetic(
    op: BinaryOp,
    left: Value,
    right: Value,
    on_integers: fn(i64, i64) -> Option<i64>,
    on_floats: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (&left, &right) {
        (Value::Integer(a), Value::Integer(b)) => on_integers(*a, *b)
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { operator: op.symbol() }),
        _ => {
            let (a, b) = numbers(op, &left, &right)?;
            finite(op, on_floats(a, b))
        }
    }
}

fn divide(left: Value, right: Value) -> Result<Value, EvalError> {
    let op = BinaryOp::Div;
    let (a, b) = numbers(op, &left, &right)?;
    if b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }

    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) if a.wrapping_rem(b) == 0 => a.checked_div(b)
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { operator: op.symbol() }),
        _ => finite(op, a / b),
    }
}

fn remainder(left: Value, right: Value) -> Result<Value, EvalError> {
    let op = BinaryOp::Rem;
    let (a, b) = numbers(op, &left, &right)?;
    if b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }

    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.checked_rem(b)
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { operator: op.symbol() }),
        _ => finite(op, a % b),
    }
}

fn power(left: Value, right: Value) -> Result<Value, EvalError> {
    let op = BinaryOp::Pow;
    match (&left, &right) {
        (Value::Integer(base), Value::Integer(exponent)) if *exponent >= 0 => {
            let result = match u32::try_from(*exponent) {
                Ok(exponent) => base.checked_pow(exponent),
                // only 0, 1 and -1 stay in range with exponents this large
                Err(_) => match *base {
                    0 | 1 => Some(*base),
                    -1 => Some(if exponent % 2 == 0 { 1 } else { -1 }),
                    _ => None,
                },
            };
            result.map(Value::Integer).ok_or(EvalError::Overflow { operator: op.symbol() })
        }
        _ => {
            let (a, b) = numbers(op, &left, &right)?;
            finite(op, a.powf(b))
        }
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(_), Some(_)) => compare_numbers(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        _ => compare_numbers(left, right).ok_or_else(|| mismatch(op, left, right)),
    }
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn numbers(op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64), EvalError> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(mismatch(op, left, right)),
    }
}

fn finite(op: BinaryOp, value: f64) -> Result<Value, EvalError> {
    if value.is_finite() {
        Ok(Value::Float(value))
    } else {
        Err(EvalError::NonFinite { operator: op.symbol() })
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        operator: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}
