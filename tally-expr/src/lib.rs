//! Expression language used by counter actions to compute a result from user-supplied text.
//!
//! A small arithmetic grammar with javascript-like literals and operators. Nothing here can
//! reach outside of the evaluator: there are no identifiers besides `true`, `false` and `null`,
//! no calls and no assignment.
//!
//! ```
//! use tally_common::Value;
//!
//! assert_eq!(Value::Integer(2), tally_expr::evaluate("1+1").unwrap());
//! assert_eq!(Value::Text("hello".to_owned()), tally_expr::evaluate("'hello'").unwrap());
//! ```

pub use crate::{
    error::EvalError,
    parser::{parse, Expr, BinaryOp, UnaryOp, MAX_DEPTH},
};

use tally_common::Value;

mod error;
mod eval;
mod parser;
mod token;

/// Parses and evaluates `text` in one go.
pub fn evaluate(text: &str) -> Result<Value, EvalError> {
    parse(text)?.eval()
}
