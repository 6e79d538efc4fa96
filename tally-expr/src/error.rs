use thiserror::Error;

/// Error that may be returned when parsing or evaluating an expression.
/// Positions are character offsets into the expression text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unexpected character {found:?} at position {position}")]
    UnexpectedChar {
        found: char,
        position: usize,
    },

    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString {
        position: usize,
    },

    #[error("invalid number literal {literal:?} at position {position}")]
    InvalidNumber {
        literal: String,
        position: usize,
    },

    #[error("unknown identifier {name:?} at position {position}")]
    UnknownIdentifier {
        name: String,
        position: usize,
    },

    #[error("unexpected token {found} at position {position}")]
    UnexpectedToken {
        found: String,
        position: usize,
    },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression is nested too deeply at position {position}")]
    TooDeep {
        position: usize,
    },

    /// Binary operator applied to operands it is not defined for, e.g. `true * 2`
    #[error("operator {operator} cannot be applied to {left} and {right}")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("operator {operator} cannot be applied to {operand}")]
    UnaryTypeMismatch {
        operator: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {operator}")]
    Overflow {
        operator: &'static str,
    },

    /// Float arithmetic produced infinity or NaN
    #[error("non-finite result in {operator}")]
    NonFinite {
        operator: &'static str,
    },
}
