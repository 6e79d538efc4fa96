use {
    thiserror::Error,
    tally_expr::EvalError,
    crate::kv::StoreInitError,
};

/// Error that may be returned when an action is invoked. Store failures are never reported
/// here, an invocation only fails if its input cannot be evaluated.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("input does not contain \"text\" field")]
    MissingText,

    #[error("\"text\" field should be a string, got: {found}")]
    TextNotString {
        found: &'static str,
    },

    #[error("failed to evaluate expression: {0}")]
    Evaluation(#[from] EvalError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0:?}")]
    FailedToRead(std::io::Error),

    #[error("failed to parse config: {reason}")]
    FailedToParse {
        reason: String,
    },

    #[error("failed to init kv store: {0}")]
    StoreInit(#[from] StoreInitError),
}
