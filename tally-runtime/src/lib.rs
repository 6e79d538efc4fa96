pub use {
    tally_common::{ActionInput, ActionResult, Value},
    crate::action::{CounterAction, COUNTER_KEY},
};

pub mod action;
pub mod config;
pub mod error;
pub mod kv;
