//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. Errors fall in
//! three families:
//!
//! - **Type errors**: a typed accessor found a primitive of another type, or a
//!   Sequence was addressed with a non-index key.
//! - **Structural errors**: a path continued through a primitive, an index was
//!   out of range, or an assignment would have created a reference cycle.
//! - **Invariant violations**: the scheduler's recursion ceiling was exceeded,
//!   or a rollback found live state that no prediction accounts for. These
//!   indicate a logic error in calling code.
//!
//! Errors returned from user callbacks (observers, renderers, sort keys) do
//! not propagate. They are handed to a single process-wide handler, see
//! [`set_error_handler`].

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use crate::store::Key;

/// Errors produced by the store, the scheduler and the ordering primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A typed accessor or container found a value of the wrong type.
    #[error("type error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    /// A path tried to continue through a primitive value.
    #[error("cannot index into {found} at key {key}")]
    ThroughPrimitive { key: Key, found: &'static str },

    /// A Sequence index lies too far beyond the current length.
    #[error("sequence index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Assigning the container would make it reachable from itself.
    #[error("assignment would create a reference cycle at key {key}")]
    Cycle { key: Key },

    /// The scheduler ran more passes than the configured ceiling.
    #[error("too many recursive updates ({limit} passes)")]
    RecursionLimit { limit: usize },

    /// Rolling back predictions found a value no prediction accounts for.
    #[error("rollback mismatch at key {key}: expected {expected}, found {found}")]
    RollbackMismatch {
        key: Key,
        expected: String,
        found: String,
    },

    /// A fractional key contains characters outside the digit alphabet or a
    /// trailing zero digit.
    #[error("invalid fractional key {0:?}")]
    InvalidKey(String),

    /// No key exists between the requested bounds.
    #[error("no key between {lo:?} and {hi:?}")]
    KeyOrder {
        lo: Option<String>,
        hi: Option<String>,
    },

    /// A configuration document could not be parsed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A user callback failed.
    #[error("{0}")]
    Callback(String),
}

impl Error {
    /// Build a callback error from anything printable.
    pub fn callback(msg: impl std::fmt::Display) -> Self {
        Error::Callback(msg.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Signature of the global error handler.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

static ERROR_HANDLER: OnceLock<RwLock<Option<ErrorHandler>>> = OnceLock::new();

fn handler_slot() -> &'static RwLock<Option<ErrorHandler>> {
    ERROR_HANDLER.get_or_init(|| RwLock::new(None))
}

/// Replace the global error handler, returning the previous one.
///
/// Passing `None` restores the default handler, which logs the error through
/// `tracing`.
pub fn set_error_handler(handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
    std::mem::replace(&mut *handler_slot().write(), handler)
}

/// Hand an error to the global handler.
pub fn report_error(error: &Error) {
    // Clone out of the lock so a handler may replace itself.
    let handler = handler_slot().read().clone();
    match handler {
        Some(handler) => handler(error),
        None => tracing::error!(%error, "reactive callback failed"),
    }
}
