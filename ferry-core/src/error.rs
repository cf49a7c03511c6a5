use crate::{Error, Value, printable_params};
use std::sync::Arc;
use thiserror::Error;

/// Failures raised by the execution layer itself.
///
/// They travel inside [`crate::Error`], inspect them with `error.downcast_ref::<DbError>()`.
/// Driver errors are not converted, they pass through with added context.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// `get()` found zero matching rows.
    #[error("Instance matching query does not exist:\nSQL: {sql}\nPARAMS: {}", printable_params(.params))]
    NotFound { sql: String, params: Vec<Value> },

    /// The pool for this database handle could not be created, it is never retried.
    #[error("The connection pool is unavailable: {0}")]
    PoolUnavailable(String),

    /// Transaction or connection used in a state that does not allow it.
    #[error("Invalid transaction state: {0}")]
    TransactionState(String),

    /// Operation that would need the whole result set while streaming.
    #[error("`{0}` is not supported in async mode, fetch the results explicitly first")]
    Unsupported(&'static str),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid slice: {0}")]
    InvalidSlice(String),

    #[error("Index {0} is out of range")]
    IndexOutOfRange(i64),

    /// Failure observed through a memoized future shared by several consumers.
    #[error("{0:#}")]
    Shared(Arc<Error>),
}

impl DbError {
    /// Rebuild an error coming out of a shared future, keeping the variant when possible.
    pub fn from_shared(error: Arc<Error>) -> Error {
        match error.downcast_ref::<DbError>() {
            Some(e) => e.clone().into(),
            None => DbError::Shared(error).into(),
        }
    }
}

/// Check whether `error` carries the given [`DbError`] variant.
pub fn is_db_error(error: &Error, predicate: impl FnOnce(&DbError) -> bool) -> bool {
    error.downcast_ref::<DbError>().map_or(false, predicate)
}
