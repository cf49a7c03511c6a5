//! Asynchronous execution layer for query objects built synchronously.
//!
//! A [`Database`] owns a lazily created connection pool, every concurrent task works
//! through its own [`Session`] with its own transaction. Statements run behind
//! [`DeferredCursor`]s and their results are read lazily through [`ResultWrapper`] or
//! resolved at once with [`Session::run`].
pub use ferry_core::*;
