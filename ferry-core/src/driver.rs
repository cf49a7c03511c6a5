use crate::{DatabaseConfig, Result, RowLabeled, SqlWriter, Value};
use std::future::Future;

/// Entry point of a backend: knows its name, how to write the few statements the
/// execution layer issues by itself and how to build a connection pool.
pub trait Driver: Send + Sync + 'static {
    type Pool: Pool;
    type SqlWriter: SqlWriter;

    /// URL scheme accepted by this driver.
    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;

    /// Create the pool. Called at most once per [`crate::Database`].
    fn connect(&self, config: &DatabaseConfig) -> impl Future<Output = Result<Self::Pool>> + Send;
}

/// A bounded set of reusable connections shared by every task of a database handle.
///
/// `acquire` must wait (not fail) while all the connections are checked out.
pub trait Pool: Send + Sync + 'static {
    type Connection: Connection;

    fn acquire(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Give back a connection that can be reused.
    fn release(&self, connection: Self::Connection);

    /// Give back a connection that must not be reused (it may hold an open transaction).
    fn discard(&self, connection: Self::Connection) {
        drop(connection);
    }
}

pub trait Connection: Send + 'static {
    type Cursor: Cursor;

    fn cursor(&mut self) -> impl Future<Output = Result<Self::Cursor>> + Send;
}

/// Handle over one statement execution and its pending results.
pub trait Cursor: Send + 'static {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Next row or `None` once the results are exhausted.
    fn fetchone(&mut self) -> impl Future<Output = Result<Option<RowLabeled>>> + Send;

    fn fetchall(&mut self) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send {
        async move {
            let mut rows = Vec::new();
            while let Some(row) = self.fetchone().await? {
                rows.push(row);
            }
            Ok(rows)
        }
    }

    /// Rows produced or affected by the last statement, when known.
    fn rowcount(&self) -> Option<u64>;

    /// Name of a server side cursor, `None` for client side ones.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Closing twice is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

pub type ConnectionOf<D> = <<D as Driver>::Pool as Pool>::Connection;
pub type CursorOf<D> = <ConnectionOf<D> as Connection>::Cursor;
