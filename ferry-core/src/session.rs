use crate::{
    BoundCursor, Database, DbError, DeferredCursor, Driver, Error, Result, Statement, Transaction,
    TransactionId, TransactionState, Value,
};
use std::sync::Arc;

/// Per-task context: autocommit flag and current transaction.
///
/// Every concurrent logical task works through its own session. Sessions of the same
/// [`Database`] share the pool and nothing else, so a transaction and its connection
/// are never visible to another task.
pub struct Session<D: Driver> {
    database: Arc<Database<D>>,
    pub(crate) autocommit: bool,
    pub(crate) transaction: Option<Transaction<D>>,
}

impl<D: Driver> Session<D> {
    pub fn new(database: Arc<Database<D>>) -> Self {
        Self {
            autocommit: database.config().autocommit,
            database,
            transaction: None,
        }
    }

    pub fn database(&self) -> &Arc<Database<D>> {
        &self.database
    }

    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn set_autocommit(&mut self, value: bool) {
        self.autocommit = value;
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(Transaction::id)
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
            .as_ref()
            .map(Transaction::state)
            .unwrap_or_default()
    }

    /// Execute a statement and return its cursor.
    ///
    /// Inside a transaction it runs on the transaction connection and never commits.
    /// Outside, it checks out a connection (owned by the returned cursor) and, if
    /// `require_commit`, issues `COMMIT` on it right after the statement. Outside a
    /// transaction with autocommit disabled nothing runs.
    pub async fn execute_sql(
        &mut self,
        sql: &str,
        params: &[Value],
        require_commit: bool,
    ) -> Result<BoundCursor<D>> {
        if let Some(transaction) = self.transaction.as_mut() {
            let connection = transaction.connection_mut()?;
            let mut cursor = BoundCursor::new(connection.cursor().await?, None);
            cursor.execute(sql, params).await?;
            return Ok(cursor);
        }
        if !self.autocommit {
            let error = Error::new(DbError::TransactionState(
                "With autocommit disabled statements must run inside a transaction".into(),
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        let mut connection = self.database.get_connection().await?;
        let mut cursor = BoundCursor::new(connection.cursor().await?, None);
        cursor.execute(sql, params).await?;
        if require_commit {
            let mut commit = String::new();
            self.database.sql_writer().write_transaction_commit(&mut commit);
            connection.run(&commit).await?;
        }
        Ok(BoundCursor::new_owning(cursor, connection))
    }

    /// Deferred cursor over `statement`, executed the first time it is awaited.
    pub fn cursor(&mut self, statement: Statement, require_commit: bool) -> DeferredCursor<'_, D> {
        DeferredCursor::new(async move {
            self.execute_sql(&statement.sql, &statement.params, require_commit)
                .await
        })
    }
}
