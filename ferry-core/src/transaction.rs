use crate::{Context, DbError, Driver, Error, PooledConnection, Result, Session};
use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    #[default]
    Inactive,
    Starting,
    Active,
    Committing,
    RollingBack,
}

/// How a transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

impl Completion {
    fn state(self) -> TransactionState {
        match self {
            Completion::Commit => TransactionState::Committing,
            Completion::Rollback => TransactionState::RollingBack,
        }
    }
}

impl Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Completion::Commit => "commit",
            Completion::Rollback => "rollback",
        })
    }
}

/// The current unit of work of a [`Session`].
///
/// Owns the connection on which `BEGIN` was issued until `COMMIT` or `ROLLBACK`
/// gives it back to the pool.
pub struct Transaction<D: Driver> {
    id: TransactionId,
    saved_autocommit: bool,
    connection: Option<PooledConnection<D>>,
    state: TransactionState,
}

impl<D: Driver> Transaction<D> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut PooledConnection<D>> {
        match (self.state, self.connection.as_mut()) {
            (TransactionState::Active, Some(connection)) => Ok(connection),
            (state, _) => {
                let error = Error::new(DbError::TransactionState(format!(
                    "Transaction {} cannot run statements while {:?}",
                    self.id, state
                )));
                log::error!("{:#}", error);
                Err(error)
            }
        }
    }
}

impl<D: Driver> Drop for Transaction<D> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::warn!(
                "Transaction {} dropped while {:?}, its connection is discarded",
                self.id,
                self.state
            );
            connection.discard();
        }
    }
}

impl<D: Driver> Session<D> {
    /// Start a transaction, or join the current one.
    ///
    /// Joining issues nothing and returns the id of the running transaction.
    pub async fn begin(&mut self) -> Result<TransactionId> {
        if let Some(transaction) = &self.transaction {
            log::warn!(
                "Transaction {} is already active, nested begin joins it",
                transaction.id
            );
            return Ok(transaction.id);
        }
        let id = TransactionId::next();
        let saved_autocommit = self.autocommit;
        self.transaction = Some(Transaction {
            id,
            saved_autocommit,
            connection: None,
            state: TransactionState::Starting,
        });
        self.autocommit = false;
        log::debug!("Transaction {} starting", id);
        match self.start_transaction().await {
            Ok(connection) => {
                if let Some(transaction) = self.transaction.as_mut() {
                    transaction.connection = Some(connection);
                    transaction.state = TransactionState::Active;
                }
                log::debug!("Transaction {} active", id);
                Ok(id)
            }
            Err(e) => {
                self.transaction = None;
                self.autocommit = saved_autocommit;
                let e = e.context(format!("While starting transaction {}", id));
                log::error!("{:#}", e);
                Err(e)
            }
        }
    }

    async fn start_transaction(&self) -> Result<PooledConnection<D>> {
        let mut connection = self.database().get_connection().await?;
        let mut sql = String::new();
        self.database().sql_writer().write_transaction_begin(&mut sql);
        connection.run(&sql).await?;
        Ok(connection)
    }

    /// Commit the current transaction. `None` when there was none, nothing is issued then.
    pub async fn commit(&mut self) -> Result<Option<TransactionId>> {
        self.complete(Completion::Commit, false).await
    }

    pub async fn rollback(&mut self) -> Result<Option<TransactionId>> {
        self.complete(Completion::Rollback, false).await
    }

    /// Commit the work done so far and keep the transaction open on the same connection.
    pub async fn commit_and_restart(&mut self) -> Result<Option<TransactionId>> {
        self.complete(Completion::Commit, true).await
    }

    pub async fn rollback_and_restart(&mut self) -> Result<Option<TransactionId>> {
        self.complete(Completion::Rollback, true).await
    }

    async fn complete(
        &mut self,
        completion: Completion,
        restart: bool,
    ) -> Result<Option<TransactionId>> {
        let Some(mut transaction) = self.transaction.take() else {
            log::debug!("No transaction to {}", completion);
            return Ok(None);
        };
        let id = transaction.id;
        transaction.state = completion.state();
        log::debug!("Transaction {} {:?}", id, transaction.state);
        let Some(mut connection) = transaction.connection.take() else {
            self.autocommit = transaction.saved_autocommit;
            return Ok(Some(id));
        };
        let database = self.database().clone();
        let writer = database.sql_writer();
        let mut sql = String::new();
        match completion {
            Completion::Commit => writer.write_transaction_commit(&mut sql),
            Completion::Rollback => writer.write_transaction_rollback(&mut sql),
        }
        let result = connection.run(&sql).await;
        if restart && result.is_ok() {
            sql.clear();
            writer.write_transaction_begin(&mut sql);
            match connection.run(&sql).await {
                Ok(()) => {
                    transaction.connection = Some(connection);
                    transaction.state = TransactionState::Active;
                    self.transaction = Some(transaction);
                    log::debug!("Transaction {} restarted", id);
                    return Ok(Some(id));
                }
                Err(e) => {
                    connection.release();
                    self.autocommit = transaction.saved_autocommit;
                    return Err(e.context(format!("While restarting transaction {}", id)));
                }
            }
        }
        connection.release();
        self.autocommit = transaction.saved_autocommit;
        result
            .map(|_| Some(id))
            .with_context(|| format!("While trying to {} transaction {}", completion, id))
    }

    /// Run `body` inside a transaction.
    ///
    /// If this scope started the transaction, it commits when `body` returns `Ok` and rolls
    /// back on `Err`. A scope that joined a running transaction leaves the commit to its
    /// owner but still rolls back on `Err`, there are no savepoints to fall back to.
    pub async fn transaction<T, F>(&mut self, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session<D>) -> Result<T>,
    {
        let joined = self.in_transaction();
        if !joined {
            self.begin().await?;
        }
        let result = body(self).await;
        match &result {
            Ok(..) if !joined => {
                self.commit().await?;
            }
            Ok(..) => {}
            Err(e) => {
                log::debug!("Transaction body failed, rolling back: {:#}", e);
                if let Err(e) = self.rollback().await {
                    log::error!("{:#}", e);
                }
            }
        }
        result
    }
}
