use crate::{
    Connection, ConnectionOf, Context, Cursor, CursorOf, DatabaseConfig, DbError, Driver, Error,
    Pool, Result, RowLabeled, Session, SqlWriter, Value, truncate_long,
};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Handle over one database: driver, settings and the lazily created pool.
///
/// The pool is created on first use, exactly once even under concurrent first use.
/// A creation failure is remembered: every later request fails with
/// [`DbError::PoolUnavailable`] and nothing is retried.
pub struct Database<D: Driver> {
    driver: D,
    writer: D::SqlWriter,
    config: DatabaseConfig,
    pool: OnceCell<std::result::Result<Arc<D::Pool>, String>>,
}

impl<D: Driver> Database<D> {
    pub fn new(driver: D, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            writer: driver.sql_writer(),
            driver,
            config,
            pool: OnceCell::new(),
        })
    }

    /// Build the handle from a connection URL whose scheme must be the driver name.
    pub fn open(driver: D, url: &str) -> Result<Self> {
        let config = DatabaseConfig::from_url(url)?;
        if config.driver != D::NAME {
            let error = Error::new(DbError::Configuration(format!(
                "The URL `{}` is not for the driver `{}`",
                url,
                D::NAME
            )));
            log::error!("{:#}", error);
            return Err(error);
        }
        Self::new(driver, config)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn sql_writer(&self) -> &dyn SqlWriter {
        self.writer.as_dyn()
    }

    /// New per-task context over this database.
    pub fn session(self: &Arc<Self>) -> Session<D> {
        Session::new(self.clone())
    }

    pub async fn pool(&self) -> Result<Arc<D::Pool>> {
        let pool = self
            .pool
            .get_or_init(|| async {
                log::trace!("Creating the {} connection pool", D::NAME);
                match self.driver.connect(&self.config).await {
                    Ok(pool) => Ok(Arc::new(pool)),
                    Err(e) => {
                        let e = e.context(format!(
                            "While creating the {} connection pool for `{}`",
                            D::NAME,
                            self.config.database
                        ));
                        log::error!("{:#}", e);
                        Err(format!("{:#}", e))
                    }
                }
            })
            .await;
        match pool {
            Ok(pool) => Ok(pool.clone()),
            Err(message) => Err(DbError::PoolUnavailable(message.clone()).into()),
        }
    }

    /// Check out a connection, waiting while the pool is exhausted.
    pub async fn get_connection(&self) -> Result<PooledConnection<D>> {
        let pool = self.pool().await?;
        let connection = pool.acquire().await.map_err(|e| {
            let e = e.context("While acquiring a connection from the pool");
            log::error!("{:#}", e);
            e
        })?;
        log::trace!("Connection acquired");
        Ok(PooledConnection {
            connection: Some(connection),
            pool,
        })
    }

    /// Cursor on `connection` or, when it is `None`, on a fresh connection owned by the cursor.
    pub async fn get_cursor(
        &self,
        connection: Option<&mut PooledConnection<D>>,
    ) -> Result<BoundCursor<D>> {
        match connection {
            Some(connection) => Ok(BoundCursor {
                cursor: connection.cursor().await?,
                connection: None,
            }),
            None => {
                let mut connection = self.get_connection().await?;
                Ok(BoundCursor {
                    cursor: connection.cursor().await?,
                    connection: Some(connection),
                })
            }
        }
    }
}

/// A checked out connection, back to the pool when dropped.
pub struct PooledConnection<D: Driver> {
    connection: Option<ConnectionOf<D>>,
    pool: Arc<D::Pool>,
}

impl<D: Driver> PooledConnection<D> {
    pub async fn cursor(&mut self) -> Result<CursorOf<D>> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(DbError::TransactionState("The connection was already released".into()).into());
        };
        connection.cursor().await
    }

    /// Execute a statement that produces no rows, closing its cursor.
    pub async fn run(&mut self, sql: &str) -> Result<()> {
        let mut cursor = self.cursor().await?;
        let result = cursor
            .execute(sql, &[])
            .await
            .with_context(|| format!("While executing `{}`", sql));
        cursor.close();
        result.map_err(|e| {
            log::error!("{:#}", e);
            e
        })
    }

    pub fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            log::trace!("Connection released");
            self.pool.release(connection);
        }
    }

    /// Return the connection as not reusable.
    pub fn discard(mut self) {
        if let Some(connection) = self.connection.take() {
            log::trace!("Connection discarded");
            self.pool.discard(connection);
        }
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::trace!("Connection released on drop");
            self.pool.release(connection);
        }
    }
}

/// Driver cursor together with the connection it owns, if any.
///
/// Closing the cursor gives the owned connection back to the pool.
pub struct BoundCursor<D: Driver> {
    cursor: CursorOf<D>,
    connection: Option<PooledConnection<D>>,
}

impl<D: Driver> BoundCursor<D> {
    pub(crate) fn new(cursor: CursorOf<D>, connection: Option<PooledConnection<D>>) -> Self {
        Self { cursor, connection }
    }

    pub(crate) fn new_owning(mut cursor: BoundCursor<D>, connection: PooledConnection<D>) -> Self {
        cursor.connection = Some(connection);
        cursor
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.cursor
            .execute(sql, params)
            .await
            .with_context(|| format!("While executing the query:\n{}", truncate_long!(sql)))
            .map_err(|e| {
                log::error!("{:#}", e);
                e
            })
    }

    pub async fn fetchone(&mut self) -> Result<Option<RowLabeled>> {
        self.cursor.fetchone().await
    }

    pub async fn fetchall(&mut self) -> Result<Vec<RowLabeled>> {
        self.cursor.fetchall().await
    }

    pub fn rowcount(&self) -> Option<u64> {
        self.cursor.rowcount()
    }

    pub fn name(&self) -> Option<&str> {
        self.cursor.name()
    }

    /// True when the cursor checked out its own connection.
    pub fn owns_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Close the cursor and release the owned connection. Closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.cursor.is_closed() {
            log::trace!("Cursor closed");
            self.cursor.close();
        }
        if let Some(connection) = self.connection.take() {
            connection.release();
        }
    }
}
