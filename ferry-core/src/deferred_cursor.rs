use crate::{BoundCursor, DbError, Driver, Error, Result, RowLabeled};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::{future::Future, sync::Arc};
use tokio::sync::Mutex;

type SharedCursor<D> = Arc<Mutex<BoundCursor<D>>>;

/// Memoized "obtain the executed cursor" operation.
///
/// The first caller drives the acquisition and the statement execution, every other
/// caller (sequential or concurrent) observes the same outcome. Cloning shares the
/// same cursor, the statement is never issued twice.
pub struct DeferredCursor<'a, D: Driver> {
    cursor: Shared<BoxFuture<'a, std::result::Result<SharedCursor<D>, Arc<Error>>>>,
}

impl<'a, D: Driver> Clone for DeferredCursor<'a, D> {
    fn clone(&self) -> Self {
        Self {
            cursor: self.cursor.clone(),
        }
    }
}

impl<'a, D: Driver> DeferredCursor<'a, D> {
    pub fn new<F>(getter: F) -> Self
    where
        F: Future<Output = Result<BoundCursor<D>>> + Send + 'a,
    {
        Self {
            cursor: getter
                .map(|result| {
                    result
                        .map(|cursor| Arc::new(Mutex::new(cursor)))
                        .map_err(Arc::new)
                })
                .boxed()
                .shared(),
        }
    }

    pub async fn cursor(&self) -> Result<SharedCursor<D>> {
        self.cursor.clone().await.map_err(DbError::from_shared)
    }

    /// Run the statement now, without reading anything.
    pub async fn dispatch(&self) -> Result<()> {
        self.cursor().await.map(|_| ())
    }

    pub fn is_dispatched(&self) -> bool {
        self.cursor.peek().is_some()
    }

    pub async fn fetchone(&self) -> Result<Option<RowLabeled>> {
        let cursor = self.cursor().await?;
        let mut cursor = cursor.lock().await;
        cursor.fetchone().await
    }

    pub async fn fetchall(&self) -> Result<Vec<RowLabeled>> {
        let cursor = self.cursor().await?;
        let mut cursor = cursor.lock().await;
        cursor.fetchall().await
    }

    pub async fn rowcount(&self) -> Result<Option<u64>> {
        let cursor = self.cursor().await?;
        let cursor = cursor.lock().await;
        Ok(cursor.rowcount())
    }

    /// True for named (server side) cursors.
    pub async fn is_named(&self) -> Result<bool> {
        let cursor = self.cursor().await?;
        let cursor = cursor.lock().await;
        Ok(cursor.name().is_some())
    }

    pub async fn close(&self) -> Result<()> {
        let cursor = self.cursor().await?;
        cursor.lock().await.close();
        Ok(())
    }
}
