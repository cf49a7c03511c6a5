use crate::{ConnectionState, MemoryConnection, MemoryStore};
use ferry_core::{DatabaseConfig, Error, Pool, Result};
use std::sync::{Arc, Mutex, MutexGuard, atomic::Ordering};
use tokio::sync::Semaphore;

/// Pool with at most `max_connections` connections checked out at once.
///
/// Acquiring waits for a free slot, released connections are kept idle and reused.
pub struct MemoryPool {
    store: Arc<MemoryStore>,
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<Arc<Mutex<ConnectionState>>>>,
    named_cursors: bool,
}

impl MemoryPool {
    pub(crate) fn new(
        store: Arc<MemoryStore>,
        config: &DatabaseConfig,
        named_cursors: bool,
    ) -> Self {
        let pool = Self {
            store,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            idle: Mutex::new(Vec::new()),
            named_cursors,
        };
        let opened: Vec<_> = (0..config.min_connections).map(|_| pool.open()).collect();
        *pool.idle() = opened;
        pool
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Arc<Mutex<ConnectionState>>>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self) -> Arc<Mutex<ConnectionState>> {
        let id = self.store.opened.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("Memory connection {} opened", id);
        Arc::new(Mutex::new(ConnectionState {
            id,
            ..Default::default()
        }))
    }

    /// Connections opened and not checked out.
    pub fn idle_connections(&self) -> usize {
        self.idle().len()
    }

    /// Slots still available before acquiring waits.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl Pool for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::new(e).context("The memory pool is closed"))?;
        let popped = self.idle().pop();
        let state = popped.unwrap_or_else(|| self.open());
        self.store.acquired.fetch_add(1, Ordering::SeqCst);
        self.store
            .peak_in_use
            .fetch_max(self.store.in_use(), Ordering::SeqCst);
        Ok(MemoryConnection {
            state,
            store: self.store.clone(),
            named_cursors: self.named_cursors,
            permit: Some(permit),
        })
    }

    fn release(&self, mut connection: MemoryConnection) {
        self.store.released.fetch_add(1, Ordering::SeqCst);
        connection.reset();
        self.idle().push(connection.state.clone());
        // The slot frees after the connection is back in the idle list
        drop(connection.permit.take());
    }

    fn discard(&self, connection: MemoryConnection) {
        self.store.discarded.fetch_add(1, Ordering::SeqCst);
        log::trace!("Memory connection {} discarded", connection.id());
        drop(connection);
    }
}
