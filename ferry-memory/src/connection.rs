use crate::{MemoryCursor, MemoryStore, Undo};
use ferry_core::{Connection, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedSemaphorePermit;

#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    pub id: usize,
    pub in_transaction: bool,
    pub undo: Vec<Undo>,
}

pub(crate) fn lock_state(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Connection checked out from a [`crate::MemoryPool`].
///
/// An open transaction is rolled back when the connection is dropped.
pub struct MemoryConnection {
    pub(crate) state: Arc<Mutex<ConnectionState>>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) named_cursors: bool,
    pub(crate) permit: Option<OwnedSemaphorePermit>,
}

impl MemoryConnection {
    pub fn id(&self) -> usize {
        lock_state(&self.state).id
    }

    pub fn in_transaction(&self) -> bool {
        lock_state(&self.state).in_transaction
    }

    /// Roll back an open transaction.
    pub(crate) fn reset(&self) {
        let mut state = lock_state(&self.state);
        if state.in_transaction {
            log::warn!(
                "Connection {} left with an open transaction, rolling it back",
                state.id
            );
            self.store.rollback(&mut state.undo);
            state.in_transaction = false;
        }
    }
}

impl Connection for MemoryConnection {
    type Cursor = MemoryCursor;

    async fn cursor(&mut self) -> Result<MemoryCursor> {
        Ok(MemoryCursor::new(
            self.state.clone(),
            self.store.clone(),
            self.named_cursors,
        ))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.reset();
    }
}
