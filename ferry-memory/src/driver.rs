use crate::{MemoryPool, MemoryStore};
use ferry_core::{DatabaseConfig, Driver, Error, GenericSqlWriter, Result};
use std::sync::{Arc, atomic::Ordering};

/// Driver over in-memory tables.
///
/// Clones share the same [`MemoryStore`], so the tables and the journal outlive the
/// database handles built on top of it.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    store: Arc<MemoryStore>,
    failing: bool,
    named_cursors: bool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose pool can never be created.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Every cursor is a named (server side) cursor, also enabled by `?named_cursors=true`.
    pub fn with_named_cursors(mut self) -> Self {
        self.named_cursors = true;
        self
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }
}

impl Driver for MemoryDriver {
    type Pool = MemoryPool;
    type SqlWriter = GenericSqlWriter;

    const NAME: &'static str = "memory";

    fn sql_writer(&self) -> GenericSqlWriter {
        GenericSqlWriter
    }

    async fn connect(&self, config: &DatabaseConfig) -> Result<MemoryPool> {
        tokio::task::yield_now().await;
        self.store.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            let error = Error::msg(format!(
                "Connection refused by the memory database `{}`",
                config.database
            ));
            log::error!("{:#}", error);
            return Err(error);
        }
        let named_cursors = self.named_cursors || config.option("named_cursors") == Some("true");
        log::trace!(
            "Memory pool for `{}` with {} connections",
            config.database,
            config.max_connections
        );
        Ok(MemoryPool::new(self.store.clone(), config, named_cursors))
    }
}
