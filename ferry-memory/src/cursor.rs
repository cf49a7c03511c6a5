use crate::{Command, ConnectionState, MemoryStore, connection::lock_state, parse, store::Output};
use ferry_core::{Cursor, Error, Result, Row, RowLabeled, RowNames, Value};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

static NEXT_CURSOR: AtomicUsize = AtomicUsize::new(1);

/// Cursor over the buffered result of the last statement.
pub struct MemoryCursor {
    connection: Arc<Mutex<ConnectionState>>,
    store: Arc<MemoryStore>,
    name: Option<String>,
    labels: RowNames,
    rows: VecDeque<Row>,
    rowcount: Option<u64>,
    closed: bool,
}

impl MemoryCursor {
    pub(crate) fn new(
        connection: Arc<Mutex<ConnectionState>>,
        store: Arc<MemoryStore>,
        named: bool,
    ) -> Self {
        Self {
            connection,
            store,
            name: named.then(|| {
                format!("ferry_cursor_{}", NEXT_CURSOR.fetch_add(1, Ordering::Relaxed))
            }),
            labels: RowNames::from([]),
            rows: VecDeque::new(),
            rowcount: None,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::msg("The cursor is closed"));
        }
        Ok(())
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<Output> {
        let mut connection = lock_state(&self.connection);
        self.store.record(connection.id, sql, params);
        let output = match parse(sql, params)? {
            Command::Begin => {
                if connection.in_transaction {
                    log::warn!("Connection {} is already in a transaction", connection.id);
                }
                connection.in_transaction = true;
                connection.undo.clear();
                Output::default()
            }
            Command::Commit => {
                connection.in_transaction = false;
                connection.undo.clear();
                Output::default()
            }
            Command::Rollback => {
                self.store.rollback(&mut connection.undo);
                connection.in_transaction = false;
                Output::default()
            }
            command => {
                let undo = if connection.in_transaction {
                    Some(&mut connection.undo)
                } else {
                    None
                };
                self.store.apply(command, undo)?
            }
        };
        Ok(output)
    }
}

impl Cursor for MemoryCursor {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        // Every statement is a suspension point, like a round trip to a server
        tokio::task::yield_now().await;
        self.check_open()?;
        let output = self.run(sql, params)?;
        self.labels = output.labels.unwrap_or_else(|| RowNames::from([]));
        self.rows = output.rows.into();
        self.rowcount = Some(output.rowcount);
        Ok(())
    }

    async fn fetchone(&mut self) -> Result<Option<RowLabeled>> {
        self.check_open()?;
        Ok(self
            .rows
            .pop_front()
            .map(|values| RowLabeled::new(self.labels.clone(), values)))
    }

    fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
