use crate::{Command, Filter, Projection};
use ferry_core::{Error, Result, Row, RowNames, Value};
use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    next_key: i64,
}

impl Table {
    fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|v| v == name)
            .ok_or_else(|| Error::msg(format!("Column `{}` does not exist", name)))
    }

    fn predicate(&self, filter: &Filter) -> Result<Vec<(usize, Value)>> {
        filter
            .iter()
            .map(|(column, value)| Ok((self.column(column)?, value.clone())))
            .collect()
    }

    fn labels(&self, projection: &Projection) -> Result<(RowNames, Vec<usize>)> {
        let indexes = match projection {
            Projection::All => (0..self.columns.len()).collect(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|v| self.column(v))
                .collect::<Result<Vec<_>>>()?,
        };
        let labels = indexes.iter().map(|i| self.columns[*i].clone()).collect();
        Ok((labels, indexes))
    }

    fn key_position(&self, key: &Value) -> Option<usize> {
        self.rows.iter().rposition(|row| row.first() == Some(key))
    }
}

fn matches(row: &[Value], predicate: &[(usize, Value)]) -> bool {
    predicate.iter().all(|(i, value)| row.get(*i) == Some(value))
}

/// Reverse operation of a change made inside a transaction.
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    Created(String),
    Dropped(String, Table),
    Inserted { table: String, key: Value },
    Updated { table: String, key: Value, row: Vec<Value> },
    Deleted { table: String, position: usize, row: Vec<Value> },
}

/// A statement as received by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub connection: usize,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
pub(crate) struct Output {
    pub labels: Option<RowNames>,
    pub rows: Vec<Row>,
    pub rowcount: u64,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    journal: Vec<JournalEntry>,
}

/// Tables and bookkeeping shared by every pool and connection of a [`crate::MemoryDriver`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub(crate) connects: AtomicUsize,
    pub(crate) opened: AtomicUsize,
    pub(crate) acquired: AtomicUsize,
    pub(crate) released: AtomicUsize,
    pub(crate) discarded: AtomicUsize,
    pub(crate) peak_in_use: AtomicUsize,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every statement received so far, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    /// SQL text of the statements received so far.
    pub fn statements(&self) -> Vec<String> {
        self.lock().journal.iter().map(|v| v.sql.clone()).collect()
    }

    /// Number of statements starting with `prefix` (case insensitive).
    pub fn count_statements(&self, prefix: &str) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|v| {
                v.sql
                    .get(..prefix.len())
                    .is_some_and(|v| v.eq_ignore_ascii_case(prefix))
            })
            .count()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        self.lock().tables.get(name).cloned()
    }

    /// Pools created.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.acquired()
            .saturating_sub(self.released() + self.discarded())
    }

    /// Highest number of connections checked out at the same time.
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, connection: usize, sql: &str, params: &[Value]) {
        self.lock().journal.push(JournalEntry {
            connection,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }

    pub(crate) fn rollback(&self, undo: &mut Vec<Undo>) {
        let mut state = self.lock();
        while let Some(change) = undo.pop() {
            match change {
                Undo::Created(name) => {
                    state.tables.remove(&name);
                }
                Undo::Dropped(name, table) => {
                    state.tables.insert(name, table);
                }
                Undo::Inserted { table, key } => {
                    if let Some(table) = state.tables.get_mut(&table) {
                        if let Some(i) = table.key_position(&key) {
                            table.rows.remove(i);
                        }
                    }
                }
                Undo::Updated { table, key, row } => {
                    if let Some(table) = state.tables.get_mut(&table) {
                        if let Some(i) = table.key_position(&key) {
                            table.rows[i] = row;
                        }
                    }
                }
                Undo::Deleted {
                    table,
                    position,
                    row,
                } => {
                    if let Some(table) = state.tables.get_mut(&table) {
                        let position = position.min(table.rows.len());
                        table.rows.insert(position, row);
                    }
                }
            }
        }
    }

    /// Apply a data statement, pushing its reverse operations to `undo` when given.
    pub(crate) fn apply(
        &self,
        command: Command,
        mut undo: Option<&mut Vec<Undo>>,
    ) -> Result<Output> {
        let mut state = self.lock();
        let mut track = |change: Undo| {
            if let Some(undo) = undo.as_mut() {
                undo.push(change);
            }
        };
        match command {
            Command::CreateTable {
                name,
                columns,
                if_not_exists,
            } => {
                if state.tables.contains_key(&name) {
                    if if_not_exists {
                        return Ok(Output::default());
                    }
                    return Err(Error::msg(format!("Table `{}` already exists", name)));
                }
                state.tables.insert(
                    name.clone(),
                    Table {
                        columns,
                        rows: Vec::new(),
                        next_key: 1,
                    },
                );
                track(Undo::Created(name));
                Ok(Output::default())
            }
            Command::DropTable { name, if_exists } => match state.tables.remove(&name) {
                Some(table) => {
                    track(Undo::Dropped(name, table));
                    Ok(Output::default())
                }
                None if if_exists => Ok(Output::default()),
                None => Err(table_missing(&name)),
            },
            Command::Insert {
                table: name,
                columns,
                rows,
                returning,
            } => {
                let table = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| table_missing(&name))?;
                let indexes = match &columns {
                    Some(columns) => columns
                        .iter()
                        .map(|v| table.column(v))
                        .collect::<Result<Vec<_>>>()?,
                    None => (0..table.columns.len()).collect(),
                };
                let returning = returning.map(|v| table.labels(&v)).transpose()?;
                let mut output = Output {
                    labels: returning.as_ref().map(|(labels, _)| labels.clone()),
                    ..Default::default()
                };
                for values in rows {
                    if values.len() != indexes.len() {
                        return Err(Error::msg(format!(
                            "Expected {} values for `{}`, found {}",
                            indexes.len(),
                            name,
                            values.len()
                        )));
                    }
                    let mut row = vec![Value::Null; table.columns.len()];
                    for (i, value) in indexes.iter().zip(values) {
                        row[*i] = value;
                    }
                    // The first column is the key, assigned when missing
                    match row.first().cloned().unwrap_or_default() {
                        Value::Int64(Some(key)) => {
                            table.next_key = table.next_key.max(key + 1);
                        }
                        key if key.is_null() && !row.is_empty() => {
                            row[0] = Value::Int64(Some(table.next_key));
                            table.next_key += 1;
                        }
                        _ => {}
                    }
                    if let Some((_, indexes)) = &returning {
                        output
                            .rows
                            .push(indexes.iter().map(|i| row[*i].clone()).collect());
                    }
                    track(Undo::Inserted {
                        table: name.clone(),
                        key: row.first().cloned().unwrap_or_default(),
                    });
                    table.rows.push(row);
                    output.rowcount += 1;
                }
                Ok(output)
            }
            Command::Select {
                table: name,
                projection,
                filter,
                order_by,
                limit,
                offset,
            } => {
                let table = state.tables.get(&name).ok_or_else(|| table_missing(&name))?;
                let predicate = table.predicate(&filter)?;
                let (labels, indexes) = table.labels(&projection)?;
                let mut selected: Vec<&Vec<Value>> = table
                    .rows
                    .iter()
                    .filter(|row| matches(row, &predicate))
                    .collect();
                if let Some((column, descending)) = order_by {
                    let i = table.column(&column)?;
                    selected.sort_by(|a, b| {
                        let ordering = compare(&a[i], &b[i]);
                        if descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    });
                }
                let rows: Vec<Row> = selected
                    .into_iter()
                    .skip(offset.unwrap_or_default())
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|row| indexes.iter().map(|i| row[*i].clone()).collect())
                    .collect();
                Ok(Output {
                    labels: Some(labels),
                    rowcount: rows.len() as u64,
                    rows,
                })
            }
            Command::Update {
                table: name,
                assignments,
                filter,
            } => {
                let table = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| table_missing(&name))?;
                let predicate = table.predicate(&filter)?;
                let assignments = table.predicate(&assignments)?;
                let mut rowcount = 0;
                for row in table.rows.iter_mut().filter(|row| matches(row, &predicate)) {
                    let previous = row.clone();
                    for (i, value) in &assignments {
                        row[*i] = value.clone();
                    }
                    track(Undo::Updated {
                        table: name.clone(),
                        key: row.first().cloned().unwrap_or_default(),
                        row: previous,
                    });
                    rowcount += 1;
                }
                Ok(Output {
                    rowcount,
                    ..Default::default()
                })
            }
            Command::Delete {
                table: name,
                filter,
            } => {
                let table = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| table_missing(&name))?;
                let predicate = table.predicate(&filter)?;
                let mut rowcount = 0;
                for position in (0..table.rows.len()).rev() {
                    if matches(&table.rows[position], &predicate) {
                        let row = table.rows.remove(position);
                        track(Undo::Deleted {
                            table: name.clone(),
                            position,
                            row,
                        });
                        rowcount += 1;
                    }
                }
                Ok(Output {
                    rowcount,
                    ..Default::default()
                })
            }
            Command::Begin | Command::Commit | Command::Rollback => Ok(Output::default()),
        }
    }
}

fn table_missing(name: &str) -> Error {
    Error::msg(format!("Table `{}` does not exist", name))
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int64(Some(a)), Value::Int64(Some(b))) => a.cmp(b),
        (Value::Float64(Some(a)), Value::Float64(Some(b))) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Value::Varchar(Some(a)), Value::Varchar(Some(b))) => a.cmp(b),
        (Value::Boolean(Some(a)), Value::Boolean(Some(b))) => a.cmp(b),
        (a, b) => b.is_null().cmp(&a.is_null()),
    }
}
