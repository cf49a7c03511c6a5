use crate::{AsValue, Error, Result, SqlWriter, Value, truncate_long};
use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

/// Compiled SQL text with its bound parameters.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
    /// Append a parameter value.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
    pub fn with_params(mut self, params: impl IntoIterator<Item = Value>) -> Self {
        self.params.extend(params);
        self
    }
}

impl From<&str> for Statement {
    fn from(value: &str) -> Self {
        Statement::new(value)
    }
}

impl From<String> for Statement {
    fn from(value: String) -> Self {
        Statement::new(value)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Key of the affected row, when the statement returned it.
    pub last_affected_id: Option<Value>,
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(names: RowNames, values: Row) -> Self {
        Self {
            labels: names,
            values,
        }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values()[i])
    }
    /// Decode the column `name`, failing if it is missing or has a different type.
    pub fn decode<T: AsValue>(&self, name: &str) -> Result<T> {
        let value = self
            .get_column(name)
            .ok_or_else(|| Error::msg(format!("Column `{}` is not part of the row", name)))?;
        T::try_from_value(value.clone())
    }
}

impl From<RowLabeled> for Row {
    fn from(value: RowLabeled) -> Self {
        value.values
    }
}

/// Row-shaping callback: turns a raw row into the caller's representation.
pub type RowShaper<T> = Arc<dyn Fn(RowLabeled) -> Result<T> + Send + Sync>;

/// Reads rows and shapes each one into `T`.
///
/// `limit` and `offset` are kept outside of the SQL text so that random access
/// (`first`, `get`, slicing) can derive new queries without parsing it.
pub struct SelectQuery<T> {
    pub statement: Statement,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub shaper: RowShaper<T>,
}

impl<T> Clone for SelectQuery<T> {
    fn clone(&self) -> Self {
        Self {
            statement: self.statement.clone(),
            limit: self.limit,
            offset: self.offset,
            shaper: self.shaper.clone(),
        }
    }
}

impl<T> Debug for SelectQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectQuery")
            .field("statement", &self.statement)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<T> SelectQuery<T> {
    pub fn new<F>(statement: impl Into<Statement>, shaper: F) -> Self
    where
        F: Fn(RowLabeled) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            statement: statement.into(),
            limit: None,
            offset: None,
            shaper: Arc::new(shaper),
        }
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    /// Restrict the rows to `len` of them starting at `start`, relative to the
    /// rows this query already selects.
    pub fn window(&self, start: u64, len: Option<u64>) -> Self {
        let mut query = self.clone();
        query.offset = match (self.offset, start) {
            (offset, 0) => offset,
            (offset, start) => Some(offset.unwrap_or_default().saturating_add(start)),
        };
        let remaining = self.limit.map(|v| v.saturating_sub(start));
        query.limit = match (remaining, len) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        query
    }

    /// SQL text with the `LIMIT`/`OFFSET` suffix.
    pub fn compile(&self, writer: &dyn SqlWriter) -> Statement {
        let mut sql = self.statement.sql.trim_end().trim_end_matches(';').to_string();
        writer.write_limit_offset(&mut sql, self.limit, self.offset);
        Statement {
            sql,
            params: self.statement.params.clone(),
        }
    }
}

impl SelectQuery<RowLabeled> {
    /// Select rows as they come from the driver.
    pub fn raw(statement: impl Into<Statement>) -> Self {
        Self::new(statement, Ok)
    }
}

/// Inserts one or more rows, optionally returning their keys.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    pub statement: Statement,
    /// Column returned by the statement for each inserted row.
    pub returning: Option<String>,
    /// One entry per inserted row: the key provided by the caller, if any.
    pub keys: Vec<Option<Value>>,
}

impl InsertQuery {
    pub fn new(statement: impl Into<Statement>, rows: usize) -> Self {
        Self {
            statement: statement.into(),
            returning: None,
            keys: vec![None; rows],
        }
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }

    /// Keys provided by the caller, one per row; `None` leaves it to the database.
    pub fn keys(mut self, keys: Vec<Option<Value>>) -> Self {
        self.keys = keys;
        self
    }

    pub fn rows(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Debug, Clone)]
pub struct UpdateQuery {
    pub statement: Statement,
}

#[derive(Debug, Clone)]
pub struct DeleteQuery {
    pub statement: Statement,
}

/// A query whose kind is chosen once, at construction.
#[derive(Debug, Clone)]
pub enum Query<T> {
    Select(SelectQuery<T>),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl<T> Query<T> {
    pub fn select<F>(statement: impl Into<Statement>, shaper: F) -> Self
    where
        F: Fn(RowLabeled) -> Result<T> + Send + Sync + 'static,
    {
        Query::Select(SelectQuery::new(statement, shaper))
    }

    pub fn insert(statement: impl Into<Statement>, rows: usize) -> Self {
        Query::Insert(InsertQuery::new(statement, rows))
    }

    pub fn update(statement: impl Into<Statement>) -> Self {
        Query::Update(UpdateQuery {
            statement: statement.into(),
        })
    }

    pub fn delete(statement: impl Into<Statement>) -> Self {
        Query::Delete(DeleteQuery {
            statement: statement.into(),
        })
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Query::Select(..))
    }
}

impl<T> From<SelectQuery<T>> for Query<T> {
    fn from(value: SelectQuery<T>) -> Self {
        Query::Select(value)
    }
}

impl<T> From<InsertQuery> for Query<T> {
    fn from(value: InsertQuery) -> Self {
        Query::Insert(value)
    }
}
