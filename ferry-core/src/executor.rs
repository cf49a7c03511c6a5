use crate::{
    Combinators, DbError, Deferred, DeferredAware, DeferredCursor, DeleteQuery, Driver, Error,
    InsertQuery, Query, Result, ResultWrapper, RowLabeled, RowsAffected, SelectQuery, Session,
    SqlWriter, Statement, UpdateQuery, Value, gather, resolve::configuration_error, stream::Stream,
};
use futures::{FutureExt, future::BoxFuture};
use std::{
    future::IntoFuture,
    ops::{Bound, RangeBounds},
};

/// What a statement produced before its pending parts are resolved.
pub enum Execution<'a, T> {
    Single(Deferred<'a, T>),
    /// One value per row, resolved concurrently and gathered in order.
    Batch(Vec<Deferred<'a, T>>),
}

impl<'a, T: Send + 'a> Execution<'a, T> {
    pub fn map<U, F>(self, f: F) -> Execution<'a, U>
    where
        U: Send + 'a,
        F: Fn(T) -> U + Clone + Send + 'a,
    {
        match self {
            Execution::Single(v) => Execution::Single(v.map(move |v| Ok(f(v)))),
            Execution::Batch(v) => Execution::Batch(
                v.into_iter()
                    .map(|v| {
                        let f = f.clone();
                        v.map(move |v| Ok(f(v)))
                    })
                    .collect(),
            ),
        }
    }

    pub async fn resolve(self) -> Result<Resolved<T>> {
        Ok(match self {
            Execution::Single(v) => Resolved::Single(v.await?),
            Execution::Batch(v) => Resolved::Batch(gather(v).await?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Single(T),
    Batch(Vec<T>),
}

impl<T> Resolved<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Resolved::Single(v) => vec![v],
            Resolved::Batch(v) => v,
        }
    }
}

/// Output of a [`Query`], whatever its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Rows(Vec<T>),
    Affected(RowsAffected),
}

/// A compiled query the execution layer knows how to run and how to collect.
pub trait Execute: Send + Sync {
    type Output: Send + 'static;

    fn statement(&self, writer: &dyn SqlWriter) -> Statement;

    /// Whether the statement changes data, and must be committed when autocommit is on.
    fn require_commit(&self) -> bool;

    /// Fail before anything runs when `combinators` cannot collect this query.
    fn check<C: Combinators>(&self, _combinators: &C) -> Result<()> {
        Ok(())
    }

    /// Turn the dispatched cursor into the (possibly still pending) output.
    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        combinators: &C,
    ) -> Result<Execution<'a, Self::Output>>;
}

fn single<A>(mut arguments: Vec<A>) -> Result<A> {
    arguments
        .pop()
        .ok_or_else(|| Error::msg("The combinator produced an empty group"))
}

impl<T: Send + 'static> Execute for SelectQuery<T> {
    type Output = Vec<T>;

    fn statement(&self, writer: &dyn SqlWriter) -> Statement {
        self.compile(writer)
    }

    fn require_commit(&self) -> bool {
        false
    }

    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        combinators: &C,
    ) -> Result<Execution<'a, Self::Output>> {
        let shaper = self.shaper.clone();
        let combinators = combinators.clone();
        Ok(Execution::Single(Deferred::pending(async move {
            let rows = cursor.fetchall().await?;
            combinators
                .map(vec![Deferred::Ready(rows)], move |row| shaper(single(row)?))?
                .await
        })))
    }
}

impl Execute for InsertQuery {
    type Output = RowsAffected;

    fn statement(&self, _writer: &dyn SqlWriter) -> Statement {
        self.statement.clone()
    }

    fn require_commit(&self) -> bool {
        true
    }

    fn check<C: Combinators>(&self, combinators: &C) -> Result<()> {
        if self.returning.is_some() && self.keys.len() > 1 && !combinators.accepts_pending() {
            return Err(configuration_error(
                "The keys returned by a multi-row insert need a deferred aware combinator",
            ));
        }
        Ok(())
    }

    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        combinators: &C,
    ) -> Result<Execution<'a, Self::Output>> {
        let Some(column) = self.returning.clone() else {
            return Ok(Execution::Single(affected(cursor)));
        };
        if self.keys.len() <= 1 {
            let explicit = self.keys.first().cloned().flatten();
            return Ok(Execution::Single(Deferred::pending(async move {
                let row = cursor.fetchone().await?;
                let returned = match row {
                    Some(row) => returned_key(&row, &column)?,
                    None => Value::Null,
                };
                let rows_affected = cursor.rowcount().await?.unwrap_or(1);
                Ok(RowsAffected {
                    rows_affected,
                    last_affected_id: pick_key(explicit, returned),
                })
            })));
        }
        let explicit: Vec<Value> = self
            .keys
            .iter()
            .map(|v| v.clone().unwrap_or_default())
            .collect();
        let returned = Deferred::pending(async move {
            cursor
                .fetchall()
                .await?
                .iter()
                .map(|row| returned_key(row, &column))
                .collect::<Result<Vec<_>>>()
        });
        let groups = combinators.zip(vec![Deferred::Ready(explicit), returned])?;
        Ok(Execution::Batch(
            groups
                .into_iter()
                .map(|group| {
                    Deferred::pending(async move {
                        let mut keys = gather(group).await?.into_iter();
                        let explicit = keys.next().filter(|v| !v.is_null());
                        let returned = keys.next().unwrap_or_default();
                        Ok(RowsAffected {
                            rows_affected: 1,
                            last_affected_id: pick_key(explicit, returned),
                        })
                    })
                })
                .collect(),
        ))
    }
}

fn returned_key(row: &RowLabeled, column: &str) -> Result<Value> {
    row.get_column(column).cloned().ok_or_else(|| {
        let error = Error::msg(format!(
            "The column `{}` was not returned by the insert",
            column
        ));
        log::error!("{:#}", error);
        error
    })
}

fn pick_key(explicit: Option<Value>, returned: Value) -> Option<Value> {
    explicit
        .filter(|v| !v.is_null())
        .or(Some(returned).filter(|v| !v.is_null()))
}

fn affected<'a, D: Driver>(cursor: DeferredCursor<'a, D>) -> Deferred<'a, RowsAffected> {
    Deferred::pending(async move {
        Ok(RowsAffected {
            rows_affected: cursor.rowcount().await?.unwrap_or_default(),
            last_affected_id: None,
        })
    })
}

impl Execute for UpdateQuery {
    type Output = RowsAffected;

    fn statement(&self, _writer: &dyn SqlWriter) -> Statement {
        self.statement.clone()
    }

    fn require_commit(&self) -> bool {
        true
    }

    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        _combinators: &C,
    ) -> Result<Execution<'a, Self::Output>> {
        Ok(Execution::Single(affected(cursor)))
    }
}

impl Execute for DeleteQuery {
    type Output = RowsAffected;

    fn statement(&self, _writer: &dyn SqlWriter) -> Statement {
        self.statement.clone()
    }

    fn require_commit(&self) -> bool {
        true
    }

    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        _combinators: &C,
    ) -> Result<Execution<'a, Self::Output>> {
        Ok(Execution::Single(affected(cursor)))
    }
}

impl<T: Send + 'static> Execute for Query<T> {
    type Output = Outcome<T>;

    fn statement(&self, writer: &dyn SqlWriter) -> Statement {
        match self {
            Query::Select(q) => q.statement(writer),
            Query::Insert(q) => q.statement(writer),
            Query::Update(q) => q.statement(writer),
            Query::Delete(q) => q.statement(writer),
        }
    }

    fn require_commit(&self) -> bool {
        match self {
            Query::Select(q) => q.require_commit(),
            Query::Insert(q) => q.require_commit(),
            Query::Update(q) => q.require_commit(),
            Query::Delete(q) => q.require_commit(),
        }
    }

    fn check<C: Combinators>(&self, combinators: &C) -> Result<()> {
        match self {
            Query::Select(q) => q.check(combinators),
            Query::Insert(q) => q.check(combinators),
            Query::Update(q) => q.check(combinators),
            Query::Delete(q) => q.check(combinators),
        }
    }

    fn collect<'a, D: Driver, C: Combinators>(
        &self,
        cursor: DeferredCursor<'a, D>,
        combinators: &C,
    ) -> Result<Execution<'a, Self::Output>> {
        Ok(match self {
            Query::Select(q) => q.collect(cursor, combinators)?.map(Outcome::Rows),
            Query::Insert(q) => q.collect(cursor, combinators)?.map(Outcome::Affected),
            Query::Update(q) => q.collect(cursor, combinators)?.map(Outcome::Affected),
            Query::Delete(q) => q.collect(cursor, combinators)?.map(Outcome::Affected),
        })
    }
}

impl<D: Driver> Session<D> {
    /// Execute `query` and resolve everything it produced.
    pub async fn run<Q: Execute>(&mut self, query: &Q) -> Result<Resolved<Q::Output>> {
        self.run_with(query, &DeferredAware).await
    }

    /// Same as [`Session::run`] with explicit combinators.
    pub async fn run_with<Q: Execute, C: Combinators>(
        &mut self,
        query: &Q,
        combinators: &C,
    ) -> Result<Resolved<Q::Output>> {
        query.check(combinators)?;
        let statement = query.statement(self.database().sql_writer());
        let cursor = self.cursor(statement, query.require_commit());
        cursor.dispatch().await?;
        query.collect(cursor, combinators)?.resolve().await
    }

    /// Handle over a select, with lazy iteration and random access.
    pub fn select<T: Send + 'static>(&mut self, query: SelectQuery<T>) -> Select<'_, D, T> {
        Select {
            session: self,
            query,
        }
    }
}

/// Inclusive start of a range, `Some(None)` when unbounded and `None` on overflow.
fn bound_start(bound: Bound<&i64>) -> Option<Option<i64>> {
    match bound {
        Bound::Included(v) => Some(Some(*v)),
        Bound::Excluded(v) => v.checked_add(1).map(Some),
        Bound::Unbounded => Some(None),
    }
}

fn bound_stop(bound: Bound<&i64>) -> Option<Option<i64>> {
    match bound {
        Bound::Included(v) => v.checked_add(1).map(Some),
        Bound::Excluded(v) => Some(Some(*v)),
        Bound::Unbounded => Some(None),
    }
}

/// A select bound to a session.
///
/// Awaiting it directly resolves to [`Select::first`].
pub struct Select<'s, D: Driver, T> {
    session: &'s mut Session<D>,
    query: SelectQuery<T>,
}

impl<'s, D: Driver, T: Send + 'static> Select<'s, D, T> {
    pub fn query(&self) -> &SelectQuery<T> {
        &self.query
    }

    fn compile(&self) -> Statement {
        self.query.compile(self.session.database().sql_writer())
    }

    /// Dispatch the statement and return the lazy wrapper over its rows.
    pub async fn execute(self) -> Result<ResultWrapper<'s, D, T>> {
        let statement = self.compile();
        let Select { session, query } = self;
        let cursor = session.cursor(statement, false);
        cursor.dispatch().await?;
        Ok(ResultWrapper::new(cursor, query.shaper))
    }

    /// Rows streamed as they are fetched; the statement runs on first poll.
    pub fn stream(self) -> impl Stream<Item = Result<T>> + Send + 's {
        let statement = self.compile();
        let Select { session, query } = self;
        ResultWrapper::new(session.cursor(statement, false), query.shaper).into_stream()
    }

    /// Every row.
    pub async fn all(self) -> Result<Vec<T>> {
        let mut wrapper = self.execute().await?;
        wrapper.fill_cache(None).await?;
        Ok(wrapper.into_cache())
    }

    /// The only row expected, [`DbError::NotFound`] when there is none.
    pub async fn get(self) -> Result<T> {
        let query = self.query.window(0, Some(1));
        let statement = query.compile(self.session.database().sql_writer());
        let rows = Select {
            session: self.session,
            query,
        }
        .all()
        .await?;
        rows.into_iter().next().ok_or_else(|| {
            let error = Error::new(DbError::NotFound {
                sql: statement.sql,
                params: statement.params,
            });
            log::debug!("{:#}", error);
            error
        })
    }

    /// The first row, `None` when there is none.
    pub async fn first(self) -> Result<Option<T>> {
        let query = self.query.window(0, Some(1));
        let rows = Select {
            session: self.session,
            query,
        }
        .all()
        .await?;
        Ok(rows.into_iter().next())
    }

    /// The row at `index`, [`DbError::IndexOutOfRange`] when there is none.
    pub async fn nth(self, index: i64) -> Result<T> {
        let Ok(start) = u64::try_from(index) else {
            return Err(DbError::IndexOutOfRange(index).into());
        };
        let query = self.query.window(start, Some(1));
        let rows = Select {
            session: self.session,
            query,
        }
        .all()
        .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::IndexOutOfRange(index).into())
    }

    /// Rows in `range`, positions relative to the rows this query selects.
    ///
    /// The start can't be negative, the end must be positive and greater than the start.
    pub async fn slice(self, range: impl RangeBounds<i64>) -> Result<Vec<T>> {
        let invalid = |message: &str| {
            let error = Error::new(DbError::InvalidSlice(message.into()));
            log::error!("{:#}", error);
            Err(error)
        };
        let (start, stop) = match (
            bound_start(range.start_bound()),
            bound_stop(range.end_bound()),
        ) {
            (Some(start), Some(stop)) => (start, stop),
            _ => return invalid("bound out of range"),
        };
        if stop.is_some_and(|v| v <= 0) {
            return invalid("stop must be positive");
        }
        if start.is_some_and(|v| v < 0) {
            return invalid("start can't be negative");
        }
        if let (Some(start), Some(stop)) = (start, stop) {
            if start >= stop {
                return invalid("stop must be greater than start");
            }
        }
        let start = start.unwrap_or_default() as u64;
        let len = stop.map(|v| v as u64 - start);
        let query = self.query.window(start, len);
        Select {
            session: self.session,
            query,
        }
        .all()
        .await
    }

    /// Number of rows, fetching all of them.
    pub async fn count(self) -> Result<usize> {
        self.execute().await?.count().await
    }
}

impl<'s, D: Driver, T: Send + 'static> IntoFuture for Select<'s, D, T> {
    type Output = Result<Option<T>>;
    type IntoFuture = BoxFuture<'s, Result<Option<T>>>;

    fn into_future(self) -> Self::IntoFuture {
        self.first().boxed()
    }
}

