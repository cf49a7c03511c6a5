use crate::{DbError, DeferredCursor, Driver, Result, RowShaper, stream::Stream};
use async_stream::try_stream;

/// Lazy, forward-only view over the rows of an executed statement.
///
/// Rows are fetched one at a time, shaped and appended to a cache. Once the driver
/// reports the end of the results the wrapper is `populated`: the cursor is closed
/// (unless it is a named one) and iterating again yields nothing. Random access is
/// not done here, [`crate::Select`] issues a new statement for it.
pub struct ResultWrapper<'a, D: Driver, T> {
    cursor: DeferredCursor<'a, D>,
    shaper: RowShaper<T>,
    cache: Vec<T>,
    populated: bool,
}

impl<'a, D: Driver, T: Send + 'a> ResultWrapper<'a, D, T> {
    pub fn new(cursor: DeferredCursor<'a, D>, shaper: RowShaper<T>) -> Self {
        Self {
            cursor,
            shaper,
            cache: Vec::new(),
            populated: false,
        }
    }

    pub fn cursor(&self) -> &DeferredCursor<'a, D> {
        &self.cursor
    }

    /// Fetch and shape the next row, `None` at the end of the results.
    pub async fn iterate(&mut self) -> Result<Option<&T>> {
        if self.populated {
            return Ok(None);
        }
        match self.cursor.fetchone().await? {
            Some(row) => {
                self.cache.push((self.shaper)(row)?);
                Ok(self.cache.last())
            }
            None => {
                self.populated = true;
                if !self.cursor.is_named().await? {
                    self.cursor.close().await?;
                }
                Ok(None)
            }
        }
    }

    pub async fn advance(&mut self) -> Result<Option<T>>
    where
        T: Clone,
    {
        Ok(self.iterate().await?.cloned())
    }

    /// Remaining rows, resuming from the current cursor position.
    pub fn stream(&mut self) -> impl Stream<Item = Result<T>> + Send + '_
    where
        T: Clone,
    {
        try_stream! {
            while let Some(row) = self.advance().await? {
                yield row;
            }
        }
    }

    /// Remaining rows without caching them.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send + 'a {
        try_stream! {
            if !self.populated {
                while let Some(row) = self.cursor.fetchone().await? {
                    yield (self.shaper)(row)?;
                }
                if !self.cursor.is_named().await? {
                    self.cursor.close().await?;
                }
            }
        }
    }

    /// Fetch until the cache holds `rows` rows, or until the end when `None`.
    pub async fn fill_cache(&mut self, rows: Option<usize>) -> Result<()> {
        while rows.map_or(true, |n| self.cache.len() < n) {
            if self.iterate().await?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Fetch every remaining row and count them all.
    pub async fn count(&mut self) -> Result<usize> {
        self.fill_cache(None).await?;
        Ok(self.cache.len())
    }

    /// Number of rows, available once every row was fetched.
    pub fn len(&self) -> Result<usize> {
        if !self.populated {
            return Err(DbError::Unsupported("len").into());
        }
        Ok(self.cache.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|v| v == 0)
    }

    /// Synchronous iteration over the rows, available once every row was fetched.
    pub fn iter(&self) -> Result<std::slice::Iter<'_, T>> {
        if !self.populated {
            return Err(DbError::Unsupported("iter").into());
        }
        Ok(self.cache.iter())
    }

    /// Rows fetched so far.
    pub fn cached(&self) -> &[T] {
        &self.cache
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn into_cache(self) -> Vec<T> {
        self.cache
    }
}
