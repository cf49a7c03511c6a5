use crate::{AsValue, DbError, Error, Result, Value};
use futures::{
    FutureExt,
    future::{self, BoxFuture, Shared, try_join_all},
};
use std::{
    fmt::{self, Debug},
    future::{Future, IntoFuture},
    sync::Arc,
};

/// A value that is either available or still being produced by an earlier async step
/// (the key assigned by an `INSERT ... RETURNING`, the rows of a cursor).
pub enum Deferred<'a, T> {
    Ready(T),
    Pending(BoxFuture<'a, Result<T>>),
}

impl<'a, T: Debug> Debug for Deferred<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Deferred::Pending(..) => f.write_str("Pending"),
        }
    }
}

impl<'a, T: Send + 'a> Deferred<'a, T> {
    pub fn ready(value: T) -> Self {
        Deferred::Ready(value)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'a,
    {
        Deferred::Pending(future.boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Deferred::Pending(..))
    }

    pub async fn resolve(self) -> Result<T> {
        match self {
            Deferred::Ready(v) => Ok(v),
            Deferred::Pending(f) => f.await,
        }
    }

    /// Transform the value, right away when it is ready or once it resolves.
    pub fn map<U, F>(self, f: F) -> Deferred<'a, U>
    where
        U: Send + 'a,
        F: FnOnce(T) -> Result<U> + Send + 'a,
    {
        match self {
            Deferred::Ready(v) => match f(v) {
                Ok(v) => Deferred::Ready(v),
                Err(e) => Deferred::Pending(future::ready(Err(e)).boxed()),
            },
            Deferred::Pending(pending) => {
                Deferred::pending(async move { f(pending.await?) })
            }
        }
    }
}

impl<'a> Deferred<'a, Value> {
    /// Decode into a native type, used to assign deferred values to model fields.
    pub fn decode<T: AsValue + Send + 'a>(self) -> Deferred<'a, T> {
        self.map(T::try_from_value)
    }
}

impl<'a, T: Send + 'a> IntoFuture for Deferred<'a, T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'a, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Deferred::Ready(v) => future::ready(Ok(v)).boxed(),
            Deferred::Pending(f) => f,
        }
    }
}

impl<'a, T> From<T> for Deferred<'a, T> {
    fn from(value: T) -> Self {
        Deferred::Ready(value)
    }
}

/// Resolve every value concurrently, keeping the original order.
pub async fn gather<'a, T: Send + 'a>(values: Vec<Deferred<'a, T>>) -> Result<Vec<T>> {
    try_join_all(values.into_iter().map(IntoFuture::into_future)).await
}

/// Row-transform combinators used while collecting the results of a statement.
///
/// `map` applies `f` to one element of each input at a time (the inputs are walked in
/// lockstep, stopping at the shortest), `zip` returns those same element groups.
pub trait Combinators: Clone + Send + Sync + 'static {
    /// Whether pending inputs are accepted.
    fn accepts_pending(&self) -> bool;

    fn map<'a, A, B, F>(
        &self,
        inputs: Vec<Deferred<'a, Vec<A>>>,
        f: F,
    ) -> Result<Deferred<'a, Vec<B>>>
    where
        A: Send + 'a,
        B: Send + 'a,
        F: FnMut(Vec<A>) -> Result<B> + Send + 'a;

    fn zip<'a, A>(&self, inputs: Vec<Deferred<'a, Vec<A>>>) -> Result<Vec<Vec<Deferred<'a, A>>>>
    where
        A: Clone + Send + Sync + 'a;
}

/// Plain synchronous combinators, pending inputs are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct Eager;

/// Combinators that accept pending inputs.
///
/// `map` waits for the pending inputs before applying `f`, and does not suspend at all
/// when every input is ready. `zip` needs at least one ready input to know its length,
/// the elements of the pending ones are handed out as pending values themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredAware;

pub(crate) fn configuration_error(message: &str) -> Error {
    let error = Error::new(DbError::Configuration(message.into()));
    log::error!("{:#}", error);
    error
}

fn ready_inputs<'a, A>(inputs: Vec<Deferred<'a, Vec<A>>>) -> Result<Vec<Vec<A>>> {
    inputs
        .into_iter()
        .map(|input| match input {
            Deferred::Ready(v) => Ok(v),
            Deferred::Pending(..) => Err(configuration_error(
                "Pending values need a deferred aware combinator",
            )),
        })
        .collect()
}

fn lockstep<A>(inputs: Vec<Vec<A>>) -> Vec<Vec<A>> {
    let len = inputs.iter().map(Vec::len).min().unwrap_or(0);
    let mut iterators: Vec<_> = inputs.into_iter().map(Vec::into_iter).collect();
    (0..len)
        .map(|_| iterators.iter_mut().filter_map(Iterator::next).collect())
        .collect()
}

fn map_lockstep<A, B, F>(inputs: Vec<Vec<A>>, f: F) -> Result<Vec<B>>
where
    F: FnMut(Vec<A>) -> Result<B>,
{
    lockstep(inputs).into_iter().map(f).collect()
}

impl Combinators for Eager {
    fn accepts_pending(&self) -> bool {
        false
    }

    fn map<'a, A, B, F>(
        &self,
        inputs: Vec<Deferred<'a, Vec<A>>>,
        f: F,
    ) -> Result<Deferred<'a, Vec<B>>>
    where
        A: Send + 'a,
        B: Send + 'a,
        F: FnMut(Vec<A>) -> Result<B> + Send + 'a,
    {
        Ok(Deferred::Ready(map_lockstep(ready_inputs(inputs)?, f)?))
    }

    fn zip<'a, A>(&self, inputs: Vec<Deferred<'a, Vec<A>>>) -> Result<Vec<Vec<Deferred<'a, A>>>>
    where
        A: Clone + Send + Sync + 'a,
    {
        Ok(lockstep(ready_inputs(inputs)?)
            .into_iter()
            .map(|group| group.into_iter().map(Deferred::Ready).collect())
            .collect())
    }
}

type SharedItems<'a, A> = Shared<BoxFuture<'a, std::result::Result<Arc<Vec<A>>, Arc<Error>>>>;

enum Source<'a, A> {
    Ready(std::vec::IntoIter<A>),
    Pending(SharedItems<'a, A>),
}

impl Combinators for DeferredAware {
    fn accepts_pending(&self) -> bool {
        true
    }

    fn map<'a, A, B, F>(
        &self,
        inputs: Vec<Deferred<'a, Vec<A>>>,
        f: F,
    ) -> Result<Deferred<'a, Vec<B>>>
    where
        A: Send + 'a,
        B: Send + 'a,
        F: FnMut(Vec<A>) -> Result<B> + Send + 'a,
    {
        if !inputs.iter().any(Deferred::is_pending) {
            return Eager.map(inputs, f);
        }
        Ok(Deferred::pending(async move {
            let inputs = gather(inputs).await?;
            map_lockstep(inputs, f)
        }))
    }

    fn zip<'a, A>(&self, inputs: Vec<Deferred<'a, Vec<A>>>) -> Result<Vec<Vec<Deferred<'a, A>>>>
    where
        A: Clone + Send + Sync + 'a,
    {
        let Some(len) = inputs
            .iter()
            .filter_map(|input| match input {
                Deferred::Ready(v) => Some(v.len()),
                Deferred::Pending(..) => None,
            })
            .min()
        else {
            return Err(configuration_error(
                "There must be at least one input that is not pending",
            ));
        };
        let mut sources: Vec<Source<'a, A>> = inputs
            .into_iter()
            .map(|input| match input {
                Deferred::Ready(v) => Source::Ready(v.into_iter()),
                Deferred::Pending(f) => Source::Pending(
                    f.map(|r| r.map(Arc::new).map_err(Arc::new))
                        .boxed()
                        .shared(),
                ),
            })
            .collect();
        let mut groups = Vec::with_capacity(len);
        for index in 0..len {
            let mut group = Vec::with_capacity(sources.len());
            for source in sources.iter_mut() {
                group.push(match source {
                    Source::Ready(items) => match items.next() {
                        Some(v) => Deferred::Ready(v),
                        None => return Err(DbError::IndexOutOfRange(index as i64).into()),
                    },
                    Source::Pending(shared) => {
                        let shared = shared.clone();
                        Deferred::pending(async move {
                            let items = shared.await.map_err(DbError::from_shared)?;
                            items
                                .get(index)
                                .cloned()
                                .ok_or_else(|| DbError::IndexOutOfRange(index as i64).into())
                        })
                    }
                });
            }
            groups.push(group);
        }
        Ok(groups)
    }
}
