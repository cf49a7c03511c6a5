use crate::{
    DeleteQuery, Driver, Error, InsertQuery, Query, Result, RowLabeled, RowsAffected,
    Select, SelectQuery, Session, SqlWriter, Statement, UpdateQuery, Value,
};
use std::future::Future;

/// A row of a table mapped to a Rust type, with a single column primary key.
///
/// `columns` lists the columns other than the key, `values` returns them in the same order.
pub trait Model: Sized + Send + Sync + 'static {
    fn table_name() -> &'static str;

    fn columns() -> &'static [&'static str];

    fn primary_key_column() -> &'static str;

    /// `None` until the row is stored.
    fn primary_key(&self) -> Option<Value>;

    fn set_primary_key(&mut self, value: Value) -> Result<()>;

    fn values(&self) -> Vec<Value>;

    fn from_row(row: RowLabeled) -> Result<Self>;

    /// Statements to run before deleting this instance recursively, in order.
    fn dependents(&self) -> Vec<Query<RowLabeled>> {
        Vec::new()
    }

    /// Rows matching every `filter` column, compared with the corresponding `params`.
    fn select_query(
        writer: &dyn SqlWriter,
        filter: &[&str],
        params: Vec<Value>,
    ) -> SelectQuery<Self> {
        let mut sql = String::new();
        writer.write_select(&mut sql, Self::table_name(), &[], filter);
        SelectQuery::new(Statement::new(sql).with_params(params), Self::from_row)
    }

    fn select<D: Driver>(session: &mut Session<D>) -> Select<'_, D, Self> {
        let query = Self::select_query(session.database().sql_writer(), &[], Vec::new());
        session.select(query)
    }

    /// Instance with the given key, [`crate::DbError::NotFound`] if there is none.
    fn get_by_key<D: Driver>(
        session: &mut Session<D>,
        key: impl Into<Value>,
    ) -> impl Future<Output = Result<Self>> + Send {
        let query = Self::select_query(
            session.database().sql_writer(),
            &[Self::primary_key_column()],
            vec![key.into()],
        );
        session.select(query).get()
    }

    /// Insert the instance when it has no key yet, update it otherwise.
    fn save<D: Driver>(
        &mut self,
        session: &mut Session<D>,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.save_with(session, false)
    }

    /// Like [`Model::save`], inserting even when the key is already set if `force_insert`.
    ///
    /// After an insert the key assigned by the database is stored in the instance.
    fn save_with<D: Driver>(
        &mut self,
        session: &mut Session<D>,
        force_insert: bool,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            let key = self.primary_key().filter(|v| !v.is_null());
            let database = session.database().clone();
            let writer = database.sql_writer();
            let mut sql = String::new();
            match key {
                Some(key) if !force_insert => {
                    writer.write_update(
                        &mut sql,
                        Self::table_name(),
                        Self::columns(),
                        Self::primary_key_column(),
                    );
                    let mut params = self.values();
                    params.push(key);
                    let query = UpdateQuery {
                        statement: Statement::new(sql).with_params(params),
                    };
                    single(session.run(&query).await?.into_vec())
                }
                key => {
                    let mut columns = Self::columns().to_vec();
                    let mut params = self.values();
                    if let Some(key) = key.clone() {
                        columns.insert(0, Self::primary_key_column());
                        params.insert(0, key);
                    }
                    writer.write_insert(
                        &mut sql,
                        Self::table_name(),
                        &columns,
                        1,
                        Some(Self::primary_key_column()),
                    );
                    let query = InsertQuery::new(Statement::new(sql).with_params(params), 1)
                        .returning(Self::primary_key_column())
                        .keys(vec![key]);
                    let affected = single(session.run(&query).await?.into_vec())?;
                    if let Some(id) = affected.last_affected_id.clone() {
                        self.set_primary_key(id)?;
                    }
                    Ok(affected)
                }
            }
        }
    }

    /// Delete the row of this instance, after its dependents when `recursive`.
    fn delete_instance<D: Driver>(
        &self,
        session: &mut Session<D>,
        recursive: bool,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            let Some(key) = self.primary_key().filter(|v| !v.is_null()) else {
                let error = Error::msg(format!(
                    "Cannot delete a `{}` row that was never saved",
                    Self::table_name()
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            if recursive {
                for query in self.dependents() {
                    session.run(&query).await?;
                }
            }
            let mut sql = String::new();
            session.database().sql_writer().write_delete(
                &mut sql,
                Self::table_name(),
                &[Self::primary_key_column()],
            );
            let query = DeleteQuery {
                statement: Statement::new(sql).bind(key),
            };
            single(session.run(&query).await?.into_vec())
        }
    }
}

fn single(mut values: Vec<RowsAffected>) -> Result<RowsAffected> {
    values
        .pop()
        .ok_or_else(|| Error::msg("The statement did not report the affected rows"))
}
