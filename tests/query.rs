#[cfg(test)]
mod tests {
    use ferry::{
        Database, DatabaseConfig, DbError, Eager, GenericSqlWriter, InsertQuery, Outcome, Query,
        Resolved, RowLabeled, SelectQuery, SqlWriter, Statement, Value, is_db_error,
    };
    use ferry_memory::MemoryDriver;
    use ferry_tests::{init_logs, run_script, silent_logs};
    use indoc::indoc;
    use std::sync::Arc;

    const WRITER: GenericSqlWriter = GenericSqlWriter;

    #[test]
    fn write_statements() {
        let mut out = String::new();
        WRITER.write_select(&mut out, "users", &[], &["name", "age"]);
        assert_eq!(
            out,
            r#"SELECT * FROM "users" WHERE "name" = $1 AND "age" = $2"#
        );

        out.clear();
        WRITER.write_insert(&mut out, "users", &["name", "age"], 2, Some("id"));
        assert_eq!(
            out,
            r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2), ($3, $4) RETURNING "id""#
        );

        out.clear();
        WRITER.write_update(&mut out, "users", &["name", "age"], "id");
        assert_eq!(
            out,
            r#"UPDATE "users" SET "name" = $1, "age" = $2 WHERE "id" = $3"#
        );

        out.clear();
        WRITER.write_delete(&mut out, "my \"odd\" table", &["id"]);
        assert_eq!(out, r#"DELETE FROM "my ""odd"" table" WHERE "id" = $1"#);
    }

    #[test]
    fn compile_select() {
        let query = SelectQuery::raw(Statement::new("SELECT * FROM users;\n").bind(1_i64));
        assert_eq!(query.compile(&WRITER).sql, "SELECT * FROM users");
        let limited = query.clone().limit(Some(10)).offset(Some(20));
        let compiled = limited.compile(&WRITER);
        assert_eq!(compiled.sql, "SELECT * FROM users LIMIT 10 OFFSET 20");
        assert_eq!(compiled.params, [Value::Int64(Some(1))]);

        let window = limited.window(5, Some(10));
        assert_eq!((window.offset, window.limit), (Some(25), Some(5)));
        let window = limited.window(0, None);
        assert_eq!((window.offset, window.limit), (Some(20), Some(10)));
        let window = query.window(3, None);
        assert_eq!((window.offset, window.limit), (Some(3), None));
        let window = limited.window(15, Some(2));
        assert_eq!(window.limit, Some(0));
    }

    #[test]
    fn query_kinds() {
        let select: Query<RowLabeled> = SelectQuery::raw("SELECT 1").into();
        assert!(select.is_select());
        let insert: Query<RowLabeled> = InsertQuery::new("INSERT INTO t VALUES ($1)", 1).into();
        assert!(!insert.is_select());
        assert!(!Query::<RowLabeled>::delete("DELETE FROM t").is_select());
        let statement = Statement::from("SELECT * FROM t WHERE a = $1").bind("x");
        assert_eq!(statement.to_string(), "SELECT * FROM t WHERE a = $1");
    }

    async fn colors(driver: &MemoryDriver) -> Arc<Database<MemoryDriver>> {
        let database = Arc::new(
            Database::new(driver.clone(), DatabaseConfig::new("memory", "colors"))
                .expect("Could not create the database"),
        );
        run_script(
            &mut database.session(),
            &[indoc! {"
                CREATE TABLE colors (
                    id INTEGER PRIMARY KEY,
                    name VARCHAR(20)
                )
            "}],
        )
        .await
        .expect("Could not create the table");
        database
    }

    #[tokio::test]
    async fn multi_row_insert_keys() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = colors(&driver).await;
        let mut session = database.session();
        let mut sql = String::new();
        WRITER.write_insert(&mut sql, "colors", &["id", "name"], 3, Some("id"));
        let insert = InsertQuery::new(
            Statement::new(sql).with_params([
                Value::Int64(Some(7)),
                "red".into(),
                Value::Int64(None),
                "green".into(),
                Value::Int64(Some(9)),
                "blue".into(),
            ]),
            3,
        )
        .returning("id")
        .keys(vec![Some(Value::Int64(Some(7))), None, Some(Value::Int64(Some(9)))]);
        let affected = session
            .run(&insert)
            .await
            .expect("Could not insert")
            .into_vec();
        let keys: Vec<_> = affected
            .iter()
            .map(|v| v.last_affected_id.clone())
            .collect();
        assert_eq!(keys[0], Some(Value::Int64(Some(7))));
        assert!(matches!(keys[1], Some(Value::Int64(Some(..)))));
        assert_eq!(keys[2], Some(Value::Int64(Some(9))));
        assert!(affected.iter().all(|v| v.rows_affected == 1));

        // The eager combinators cannot wait for the returned keys, nothing runs
        let statements = driver.store().statements().len();
        let mut sql = String::new();
        WRITER.write_insert(&mut sql, "colors", &["name"], 2, Some("id"));
        let rejected = InsertQuery::new(
            Statement::new(sql).bind("cyan").bind("magenta"),
            2,
        )
        .returning("id");
        silent_logs! {
            let error = session
                .run_with(&rejected, &Eager)
                .await
                .expect_err("The returned keys are pending");
            assert!(is_db_error(&error, |e| matches!(e, DbError::Configuration(..))));
            let error = session
                .run_with(&Query::<RowLabeled>::Insert(rejected.clone()), &Eager)
                .await
                .expect_err("The returned keys are pending");
            assert!(is_db_error(&error, |e| matches!(e, DbError::Configuration(..))));
        }
        assert_eq!(driver.store().statements().len(), statements);
        assert_eq!(
            driver
                .store()
                .table("colors")
                .expect("The table exists")
                .rows
                .len(),
            3
        );
        assert_eq!(driver.store().in_use(), 0);
    }

    #[tokio::test]
    async fn outcome_of_any_query() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = colors(&driver).await;
        let mut session = database.session();
        let queries: Vec<Query<String>> = vec![
            Query::insert(
                Statement::new(r#"INSERT INTO "colors" ("name") VALUES ($1), ($2)"#)
                    .bind("cyan")
                    .bind("magenta"),
                2,
            ),
            Query::update(
                Statement::new(r#"UPDATE "colors" SET "name" = $1 WHERE "name" = $2"#)
                    .bind("yellow")
                    .bind("magenta"),
            ),
            Query::select(r#"SELECT "name" FROM "colors""#, |row: RowLabeled| {
                row.decode::<String>("name")
            }),
            Query::delete(r#"DELETE FROM "colors""#),
        ];
        let mut outcomes = Vec::new();
        for query in &queries {
            outcomes.push(session.run_with(query, &Eager).await.expect("Could not run"));
        }
        let [insert, update, select, delete] = &outcomes[..] else {
            panic!("One outcome per query");
        };
        assert!(matches!(
            insert,
            Resolved::Single(Outcome::Affected(v)) if v.rows_affected == 2
        ));
        assert!(matches!(
            update,
            Resolved::Single(Outcome::Affected(v)) if v.rows_affected == 1
        ));
        assert_eq!(
            *select,
            Resolved::Single(Outcome::Rows(vec!["cyan".into(), "yellow".into()]))
        );
        assert!(matches!(
            delete,
            Resolved::Single(Outcome::Affected(v)) if v.rows_affected == 2
        ));
    }
}
