#[cfg(test)]
mod tests {
    use ferry::{
        Database, DatabaseConfig, DbError, RowLabeled, SelectQuery, Statement, Value, is_db_error,
        stream::TryStreamExt,
    };
    use ferry_memory::MemoryDriver;
    use ferry_tests::{init_logs, run_script, silent_logs};
    use indoc::indoc;
    use std::{pin::pin, sync::Arc};

    async fn planets(driver: MemoryDriver) -> Arc<Database<MemoryDriver>> {
        let database = Arc::new(
            Database::new(driver.clone(), DatabaseConfig::new("memory", "space"))
                .expect("Could not create the database"),
        );
        run_script(
            &mut database.session(),
            &[
                "CREATE TABLE planets (id INTEGER PRIMARY KEY, name VARCHAR(20), moons INTEGER)",
                indoc! {"
                    INSERT INTO planets (name, moons) VALUES
                        ('Mercury', 0),
                        ('Venus', 0),
                        ('Earth', 1),
                        ('Mars', 2),
                        ('Jupiter', 95),
                        ('Saturn', 146)
                "},
            ],
        )
        .await
        .expect("Could not create the planets");
        driver.store().clear_journal();
        database
    }

    fn names() -> SelectQuery<String> {
        SelectQuery::new(r#"SELECT "name" FROM "planets""#, |row: RowLabeled| {
            row.decode::<String>("name")
        })
    }

    #[tokio::test]
    async fn statement_runs_once() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        let cursor = session.cursor(Statement::new(r#"SELECT * FROM "planets""#), false);
        assert!(!cursor.is_dispatched());
        assert!(driver.store().statements().is_empty(), "Nothing runs before awaiting");

        let other = cursor.clone();
        let (a, b) = tokio::join!(cursor.fetchone(), other.fetchone());
        let a = a.expect("Could not fetch").expect("There is a row");
        let b = b.expect("Could not fetch").expect("There is a row");
        assert_ne!(a.get_column("id"), b.get_column("id"));
        assert!(cursor.is_dispatched());
        assert_eq!(driver.store().statements().len(), 1);
        assert_eq!(
            cursor.fetchall().await.expect("Could not fetch").len(),
            4,
            "Clones share the position of the cursor"
        );
        assert_eq!(driver.store().statements().len(), 1);
    }

    #[tokio::test]
    async fn failure_is_shared() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        silent_logs! {
            let cursor = session.cursor(Statement::new(r#"SELECT * FROM "stars""#), false);
            let first = cursor.dispatch().await.expect_err("The table does not exist");
            let second = cursor.fetchone().await.expect_err("The failure is memoized");
            assert_eq!(format!("{:#}", first), format!("{:#}", second));
            assert!(format!("{:#}", first).contains("stars"));
        }
        assert_eq!(driver.store().statements().len(), 1);
        assert_eq!(driver.store().in_use(), 0);
    }

    #[tokio::test]
    async fn unnamed_cursor_closes_at_the_end() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        let mut rows = session
            .select(names())
            .execute()
            .await
            .expect("Could not execute");
        assert_eq!(driver.store().in_use(), 1);
        assert_eq!(rows.count().await.expect("Could not count"), 6);
        assert!(rows.is_populated());
        let cursor = rows.cursor().cursor().await.expect("The cursor exists");
        assert!(cursor.lock().await.is_closed());
        assert_eq!(driver.store().in_use(), 0, "Closing released the connection");
        assert_eq!(rows.into_cache()[2], "Earth");
    }

    #[tokio::test]
    async fn named_cursor_stays_open() {
        init_logs();
        let driver = MemoryDriver::new().with_named_cursors();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        {
            let mut rows = session
                .select(names())
                .execute()
                .await
                .expect("Could not execute");
            rows.fill_cache(None).await.expect("Could not fetch");
            assert!(rows.is_populated());
            assert!(rows.cursor().is_named().await.expect("The cursor exists"));
            let cursor = rows.cursor().cursor().await.expect("The cursor exists");
            let cursor = cursor.lock().await;
            assert!(!cursor.is_closed());
            assert!(
                cursor
                    .name()
                    .is_some_and(|v| v.starts_with("ferry_cursor_"))
            );
            assert_eq!(driver.store().in_use(), 1);
        }
        assert_eq!(driver.store().in_use(), 0, "Dropping the result released it");
    }

    #[tokio::test]
    async fn streaming_from_the_middle() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        let mut rows = session
            .select(names())
            .execute()
            .await
            .expect("Could not execute");
        let first = rows.advance().await.expect("Could not fetch");
        assert_eq!(first.as_deref(), Some("Mercury"));
        let rest: Vec<String> = rows
            .stream()
            .try_collect()
            .await
            .expect("Could not stream");
        assert_eq!(rest, ["Venus", "Earth", "Mars", "Jupiter", "Saturn"]);
        assert_eq!(rows.len().expect("Every row was fetched"), 6);
        let again: Vec<String> = rows
            .stream()
            .try_collect()
            .await
            .expect("Could not stream");
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn owned_stream_closes_the_cursor() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();
        let mut rows = session
            .select(names())
            .execute()
            .await
            .expect("Could not execute");
        rows.fill_cache(Some(4)).await.expect("Could not fetch");
        let cursor = rows.cursor().clone();
        let mut stream = pin!(rows.into_stream());
        let mut rest = Vec::new();
        while let Some(name) = stream.try_next().await.expect("Could not stream") {
            rest.push(name);
        }
        assert_eq!(rest, ["Jupiter", "Saturn"]);
        let cursor = cursor.cursor().await.expect("The cursor exists");
        assert!(cursor.lock().await.is_closed());
        assert_eq!(driver.store().in_use(), 0, "Closing released the connection");
        assert!(stream.try_next().await.expect("The stream ended").is_none());
    }

    #[tokio::test]
    async fn limits_in_the_statement() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();

        let first = session.select(names()).await.expect("Could not select");
        assert_eq!(first.as_deref(), Some("Mercury"));
        let slice = session
            .select(names())
            .slice(3..5)
            .await
            .expect("Could not slice");
        assert_eq!(slice, ["Mars", "Jupiter"]);
        assert_eq!(
            driver.store().statements(),
            [
                r#"SELECT "name" FROM "planets" LIMIT 1"#,
                r#"SELECT "name" FROM "planets" LIMIT 2 OFFSET 3"#,
            ]
        );

        silent_logs! {
            let error = session
                .select(SelectQuery::new(
                    Statement::new(r#"SELECT "name" FROM "planets" WHERE "moons" = $1"#)
                        .bind(1000_i64),
                    |row: RowLabeled| row.decode::<String>("name"),
                ))
                .get()
                .await
                .expect_err("No planet has a thousand moons");
            assert!(is_db_error(&error, |e| matches!(
                e,
                DbError::NotFound { params, .. } if params == &[Value::Int64(Some(1000))]
            )));
            let message = format!("{:#}", error);
            assert!(message.contains(r#"WHERE "moons" = $1 LIMIT 1"#));
            assert!(message.contains("1000"));
        }
    }

    #[tokio::test]
    async fn long_statement_error_is_reported() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = planets(driver.clone()).await;
        let mut session = database.session();

        // A multibyte character across the point where the SQL gets truncated
        let mut sql = String::from(r#"SELECT * FROM "comets" WHERE "name" = '"#);
        sql.push_str(&"a".repeat(496 - sql.len()));
        sql.push_str("éééé'");
        assert!(!sql.is_char_boundary(497));
        silent_logs! {
            let error = session
                .select(SelectQuery::raw(sql.as_str()))
                .all()
                .await
                .expect_err("The comets table does not exist");
            let message = format!("{:#}", error);
            assert!(message.contains("Table `comets` does not exist"));
            assert!(message.contains("..."));
        }
        assert_eq!(driver.store().in_use(), 0);
    }
}
