#[cfg(test)]
mod tests {
    use ferry::{
        Database, DatabaseConfig, DbError, Error, InsertQuery, SelectQuery, Session, Statement,
        TransactionState, is_db_error,
    };
    use ferry_memory::MemoryDriver;
    use ferry_tests::{init_logs, run_script, silent_logs};
    use std::sync::Arc;

    async fn setup(config: DatabaseConfig) -> (MemoryDriver, Arc<Database<MemoryDriver>>) {
        let driver = MemoryDriver::new();
        let database = Arc::new(
            Database::new(driver.clone(), config).expect("Could not create the database"),
        );
        let mut session = database.session();
        session.set_autocommit(true);
        run_script(
            &mut session,
            &["CREATE TABLE notes (id INTEGER PRIMARY KEY, text VARCHAR(100))"],
        )
        .await
        .expect("Could not create the notes table");
        driver.store().clear_journal();
        (driver, database)
    }

    fn note(text: &'static str) -> InsertQuery {
        InsertQuery::new(
            Statement::new(r#"INSERT INTO "notes" ("text") VALUES ($1)"#).bind(text),
            1,
        )
    }

    fn rows(driver: &MemoryDriver) -> usize {
        driver
            .store()
            .table("notes")
            .map(|v| v.rows.len())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn autocommit_statements() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let store = driver.store();
        let acquired = store.acquired();
        let mut session = database.session();
        session.run(&note("first")).await.expect("Could not insert");
        session
            .run(&SelectQuery::raw(r#"SELECT * FROM "notes""#))
            .await
            .expect("Could not select");
        assert_eq!(
            store.statements(),
            [
                r#"INSERT INTO "notes" ("text") VALUES ($1)"#,
                "COMMIT",
                r#"SELECT * FROM "notes""#
            ]
        );
        // Both statements ran on their own connection, back in the pool
        assert_eq!(store.acquired() - acquired, 2);
        assert_eq!(store.in_use(), 0);
        assert_eq!(store.opened(), 1);
    }

    #[tokio::test]
    async fn nested_begin_joins() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let mut session = database.session();
        let id = session.begin().await.expect("Could not begin");
        silent_logs! {
            assert_eq!(session.begin().await.expect("Could not join"), id);
            assert_eq!(session.begin().await.expect("Could not join"), id);
        }
        session.run(&note("a")).await.expect("Could not insert");
        session.run(&note("b")).await.expect("Could not insert");
        assert_eq!(driver.store().in_use(), 1);
        assert_eq!(session.commit().await.expect("Could not commit"), Some(id));
        assert_eq!(session.commit().await.expect("Nothing to commit"), None);

        let store = driver.store();
        assert_eq!(store.count_statements("BEGIN"), 1);
        assert_eq!(store.count_statements("COMMIT"), 1);
        assert_eq!(store.count_statements("ROLLBACK"), 0);
        // Everything ran on the connection that issued BEGIN
        let journal = store.journal();
        assert!(journal.iter().all(|v| v.connection == journal[0].connection));
        assert_eq!(store.in_use(), 0);
        assert_eq!(rows(&driver), 2);
    }

    #[tokio::test]
    async fn scope_rolls_back_on_error() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let mut session = database.session();
        silent_logs! {
            let result = session
                .transaction(async |session: &mut Session<MemoryDriver>| {
                    session.run(&note("lost")).await?;
                    assert_eq!(session.transaction_state(), TransactionState::Active);
                    Err::<(), _>(Error::msg("Something went wrong"))
                })
                .await;
            assert!(result.is_err());
        }
        let store = driver.store();
        assert_eq!(store.count_statements("BEGIN"), 1);
        assert_eq!(store.count_statements("ROLLBACK"), 1);
        assert_eq!(store.count_statements("COMMIT"), 0);
        assert_eq!(store.in_use(), 0);
        assert_eq!(rows(&driver), 0);
        assert!(session.autocommit());
    }

    #[tokio::test]
    async fn scope_commits_once() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let mut session = database.session();
        session
            .transaction(async |session: &mut Session<MemoryDriver>| {
                session.run(&note("kept")).await?;
                session
                    .transaction(async |session: &mut Session<MemoryDriver>| {
                        session.run(&note("inner")).await?;
                        Ok(())
                    })
                    .await
            })
            .await
            .expect("Could not run the transaction");
        let store = driver.store();
        assert_eq!(store.count_statements("BEGIN"), 1);
        assert_eq!(store.count_statements("COMMIT"), 1);
        assert_eq!(rows(&driver), 2);
    }

    #[tokio::test]
    async fn restart_keeps_the_connection() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let acquired = driver.store().acquired();
        let mut session = database.session();
        let id = session.begin().await.expect("Could not begin");
        session.run(&note("one")).await.expect("Could not insert");
        session
            .commit_and_restart()
            .await
            .expect("Could not commit and restart");
        session.run(&note("two")).await.expect("Could not insert");
        session
            .rollback_and_restart()
            .await
            .expect("Could not rollback and restart");
        assert_eq!(session.transaction_id(), Some(id));
        session.rollback().await.expect("Could not rollback");

        let store = driver.store();
        assert_eq!(
            store
                .statements()
                .into_iter()
                .filter(|v| !v.starts_with("INSERT"))
                .collect::<Vec<_>>(),
            ["BEGIN", "COMMIT", "BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]
        );
        assert_eq!(store.acquired() - acquired, 1);
        assert_eq!(rows(&driver), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_the_connection() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        silent_logs! {
            let mut session = database.session();
            session.begin().await.expect("Could not begin");
            session.run(&note("abandoned")).await.expect("Could not insert");
            drop(session);
        }
        let store = driver.store();
        assert_eq!(store.discarded(), 1);
        assert_eq!(store.in_use(), 0);
        assert_eq!(rows(&driver), 0);
    }

    #[tokio::test]
    async fn autocommit_disabled() {
        init_logs();
        let (driver, database) =
            setup(DatabaseConfig::new("memory", "notes").autocommit(false)).await;
        let mut session = database.session();
        assert!(!session.autocommit());
        silent_logs! {
            let error = session
                .run(&note("refused"))
                .await
                .expect_err("Statements need a transaction");
            assert!(is_db_error(&error, |e| matches!(e, DbError::TransactionState(..))));
        }
        session
            .transaction(async |session: &mut Session<MemoryDriver>| {
                session.run(&note("accepted")).await?;
                Ok(())
            })
            .await
            .expect("Could not run the transaction");
        assert!(!session.autocommit());
        assert_eq!(rows(&driver), 1);
    }

    #[tokio::test]
    async fn failed_begin_leaves_no_transaction() {
        init_logs();
        let database = Arc::new(
            Database::new(MemoryDriver::failing(), DatabaseConfig::new("memory", "down"))
                .expect("Could not create the database"),
        );
        let mut session = database.session();
        silent_logs! {
            let error = session.begin().await.expect_err("The pool is unavailable");
            assert!(is_db_error(&error, |e| matches!(e, DbError::PoolUnavailable(..))));
        }
        assert!(!session.in_transaction());
        assert!(session.autocommit());
        assert_eq!(session.transaction_state(), TransactionState::Inactive);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        init_logs();
        let (driver, database) = setup(DatabaseConfig::new("memory", "notes")).await;
        let mut first = database.session();
        let mut second = database.session();
        let (a, b) = tokio::join!(first.begin(), second.begin());
        let (a, b) = (a.expect("Could not begin"), b.expect("Could not begin"));
        assert_ne!(a, b);
        let (first_note, second_note) = (note("first"), note("second"));
        let (a, b) = tokio::join!(first.run(&first_note), second.run(&second_note));
        a.expect("Could not insert");
        b.expect("Could not insert");
        first.commit().await.expect("Could not commit");
        assert!(!first.in_transaction());
        assert!(second.in_transaction());
        second.rollback().await.expect("Could not rollback");

        let store = driver.store();
        assert_eq!(store.peak_in_use(), 2);
        assert_eq!(store.in_use(), 0);
        let table = store.table("notes").expect("The table exists");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][1], "first".into());
    }
}
