use crate::{run_script, silent_logs};
use ferry::{
    Database, DbError, Driver, Error, InsertQuery, Result, RowLabeled, SelectQuery, Session,
    Statement, TransactionState, is_db_error,
};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

pub(crate) static ACCOUNTS: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) fn deposit(owner: &str, amount: i64) -> InsertQuery {
    InsertQuery::new(
        Statement::new(r#"INSERT INTO "accounts" ("owner", "amount") VALUES ($1, $2)"#)
            .bind(owner.to_string())
            .bind(amount),
        1,
    )
}

pub(crate) async fn deposits<D: Driver>(session: &mut Session<D>, owner: &str) -> usize {
    session
        .select(SelectQuery::new(
            Statement::new(r#"SELECT * FROM "accounts" WHERE "owner" = $1"#)
                .bind(owner.to_string()),
            |row: RowLabeled| row.decode::<i64>("amount"),
        ))
        .count()
        .await
        .expect("Failed to count the deposits")
}

pub(crate) async fn create_accounts<D: Driver>(session: &mut Session<D>) -> Result<()> {
    run_script(
        session,
        &[
            "DROP TABLE IF EXISTS accounts",
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner VARCHAR(50), amount INTEGER)",
        ],
    )
    .await
}

pub async fn transactions<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = ACCOUNTS.lock().await;
    let mut session = database.session();
    create_accounts(&mut session)
        .await
        .expect("Failed to create the accounts table");

    // Nothing to complete outside a transaction
    assert_eq!(session.commit().await.expect("Commit is a no-op"), None);
    assert_eq!(session.rollback().await.expect("Rollback is a no-op"), None);
    assert_eq!(session.transaction_state(), TransactionState::Inactive);

    // Explicit begin and rollback
    let id = session.begin().await.expect("Failed to begin");
    assert!(session.in_transaction());
    assert!(!session.autocommit());
    assert_eq!(session.transaction_state(), TransactionState::Active);
    silent_logs! {
        let nested = session.begin().await.expect("A nested begin joins the transaction");
        assert_eq!(nested, id);
    }
    session
        .run(&deposit("alice", 100))
        .await
        .expect("Failed to deposit inside the transaction");
    assert_eq!(deposits(&mut session, "alice").await, 1);
    assert_eq!(session.rollback().await.expect("Failed to rollback"), Some(id));
    assert!(!session.in_transaction());
    assert!(session.autocommit());
    assert_eq!(deposits(&mut session, "alice").await, 0);

    // Scope committing its work
    let value = session
        .transaction(async |session: &mut Session<D>| {
            session.run(&deposit("alice", 100)).await?;
            session.run(&deposit("alice", 50)).await?;
            Ok(150)
        })
        .await
        .expect("The transaction scope failed");
    assert_eq!(value, 150);
    assert!(!session.in_transaction());
    assert_eq!(deposits(&mut database.session(), "alice").await, 2);

    // Scope rolled back by its error
    silent_logs! {
        let result = session
            .transaction(async |session: &mut Session<D>| {
                session.run(&deposit("bob", 10)).await?;
                Err::<(), _>(Error::msg("Insufficient funds"))
            })
            .await;
        let error = result.expect_err("The scope returned an error");
        assert!(format!("{:#}", error).contains("Insufficient funds"));
    }
    assert!(!session.in_transaction());
    assert_eq!(deposits(&mut session, "bob").await, 0);

    // A nested scope joins the outer transaction
    session
        .transaction(async |session: &mut Session<D>| {
            let outer = session.transaction_id();
            session
                .transaction(async |session: &mut Session<D>| {
                    assert_eq!(session.transaction_id(), outer);
                    session.run(&deposit("carol", 5)).await?;
                    Ok(())
                })
                .await?;
            assert!(session.in_transaction(), "The inner scope does not commit");
            session.run(&deposit("carol", 5)).await?;
            Ok(())
        })
        .await
        .expect("The nested transaction scopes failed");
    assert_eq!(deposits(&mut session, "carol").await, 2);

    // Commit and keep going on the same transaction
    let id = session.begin().await.expect("Failed to begin");
    session
        .run(&deposit("dave", 1))
        .await
        .expect("Failed to deposit");
    assert_eq!(
        session
            .commit_and_restart()
            .await
            .expect("Failed to commit and restart"),
        Some(id)
    );
    assert_eq!(session.transaction_id(), Some(id));
    assert_eq!(session.transaction_state(), TransactionState::Active);
    session
        .run(&deposit("dave", 2))
        .await
        .expect("Failed to deposit");
    session
        .rollback_and_restart()
        .await
        .expect("Failed to rollback and restart");
    assert!(session.in_transaction());
    session.commit().await.expect("Failed to commit");
    assert_eq!(deposits(&mut session, "dave").await, 1);

    // With autocommit disabled statements need a transaction
    session.set_autocommit(false);
    silent_logs! {
        let error = session
            .run(&deposit("erin", 1))
            .await
            .expect_err("There is no transaction to run the statement in");
        assert!(is_db_error(&error, |e| matches!(e, DbError::TransactionState(..))));
    }
    session.set_autocommit(true);
    assert_eq!(deposits(&mut session, "erin").await, 0);
}
