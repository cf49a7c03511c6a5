use crate::transactions::{ACCOUNTS, create_accounts, deposit, deposits};
use ferry::{Database, Driver, Result, Session, TransactionId};
use std::sync::Arc;

async fn transfer<D: Driver>(
    database: &Arc<Database<D>>,
    owner: &str,
    count: i64,
) -> Result<Option<TransactionId>> {
    let mut session = database.session();
    session
        .transaction(async |session: &mut Session<D>| {
            for amount in 0..count {
                session.run(&deposit(owner, amount)).await?;
                tokio::task::yield_now().await;
            }
            Ok(session.transaction_id())
        })
        .await
}

pub async fn concurrent<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = ACCOUNTS.lock().await;
    create_accounts(&mut database.session())
        .await
        .expect("Failed to create the accounts table");

    // Every task runs its own transaction on its own connection
    let (a, b, c) = tokio::join!(
        transfer(database, "frank", 3),
        transfer(database, "grace", 4),
        transfer(database, "heidi", 5),
    );
    let a = a.expect("The first transfer failed");
    let b = b.expect("The second transfer failed");
    let c = c.expect("The third transfer failed");
    assert!(a.is_some() && b.is_some() && c.is_some());
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);

    let mut session = database.session();
    assert!(!session.in_transaction());
    assert_eq!(deposits(&mut session, "frank").await, 3);
    assert_eq!(deposits(&mut session, "grace").await, 4);
    assert_eq!(deposits(&mut session, "heidi").await, 5);
}
