use crate::run_script;
use ferry::{Database, Driver, InsertQuery, RowLabeled, SelectQuery, Statement, Value};
use rust_decimal::Decimal;
use std::sync::{Arc, LazyLock};
use time::{PrimitiveDateTime, macros::datetime};
use tokio::sync::Mutex;
use uuid::Uuid;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
struct Payment {
    reference: Uuid,
    amount: Decimal,
    fee: Option<Decimal>,
    paid_at: PrimitiveDateTime,
}

fn payment(reference: Uuid) -> SelectQuery<Payment> {
    SelectQuery::new(
        Statement::new(
            r#"SELECT "reference", "amount", "fee", "paid_at" FROM "payments" WHERE "reference" = $1"#,
        )
        .bind(reference),
        |row: RowLabeled| {
            Ok(Payment {
                reference: row.decode("reference")?,
                amount: row.decode("amount")?,
                fee: row.decode("fee")?,
                paid_at: row.decode("paid_at")?,
            })
        },
    )
}

pub async fn payments<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = MUTEX.lock().await;
    let mut session = database.session();

    // Setup
    run_script(
        &mut session,
        &[
            "DROP TABLE IF EXISTS payments",
            "CREATE TABLE payments (id INTEGER PRIMARY KEY, reference UUID, amount DECIMAL(10, 2), fee DECIMAL(10, 2), paid_at TIMESTAMP)",
        ],
    )
    .await
    .expect("Failed to create the payments table");
    let stored = [
        Payment {
            reference: Uuid::from_u128(0x6f1c_2a94_41b3_4c8e_9d0f_3e5a_7b21_c4d8),
            amount: Decimal::new(1999, 2),
            fee: Some(Decimal::new(35, 2)),
            paid_at: datetime!(2025-03-14 09:26:53),
        },
        Payment {
            reference: Uuid::from_u128(0x0b7d_91e2_5a60_4f13_8c2e_d4a9_1f06_77b3),
            amount: Decimal::new(-5000, 2),
            fee: None,
            paid_at: datetime!(2024-12-31 23:59:59.5),
        },
    ];
    for payment in &stored {
        let statement = Statement::new(
            r#"INSERT INTO "payments" ("reference", "amount", "fee", "paid_at") VALUES ($1, $2, $3, $4)"#,
        )
        .bind(payment.reference)
        .bind(payment.amount)
        .bind(payment.fee)
        .bind(payment.paid_at);
        session
            .run(&InsertQuery::new(statement, 1))
            .await
            .expect("Failed to insert a payment");
    }

    // Typed values come back unchanged
    for expected in &stored {
        let found = session
            .select(payment(expected.reference))
            .get()
            .await
            .expect("Failed to get the payment");
        assert_eq!(found, *expected);
    }

    let refund = session
        .select(SelectQuery::raw(
            Statement::new(r#"SELECT * FROM "payments" WHERE "amount" = $1"#)
                .bind(Decimal::new(-5000, 2)),
        ))
        .get()
        .await
        .expect("Failed to find the refund");
    assert_eq!(refund.get_column("fee"), Some(&Value::Decimal(None)));
    assert_eq!(
        refund.get_column("reference"),
        Some(&Value::Uuid(Some(stored[1].reference)))
    );

    let missing = session
        .select(payment(Uuid::nil()))
        .first()
        .await
        .expect("Failed to look for a missing payment");
    assert!(missing.is_none());
}
