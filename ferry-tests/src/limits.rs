use crate::{run_script, silent_logs};
use ferry::{
    Database, DbError, Driver, InsertQuery, Resolved, RowLabeled, SelectQuery, Statement, Value,
    is_db_error,
};
use std::{
    collections::HashSet,
    ops::Bound,
    sync::{Arc, LazyLock},
};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

fn values_query() -> SelectQuery<i64> {
    #[cfg(not(feature = "disable-ordering"))]
    let sql = r#"SELECT "value" FROM "numbers" ORDER BY "value""#;
    #[cfg(feature = "disable-ordering")]
    let sql = r#"SELECT "value" FROM "numbers""#;
    SelectQuery::new(sql, |row: RowLabeled| row.decode::<i64>("value"))
}

pub async fn limits<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = MUTEX.lock().await;
    let mut session = database.session();

    // Setup
    run_script(
        &mut session,
        &[
            "DROP TABLE IF EXISTS numbers",
            "CREATE TABLE numbers (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)",
        ],
    )
    .await
    .expect("Failed to create the numbers table");

    // One insert statement for all the rows, every row reports its own key
    let mut sql = String::new();
    database
        .sql_writer()
        .write_insert(&mut sql, "numbers", &["value"], 10, Some("id"));
    let values: Vec<Value> = (0..10_i64).rev().map(|v| (v * 10).into()).collect();
    let insert = InsertQuery::new(Statement::new(sql).with_params(values), 10).returning("id");
    let Resolved::Batch(affected) = session
        .run(&insert)
        .await
        .expect("Failed to insert the numbers")
    else {
        panic!("A multi row insert should resolve to one result per row");
    };
    assert_eq!(affected.len(), 10);
    let keys: HashSet<_> = affected
        .iter()
        .map(|v| v.last_affected_id.clone().expect("Every row has a key"))
        .map(|v| format!("{:?}", v))
        .collect();
    assert_eq!(keys.len(), 10);

    // Awaiting the select returns the first row
    let first = session
        .select(values_query())
        .await
        .expect("Failed to get the first number");
    #[cfg(not(feature = "disable-ordering"))]
    assert_eq!(first, Some(0));
    #[cfg(feature = "disable-ordering")]
    assert!(first.is_some());

    let count = session
        .select(values_query())
        .count()
        .await
        .expect("Failed to count the numbers");
    assert_eq!(count, 10);

    // Slices
    let slice = session
        .select(values_query())
        .slice(2..5)
        .await
        .expect("Failed to slice the numbers");
    assert_eq!(slice.len(), 3);
    #[cfg(not(feature = "disable-ordering"))]
    {
        assert_eq!(slice, [20, 30, 40]);
        let head = session
            .select(values_query())
            .slice(..3)
            .await
            .expect("Failed to get the head");
        assert_eq!(head, [0, 10, 20]);
        let tail = session
            .select(values_query())
            .slice(8..)
            .await
            .expect("Failed to get the tail");
        assert_eq!(tail, [80, 90]);
        let inclusive = session
            .select(values_query())
            .slice(2..=3)
            .await
            .expect("Failed to slice with an inclusive range");
        assert_eq!(inclusive, [20, 30]);
        let windowed = session
            .select(values_query().offset(Some(2)).limit(Some(5)))
            .slice(1..3)
            .await
            .expect("Failed to slice a limited query");
        assert_eq!(windowed, [30, 40]);
        let clipped = session
            .select(values_query().limit(Some(4)))
            .slice(2..8)
            .await
            .expect("Failed to slice past the limit");
        assert_eq!(clipped, [20, 30]);
        let tail = session
            .select(values_query())
            .slice(8..i64::MAX)
            .await
            .expect("Failed to slice up to the largest stop");
        assert_eq!(tail, [80, 90]);
        let nth = session
            .select(values_query())
            .nth(3)
            .await
            .expect("Failed to get the fourth number");
        assert_eq!(nth, 30);
    }

    silent_logs! {
        let error = session
            .select(values_query())
            .slice(-1..)
            .await
            .expect_err("A negative start is not allowed");
        assert!(is_db_error(&error, |e| matches!(e, DbError::InvalidSlice(..))));
        assert!(format!("{:#}", error).contains("start can't be negative"));

        let error = session
            .select(values_query())
            .slice(5..3)
            .await
            .expect_err("The stop must be after the start");
        assert!(format!("{:#}", error).contains("stop must be greater than start"));

        let error = session
            .select(values_query())
            .slice(..0)
            .await
            .expect_err("The stop must be positive");
        assert!(format!("{:#}", error).contains("stop must be positive"));

        let error = session
            .select(values_query())
            .slice(..=i64::MAX)
            .await
            .expect_err("The stop does not fit");
        assert!(is_db_error(&error, |e| matches!(e, DbError::InvalidSlice(..))));
        let error = session
            .select(values_query())
            .slice((Bound::Excluded(i64::MAX), Bound::Unbounded))
            .await
            .expect_err("The start does not fit");
        assert!(format!("{:#}", error).contains("bound out of range"));

        let error = session
            .select(values_query())
            .nth(10)
            .await
            .expect_err("There are only ten numbers");
        assert!(is_db_error(&error, |e| matches!(e, DbError::IndexOutOfRange(10))));

        let error = session
            .select(values_query())
            .nth(-1)
            .await
            .expect_err("Negative indexes are not supported");
        assert!(is_db_error(&error, |e| matches!(e, DbError::IndexOutOfRange(-1))));
    }

    // Get
    let fifty = session
        .select(SelectQuery::new(
            Statement::new(r#"SELECT "value" FROM "numbers" WHERE "value" = $1"#).bind(50_i64),
            |row: RowLabeled| row.decode::<i64>("value"),
        ))
        .get()
        .await
        .expect("Failed to get the number 50");
    assert_eq!(fifty, 50);
    let empty = session
        .select(SelectQuery::new(
            Statement::new(r#"SELECT "value" FROM "numbers" WHERE "value" = $1"#).bind(55_i64),
            |row: RowLabeled| row.decode::<i64>("value"),
        ))
        .first()
        .await
        .expect("Failed to look for the number 55");
    assert_eq!(empty, None);
}
