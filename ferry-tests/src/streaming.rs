use crate::{run_script, silent_logs};
use ferry::{
    Database, DbError, Driver, InsertQuery, RowLabeled, SelectQuery, Statement, Value,
    is_db_error, stream::TryStreamExt,
};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
struct Event {
    id: i64,
    kind: String,
}

fn events() -> SelectQuery<Event> {
    SelectQuery::new(
        r#"SELECT "id", "kind" FROM "events" ORDER BY "id""#,
        |row: RowLabeled| {
            Ok(Event {
                id: row.decode("id")?,
                kind: row.decode("kind")?,
            })
        },
    )
}

pub async fn streaming<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = MUTEX.lock().await;
    let mut session = database.session();

    // Setup
    run_script(
        &mut session,
        &[
            "DROP TABLE IF EXISTS events",
            "CREATE TABLE events (id INTEGER PRIMARY KEY, kind VARCHAR(20) NOT NULL)",
        ],
    )
    .await
    .expect("Failed to create the events table");
    let kinds = ["created", "started", "paused", "resumed", "stopped"];
    for (i, kind) in kinds.iter().enumerate() {
        let statement = Statement::new(r#"INSERT INTO "events" ("id", "kind") VALUES ($1, $2)"#)
            .bind(i as i64 + 1)
            .bind(*kind);
        session
            .run(&InsertQuery::new(statement, 1))
            .await
            .expect("Failed to insert an event");
    }

    // Lazy iteration, resumed by a stream
    {
        let mut rows = session
            .select(events())
            .execute()
            .await
            .expect("Failed to execute the events query");
        assert!(rows.cursor().is_dispatched());
        silent_logs! {
            let error = rows.len().expect_err("The length is unknown until every row is fetched");
            assert!(is_db_error(&error, |e| matches!(e, DbError::Unsupported("len"))));
            assert!(rows.iter().is_err());
        }
        let first = rows
            .iterate()
            .await
            .expect("Failed to fetch the first event")
            .cloned()
            .expect("There is a first event");
        assert_eq!(first.kind, "created");
        rows.fill_cache(Some(2))
            .await
            .expect("Failed to fetch the second event");
        assert_eq!(rows.cached().len(), 2);
        assert!(!rows.is_populated());
        let rest: Vec<Event> = rows
            .stream()
            .try_collect()
            .await
            .expect("Failed to stream the remaining events");
        assert_eq!(
            rest.iter().map(|v| v.kind.as_str()).collect::<Vec<_>>(),
            ["paused", "resumed", "stopped"]
        );
        assert!(rows.is_populated());
        assert_eq!(rows.len().expect("Every row was fetched"), 5);
        assert_eq!(
            rows.iter()
                .expect("Every row was fetched")
                .map(|v| v.id)
                .collect::<Vec<_>>(),
            [1, 2, 3, 4, 5]
        );
        let again = rows.iterate().await.expect("Iterating again is not an error");
        assert!(again.is_none());
        assert_eq!(rows.cached().len(), 5);
    }

    // Stream straight out of the select
    let streamed: Vec<Event> = session
        .select(events())
        .stream()
        .try_collect()
        .await
        .expect("Failed to stream the events");
    assert_eq!(streamed.len(), 5);
    assert_eq!(streamed[4].kind, "stopped");

    let raw = session
        .select(SelectQuery::raw(
            Statement::new(r#"SELECT * FROM "events" WHERE "kind" = $1"#).bind("paused"),
        ))
        .get()
        .await
        .expect("Failed to get the paused event");
    assert_eq!(raw.get_column("id"), Some(&Value::Int64(Some(3))));
    assert_eq!(raw.names(), ["id", "kind"]);
}
