#[cfg(test)]
mod tests {
    use ferry::{Database, DatabaseConfig, Model, Value};
    use ferry_memory::MemoryDriver;
    use ferry_tests::{Book, Review, init_logs, run_script};
    use std::sync::Arc;

    async fn library(driver: &MemoryDriver) -> Arc<Database<MemoryDriver>> {
        let database = Arc::new(
            Database::new(driver.clone(), DatabaseConfig::new("memory", "library"))
                .expect("Could not create the database"),
        );
        run_script(
            &mut database.session(),
            &[
                "CREATE TABLE books (id INTEGER PRIMARY KEY, title VARCHAR, author VARCHAR, year INTEGER)",
                "CREATE TABLE reviews (id INTEGER PRIMARY KEY, book INTEGER, stars INTEGER)",
            ],
        )
        .await
        .expect("Could not create the tables");
        driver.store().clear_journal();
        database
    }

    #[tokio::test]
    async fn save_inserts_then_updates() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = library(&driver).await;
        let mut session = database.session();
        let mut book = Book::new("Neuromancer", "William Gibson", 1984);
        let affected = book.save(&mut session).await.expect("Could not insert");
        assert_eq!(book.id, Some(1));
        assert_eq!(affected.last_affected_id, Some(Value::Int64(Some(1))));

        book.title = "Count Zero".into();
        book.year = 1986;
        book.save(&mut session).await.expect("Could not update");
        assert_eq!(book.id, Some(1));

        let statements = driver.store().statements();
        assert_eq!(
            statements,
            [
                r#"INSERT INTO "books" ("title", "author", "year") VALUES ($1, $2, $3) RETURNING "id""#,
                "COMMIT",
                r#"UPDATE "books" SET "title" = $1, "author" = $2, "year" = $3 WHERE "id" = $4"#,
                "COMMIT",
            ]
        );
        let stored = driver.store().table("books").expect("The table exists");
        assert_eq!(stored.rows.len(), 1);
        assert_eq!(stored.rows[0][1], "Count Zero".into());
    }

    #[tokio::test]
    async fn force_insert_keeps_the_key() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = library(&driver).await;
        let mut session = database.session();
        let mut book = Book {
            id: Some(42),
            ..Book::new("Snow Crash", "Neal Stephenson", 1992)
        };
        book.save_with(&mut session, true)
            .await
            .expect("Could not insert with an explicit key");
        assert_eq!(book.id, Some(42));
        let found = Book::get_by_key(&mut session, 42_i64)
            .await
            .expect("Could not find the book");
        assert_eq!(found, book);
        assert!(
            driver.store().statements()[0]
                .starts_with(r#"INSERT INTO "books" ("id", "title", "author", "year")"#)
        );

        // Without forcing, a book with a key is updated
        let mut missing = Book {
            id: Some(7),
            ..Book::new("Anathem", "Neal Stephenson", 2008)
        };
        let affected = missing
            .save(&mut session)
            .await
            .expect("An update of nothing is not an error");
        assert_eq!(affected.rows_affected, 0);
    }

    #[tokio::test]
    async fn delete_dependents_first() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = library(&driver).await;
        let mut session = database.session();
        let mut book = Book::new("Solaris", "Stanislaw Lem", 1961);
        book.save(&mut session).await.expect("Could not insert");
        let id = book.id.expect("The key was assigned");
        for stars in [3, 5] {
            let mut review = Review {
                id: None,
                book: id,
                stars,
            };
            review.save(&mut session).await.expect("Could not insert");
        }
        driver.store().clear_journal();

        let affected = book
            .delete_instance(&mut session, true)
            .await
            .expect("Could not delete");
        assert_eq!(affected.rows_affected, 1);
        assert_eq!(
            driver.store().statements(),
            [
                r#"DELETE FROM "reviews" WHERE "book" = $1"#,
                "COMMIT",
                r#"DELETE FROM "books" WHERE "id" = $1"#,
                "COMMIT",
            ]
        );
        assert!(driver.store().table("reviews").is_some_and(|v| v.rows.is_empty()));
        assert_eq!(
            Book::select(&mut session)
                .count()
                .await
                .expect("Could not count"),
            0
        );
    }

    #[tokio::test]
    async fn delete_without_dependents() {
        init_logs();
        let driver = MemoryDriver::new();
        let database = library(&driver).await;
        let mut session = database.session();
        let mut book = Book::new("Ubik", "Philip K. Dick", 1969);
        book.save(&mut session).await.expect("Could not insert");
        Review {
            id: None,
            book: book.id.expect("The key was assigned"),
            stars: 4,
        }
        .save(&mut session)
        .await
        .expect("Could not insert");
        book.delete_instance(&mut session, false)
            .await
            .expect("Could not delete");
        assert_eq!(
            driver
                .store()
                .table("reviews")
                .map(|v| v.rows.len())
                .unwrap_or_default(),
            1
        );
    }
}
