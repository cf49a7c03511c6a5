use crate::{run_script, silent_logs};
use ferry::{
    AsValue, Database, DbError, Driver, Model, Query, Result, RowLabeled, Statement, Value,
    is_db_error,
};
use indoc::indoc;
use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: Option<i64>,
    pub title: String,
    pub author: String,
    pub year: i64,
}

impl Book {
    pub fn new(title: &str, author: &str, year: i64) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
            year,
        }
    }
}

impl Model for Book {
    fn table_name() -> &'static str {
        "books"
    }

    fn columns() -> &'static [&'static str] {
        &["title", "author", "year"]
    }

    fn primary_key_column() -> &'static str {
        "id"
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Into::into)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        self.id = Some(i64::try_from_value(value)?);
        Ok(())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.title.clone().into(),
            self.author.clone().into(),
            self.year.into(),
        ]
    }

    fn from_row(row: RowLabeled) -> Result<Self> {
        Ok(Self {
            id: row.decode("id")?,
            title: row.decode("title")?,
            author: row.decode("author")?,
            year: row.decode("year")?,
        })
    }

    fn dependents(&self) -> Vec<Query<RowLabeled>> {
        let Some(id) = self.id else {
            return Vec::new();
        };
        vec![Query::delete(
            Statement::new(r#"DELETE FROM "reviews" WHERE "book" = $1"#).bind(id),
        )]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: Option<i64>,
    pub book: i64,
    pub stars: i64,
}

impl Model for Review {
    fn table_name() -> &'static str {
        "reviews"
    }

    fn columns() -> &'static [&'static str] {
        &["book", "stars"]
    }

    fn primary_key_column() -> &'static str {
        "id"
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Into::into)
    }

    fn set_primary_key(&mut self, value: Value) -> Result<()> {
        self.id = Some(i64::try_from_value(value)?);
        Ok(())
    }

    fn values(&self) -> Vec<Value> {
        vec![self.book.into(), self.stars.into()]
    }

    fn from_row(row: RowLabeled) -> Result<Self> {
        Ok(Self {
            id: row.decode("id")?,
            book: row.decode("book")?,
            stars: row.decode("stars")?,
        })
    }
}

pub async fn books<D: Driver>(database: &Arc<Database<D>>) {
    let _lock = MUTEX.lock().await;
    let mut session = database.session();

    // Setup
    run_script(
        &mut session,
        &[
            "DROP TABLE IF EXISTS reviews",
            "DROP TABLE IF EXISTS books",
            indoc! {r#"
                CREATE TABLE books (
                    id INTEGER PRIMARY KEY,
                    title VARCHAR(200) NOT NULL,
                    author VARCHAR(200) NOT NULL,
                    year INTEGER NOT NULL
                )
            "#},
            indoc! {r#"
                CREATE TABLE reviews (
                    id INTEGER PRIMARY KEY,
                    book INTEGER NOT NULL,
                    stars INTEGER NOT NULL
                )
            "#},
        ],
    )
    .await
    .expect("Failed to create the books tables");

    // Insert
    let mut books = vec![
        Book::new("Harry Potter and the Philosopher's Stone", "J.K. Rowling", 1997),
        Book::new("The Hobbit", "J.R.R. Tolkien", 1937),
        Book::new("The Fellowship of the Ring", "J.R.R. Tolkien", 1954),
        Book::new("Dune", "Frank Herbert", 1965),
    ];
    for book in books.iter_mut() {
        let affected = book
            .save(&mut session)
            .await
            .expect("Failed to save a new book");
        assert_eq!(affected.rows_affected, 1);
        assert!(book.id.is_some(), "The key was not stored in the instance");
        assert_eq!(affected.last_affected_id, book.primary_key());
    }
    let keys: HashSet<_> = books.iter().filter_map(|v| v.id).collect();
    assert_eq!(keys.len(), books.len());

    // Get by key
    let hobbit = Book::get_by_key(&mut session, books[1].id)
        .await
        .expect("Failed to get the book by key");
    assert_eq!(hobbit, books[1]);

    // Update
    books[3].year = 1966;
    let affected = books[3]
        .save(&mut session)
        .await
        .expect("Failed to update the book");
    assert_eq!(affected.rows_affected, 1);
    let dune = Book::get_by_key(&mut session, books[3].id)
        .await
        .expect("Failed to get the updated book");
    assert_eq!(dune.year, 1966);

    // Missing
    let missing = Book::get_by_key(&mut session, -1_i64).await;
    let error = missing.expect_err("A missing key should not produce a book");
    assert!(is_db_error(&error, |e| matches!(e, DbError::NotFound { .. })));
    assert!(format!("{:#}", error).contains("books"));

    // All
    let mut all = Book::select(&mut session)
        .all()
        .await
        .expect("Failed to select all the books");
    all.sort_by_key(|v| v.id);
    assert_eq!(all, books);
    let tolkien = session
        .select(Book::select_query(
            database.sql_writer(),
            &["author"],
            vec!["J.R.R. Tolkien".into()],
        ))
        .all()
        .await
        .expect("Failed to select the books by author");
    assert_eq!(tolkien.len(), 2);
    assert!(tolkien.iter().all(|v| v.author == "J.R.R. Tolkien"));

    // Reviews
    let book = books[0].id.expect("The book was saved");
    for stars in [5, 4, 5] {
        Review {
            id: None,
            book,
            stars,
        }
        .save(&mut session)
        .await
        .expect("Failed to save a review");
    }
    let reviews = session
        .select(Review::select_query(
            database.sql_writer(),
            &["book"],
            vec![book.into()],
        ))
        .count()
        .await
        .expect("Failed to count the reviews");
    assert_eq!(reviews, 3);

    // Delete
    let affected = books[0]
        .delete_instance(&mut session, true)
        .await
        .expect("Failed to delete the book with its reviews");
    assert_eq!(affected.rows_affected, 1);
    let reviews = session
        .select(Review::select_query(
            database.sql_writer(),
            &["book"],
            vec![book.into()],
        ))
        .first()
        .await
        .expect("Failed to look for the reviews");
    assert_eq!(reviews, None);
    let count = Book::select(&mut session)
        .count()
        .await
        .expect("Failed to count the books");
    assert_eq!(count, 3);

    silent_logs! {
        let never_saved = Book::new("The Silmarillion", "J.R.R. Tolkien", 1977);
        assert!(
            never_saved.delete_instance(&mut session, false).await.is_err(),
            "A book never saved cannot be deleted"
        );
    }
}
