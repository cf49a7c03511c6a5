mod books;
#[cfg(not(feature = "disable-transactions"))]
mod concurrent;
mod limits;
mod payments;
mod streaming;
#[cfg(not(feature = "disable-transactions"))]
mod transactions;

pub use books::{Book, Review};

use crate::{books::books, limits::limits, payments::payments, streaming::streaming};
#[cfg(not(feature = "disable-transactions"))]
use crate::{concurrent::concurrent, transactions::transactions};
use ferry::{Database, Driver, Query, Result, RowLabeled, Session};
use log::LevelFilter;
use std::{env, sync::Arc};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

pub async fn execute_tests<D: Driver>(database: Arc<Database<D>>) {
    books(&database).await;
    limits(&database).await;
    streaming(&database).await;
    payments(&database).await;
    #[cfg(not(feature = "disable-transactions"))]
    transactions(&database).await;
    #[cfg(not(feature = "disable-transactions"))]
    concurrent(&database).await;
}

/// Run statements that produce no rows, one after the other.
pub async fn run_script<D: Driver>(session: &mut Session<D>, statements: &[&str]) -> Result<()> {
    for sql in statements {
        session.run(&Query::<RowLabeled>::update(*sql)).await?;
    }
    Ok(())
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
