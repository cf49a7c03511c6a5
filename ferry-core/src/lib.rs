mod as_value;
mod config;
mod database;
mod deferred_cursor;
mod driver;
mod error;
mod executor;
mod model;
mod query;
mod resolve;
mod result;
mod session;
mod sql_writer;
mod transaction;
mod util;
mod value;

pub use ::anyhow::Context;
pub use ::indoc;
pub use as_value::*;
pub use config::*;
pub use database::*;
pub use deferred_cursor::*;
pub use driver::*;
pub use error::*;
pub use executor::*;
pub use model::*;
pub use query::*;
pub use resolve::*;
pub use result::*;
pub use session::*;
pub use sql_writer::*;
pub use transaction::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
