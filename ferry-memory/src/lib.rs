mod connection;
mod cursor;
mod driver;
mod parse;
mod pool;
mod store;

pub use connection::*;
pub use cursor::*;
pub use driver::*;
pub use parse::*;
pub use pool::*;
pub use store::*;
