//! PostgreSQL persistence.

mod pool;
mod table;

pub use pool::*;
pub use table::*;
