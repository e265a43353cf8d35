//! Request handlers for reconciliation.

mod sync;

pub use sync::*;
