//! SQLite backend for the bubble-tracker datapoint store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated
//! connection threads without blocking the async runtime. Connections are
//! shared through a bounded [`SqlitePool`] that callers construct and pass in.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{PoolConfig, SqlitePool};
pub use store::SqliteStore;
