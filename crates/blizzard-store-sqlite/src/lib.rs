//! SQLite backend for the Blizzard loader.
//!
//! Connections are [`tokio_rusqlite`] handles, so all database access runs on
//! dedicated threads without blocking the async runtime. A bounded [`Pool`]
//! hands them out to concurrent workers; each filing is written inside one
//! `IMMEDIATE` transaction on one pooled connection.

mod definitions;
mod encode;
mod loader;
mod pool;
mod retry;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use pool::{Pool, PoolConfig, PooledConnection};
pub use retry::RetryPolicy;
pub use store::{
  FilingRowCounts, SqliteStore, StoredGroup, StoredValue, TableCounts,
};
