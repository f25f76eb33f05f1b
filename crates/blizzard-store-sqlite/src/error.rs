//! Error type for `blizzard-store-sqlite`.

use std::time::Duration;

use blizzard_core::{field::FieldId, store::StoreFailure};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] blizzard_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Opening a new pooled connection failed.
  #[error("could not connect: {0}")]
  Connect(#[source] tokio_rusqlite::Error),

  #[error("timed out after {0:?} waiting for a pooled connection")]
  PoolTimeout(Duration),

  #[error("connection pool is closed")]
  PoolClosed,

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("field definition not found: {0}")]
  FieldNotFound(FieldId),

  /// A group record referenced a parent that was not written before it.
  #[error("group {ordinal} has parent {parent}, which was not written before it")]
  OrphanGroup { ordinal: u32, parent: usize },
}

impl StoreFailure for Error {
  fn is_transient(&self) -> bool {
    match self {
      Self::PoolTimeout(_) | Self::Connect(_) => true,
      Self::Database(e) => is_transient_db(e),
      _ => false,
    }
  }
}

fn is_transient_db(error: &tokio_rusqlite::Error) -> bool {
  match error {
    tokio_rusqlite::Error::ConnectionClosed => true,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => {
      matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    }
    _ => false,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
