//! Error type for `bubble-store-sqlite`.

use std::time::Duration;

use bubble_core::{Classify, ErrorKind};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] bubble_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("schema mismatch: {0}")]
  Schema(String),

  #[error("stored timestamp out of range: {0}")]
  Timestamp(i64),

  /// No pooled connection became free in time.
  #[error("timed out after {0:?} waiting for a connection")]
  PoolTimeout(Duration),

  #[error("connection pool is closed")]
  PoolClosed,

  /// The whole operation exceeded its deadline.
  #[error("operation timed out after {0:?}")]
  Timeout(Duration),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Database(e) => classify_database(e),
      Error::Schema(_) => ErrorKind::Schema,
      Error::Timestamp(_) => ErrorKind::Internal,
      Error::PoolTimeout(_) | Error::PoolClosed | Error::Timeout(_) => {
        ErrorKind::Unavailable
      }
    }
  }
}

fn classify_database(e: &tokio_rusqlite::Error) -> ErrorKind {
  match e {
    tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => {
      ErrorKind::Unavailable
    }
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
      match failure.code {
        ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::CannotOpen
        | ErrorCode::SystemIoFailure => ErrorKind::Unavailable,
        _ => ErrorKind::Internal,
      }
    }
    _ => ErrorKind::Internal,
  }
}
