//! Error types for `bubble-core`.

use thiserror::Error;

use crate::date::DateKey;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid calendar date: {year:04}-{month:02}-{day:02}")]
  InvalidDate { year: i32, month: u32, day: u32 },

  #[error("invalid date key: {0:?}")]
  InvalidKey(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("no datapoint for {0}")]
  NotFound(DateKey),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("schema mismatch: {0}")]
  Schema(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse classification of a failure, used by the serving layer to pick a
/// response and by callers to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Malformed date, key, or patch. A caller bug; never retried.
  InvalidInput,
  /// Point lookup miss.
  NotFound,
  /// Transient backend failure; safe to retry with backoff.
  Unavailable,
  /// The persisted schema does not match the expected layout. Fatal.
  Schema,
  /// Anything else the backend reports.
  Internal,
}

impl ErrorKind {
  pub fn is_retryable(self) -> bool { self == ErrorKind::Unavailable }
}

/// Implemented by every store error type so that callers holding only a
/// generic `DatapointStore` can still classify failures.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::InvalidDate { .. } | Error::InvalidKey(_) | Error::Validation(_) => {
        ErrorKind::InvalidInput
      }
      Error::NotFound(_) => ErrorKind::NotFound,
      Error::Unavailable(_) => ErrorKind::Unavailable,
      Error::Schema(_) => ErrorKind::Schema,
      Error::Serialization(_) => ErrorKind::Internal,
    }
  }
}
