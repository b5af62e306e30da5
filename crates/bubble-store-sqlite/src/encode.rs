//! Encoding and decoding helpers between Rust domain types and the values
//! stored in SQLite columns.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch so the
//! database can compare and bump them. Date keys are stored as their integer
//! form.

use bubble_core::{DateKey, Datapoint, Field};
use chrono::{DateTime, Utc};
use rusqlite::{Row, types::Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_ts(dt: DateTime<Utc>) -> i64 { dt.timestamp_micros() }

pub fn decode_ts(micros: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros(micros).ok_or(Error::Timestamp(micros))
}

// ─── DateKey ─────────────────────────────────────────────────────────────────

pub fn encode_key(key: DateKey) -> Value { Value::Integer(i64::from(key.as_u32())) }

pub fn decode_key(raw: i64) -> Result<DateKey> { Ok(DateKey::try_from(raw)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `datapoints` row selected with
/// [`crate::schema::COLUMNS`].
pub struct RawDatapoint {
  pub date:       i64,
  pub values:     Vec<Option<f64>>,
  pub created_at: i64,
  pub updated_at: i64,
}

impl RawDatapoint {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    let fields = Field::all().count();
    let values = (1..=fields)
      .map(|idx| row.get(idx))
      .collect::<rusqlite::Result<Vec<Option<f64>>>>()?;
    Ok(Self {
      date: row.get(0)?,
      values,
      created_at: row.get(fields + 1)?,
      updated_at: row.get(fields + 2)?,
    })
  }

  pub fn into_datapoint(self) -> Result<Datapoint> {
    let mut dp = Datapoint::empty(decode_key(self.date)?, decode_ts(self.created_at)?);
    dp.updated_at = decode_ts(self.updated_at)?;
    for (field, value) in Field::all().zip(self.values) {
      dp.set(field, value);
    }
    Ok(dp)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_keep_microsecond_precision() {
    let now = decode_ts(1_705_312_800_123_456).unwrap();
    assert_eq!(encode_ts(now), 1_705_312_800_123_456);
  }

  #[test]
  fn decode_key_rejects_garbage() {
    assert!(decode_key(20240115).is_ok());
    assert!(matches!(
      decode_key(20241340),
      Err(Error::Core(bubble_core::Error::InvalidKey(_)))
    ));
  }
}
