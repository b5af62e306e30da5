//! Date keys, the canonical primary key of a datapoint.
//!
//! A key is the integer `YYYY * 10000 + MM * 100 + DD`, so `20240115` is
//! 15 January 2024. Integer order equals calendar order. Keys can only be
//! built from calendar values or validated raw input; there is no way to hold
//! a `DateKey` that does not name a real day inside the supported range.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// First year accepted by [`DateKey::from_ymd`].
pub const MIN_YEAR: i32 = 1900;
/// Last year accepted by [`DateKey::from_ymd`].
pub const MAX_YEAR: i32 = 2999;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct DateKey(u32);

impl DateKey {
  /// 1900-01-01.
  pub const MIN: DateKey = DateKey(19000101);
  /// 2999-12-31.
  pub const MAX: DateKey = DateKey(29991231);

  /// Encode a calendar date. Fails with [`Error::InvalidDate`] if the month or
  /// day does not exist or the year is outside the supported range.
  pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
      return Err(Error::InvalidDate { year, month, day });
    }
    NaiveDate::from_ymd_opt(year, month, day)
      .ok_or(Error::InvalidDate { year, month, day })?;
    Ok(Self(year as u32 * 10000 + month * 100 + day))
  }

  /// Decode back into `(year, month, day)`.
  pub fn ymd(self) -> (i32, u32, u32) {
    ((self.0 / 10000) as i32, (self.0 % 10000) / 100, self.0 % 100)
  }

  pub fn from_naive_date(date: NaiveDate) -> Result<Self> {
    Self::from_ymd(date.year(), date.month(), date.day())
  }

  pub fn to_naive_date(self) -> NaiveDate {
    let (y, m, d) = self.ymd();
    // Every constructed key has been checked against chrono already.
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
  }

  /// The UTC calendar day containing `instant`.
  pub fn from_datetime(instant: DateTime<Utc>) -> Result<Self> {
    Self::from_naive_date(instant.date_naive())
  }

  /// Today's key in UTC.
  pub fn today() -> Result<Self> { Self::from_datetime(Utc::now()) }

  pub fn as_u32(self) -> u32 { self.0 }

  /// Whether `self` lies in the inclusive range `[start, end]`.
  pub fn within(self, start: DateKey, end: DateKey) -> bool {
    start <= self && self <= end
  }
}

impl TryFrom<u32> for DateKey {
  type Error = Error;

  fn try_from(raw: u32) -> Result<Self> {
    let year = (raw / 10000) as i32;
    let month = (raw % 10000) / 100;
    let day = raw % 100;
    Self::from_ymd(year, month, day)
      .map_err(|_| Error::InvalidKey(raw.to_string()))
  }
}

impl TryFrom<i64> for DateKey {
  type Error = Error;

  fn try_from(raw: i64) -> Result<Self> {
    u32::try_from(raw)
      .map_err(|_| Error::InvalidKey(raw.to_string()))
      .and_then(DateKey::try_from)
  }
}

impl From<DateKey> for u32 {
  fn from(key: DateKey) -> u32 { key.0 }
}

impl FromStr for DateKey {
  type Err = Error;

  /// Parse the eight-digit `YYYYMMDD` form.
  fn from_str(s: &str) -> Result<Self> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
      return Err(Error::InvalidKey(s.to_owned()));
    }
    let raw: u32 = s.parse().map_err(|_| Error::InvalidKey(s.to_owned()))?;
    DateKey::try_from(raw)
  }
}

impl fmt::Display for DateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:08}", self.0)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Days;

  use super::*;

  #[test]
  fn encodes_known_date() {
    let key = DateKey::from_ymd(2024, 1, 15).unwrap();
    assert_eq!(key.as_u32(), 20240115);
    assert_eq!(key.to_string(), "20240115");
  }

  #[test]
  fn round_trips_every_day_in_supported_range() {
    let mut day = DateKey::MIN.to_naive_date();
    let last = DateKey::MAX.to_naive_date();
    let mut count = 0;
    while day <= last {
      let key = DateKey::from_naive_date(day).unwrap();
      assert_eq!(key.ymd(), (day.year(), day.month(), day.day()));
      assert_eq!(DateKey::try_from(key.as_u32()).unwrap(), key);
      assert_eq!(key.to_naive_date(), day);
      count += 1;
      day = day + Days::new(1);
    }
    assert!(count > 365 * 1099);
  }

  #[test]
  fn key_order_is_calendar_order() {
    let a = DateKey::from_ymd(2023, 12, 31).unwrap();
    let b = DateKey::from_ymd(2024, 1, 1).unwrap();
    let c = DateKey::from_ymd(2024, 2, 1).unwrap();
    assert!(a < b && b < c);
  }

  #[test]
  fn rejects_invalid_calendar_dates() {
    for (y, m, d) in [
      (2024, 13, 1),
      (2024, 0, 1),
      (2024, 2, 30),
      (2023, 2, 29),
      (2024, 4, 31),
      (2024, 1, 0),
      (1899, 12, 31),
      (3000, 1, 1),
    ] {
      assert!(
        matches!(DateKey::from_ymd(y, m, d), Err(Error::InvalidDate { .. })),
        "{y}-{m}-{d} should be rejected"
      );
    }
  }

  #[test]
  fn accepts_leap_day() {
    assert!(DateKey::from_ymd(2024, 2, 29).is_ok());
    assert!(DateKey::from_ymd(2000, 2, 29).is_ok());
    assert!(DateKey::from_ymd(1900, 2, 29).is_err());
  }

  #[test]
  fn rejects_keys_never_produced_by_encode() {
    for raw in [20241301_u32, 20240230, 20240100, 0, 99999999, 123] {
      assert!(
        matches!(DateKey::try_from(raw), Err(Error::InvalidKey(_))),
        "{raw} should be rejected"
      );
    }
    assert!(matches!(DateKey::try_from(-20240101_i64), Err(Error::InvalidKey(_))));
  }

  #[test]
  fn parses_eight_digit_strings_only() {
    assert_eq!(
      "20240115".parse::<DateKey>().unwrap(),
      DateKey::from_ymd(2024, 1, 15).unwrap()
    );
    for bad in ["2024-01-15", "2024011", "202401155", "2024O115", "", "+2024011"] {
      assert!(bad.parse::<DateKey>().is_err(), "{bad:?}");
    }
  }

  #[test]
  fn serde_uses_the_integer_form() {
    let key = DateKey::from_ymd(2024, 3, 5).unwrap();
    assert_eq!(serde_json::to_string(&key).unwrap(), "20240305");
    let back: DateKey = serde_json::from_str("20240305").unwrap();
    assert_eq!(back, key);
    assert!(serde_json::from_str::<DateKey>("20241350").is_err());
  }

  #[test]
  fn from_datetime_uses_utc_day() {
    let instant = DateTime::parse_from_rfc3339("2024-06-30T23:59:59Z")
      .unwrap()
      .with_timezone(&Utc);
    assert_eq!(DateKey::from_datetime(instant).unwrap().as_u32(), 20240630);
  }
}
