//! SQL schema for the datapoint table.
//!
//! One row per calendar day. The date key is the integer primary key; every
//! indicator and score is a nullable `REAL`; audit timestamps are integer
//! microseconds since the Unix epoch.

use std::sync::LazyLock;

use bubble_core::Field;

use crate::{Error, Result};

pub const TABLE: &str = "datapoints";

/// Idempotent DDL thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS datapoints (
    date                    INTEGER PRIMARY KEY
                            CHECK (date BETWEEN 19000101 AND 29991231),

    shiller_pe              REAL,
    sp500_forward_pe        REAL,
    nvda_price_to_sales     REAL,
    market_concentration    REAL,
    big_tech_capex          REAL,
    nvda_data_center_rev    REAL,
    capex_to_revenue_ratio  REAL,
    vix                     REAL,
    google_trends_ai_bubble REAL,
    insider_net_selling     REAL,
    fed_funds_rate          REAL,
    ten_year_yield          REAL,

    valuation_score         REAL,
    capex_score             REAL,
    sentiment_score         REAL,
    macro_score             REAL,
    bubble_index            REAL,

    created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
    updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000000),
    CHECK (updated_at >= created_at)
);
";

pub const DROP: &str = "DROP TABLE IF EXISTS datapoints";

/// `date, <fields in column order>, created_at, updated_at`.
pub static COLUMNS: LazyLock<String> = LazyLock::new(|| {
  let mut cols = vec!["date"];
  cols.extend(Field::all().map(Field::name));
  cols.extend(["created_at", "updated_at"]);
  cols.join(", ")
});

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
  pub name:     String,
  pub decl:     String,
  pub not_null: bool,
  pub pk:       bool,
}

/// Compare the live table against the expected layout. Extra columns are
/// tolerated; missing or differently-typed ones are not.
pub fn verify(columns: &[ColumnInfo]) -> Result<()> {
  let expect = |name: &str, decl: &str, not_null: bool, pk: bool| -> Result<()> {
    let col = columns
      .iter()
      .find(|c| c.name == name)
      .ok_or_else(|| Error::Schema(format!("{TABLE}.{name} is missing")))?;
    if !col.decl.eq_ignore_ascii_case(decl) {
      return Err(Error::Schema(format!(
        "{TABLE}.{name} has type {:?}, expected {decl}",
        col.decl
      )));
    }
    if col.pk != pk {
      return Err(Error::Schema(format!(
        "{TABLE}.{name} primary key flag is {}, expected {pk}",
        col.pk
      )));
    }
    // The primary key is implicitly non-null for INTEGER PRIMARY KEY.
    if !pk && col.not_null != not_null {
      return Err(Error::Schema(format!(
        "{TABLE}.{name} NOT NULL is {}, expected {not_null}",
        col.not_null
      )));
    }
    Ok(())
  };

  expect("date", "INTEGER", true, true)?;
  for field in Field::all() {
    expect(field.name(), "REAL", false, false)?;
  }
  expect("created_at", "INTEGER", true, false)?;
  expect("updated_at", "INTEGER", true, false)?;
  Ok(())
}
