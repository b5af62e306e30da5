//! [`SqliteStore`]: the SQLite implementation of [`DatapointStore`].

use std::{path::Path, time::Duration};

use bubble_core::{
  DateKey, Datapoint, Patch,
  store::{DatapointStore, Order, RangeQuery},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, params_from_iter, types::Value};

use crate::{
  Error, Result,
  encode::{RawDatapoint, encode_key, encode_ts},
  pool::{PoolConfig, SqlitePool},
  schema::{self, COLUMNS, ColumnInfo, DROP, SCHEMA, TABLE},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A datapoint store backed by a pool of SQLite connections.
///
/// The store owns nothing but a handle to the pool. Every operation checks
/// out one connection, runs a single statement (or one schema batch), and
/// returns the connection. Cloning is cheap.
#[derive(Clone)]
pub struct SqliteStore {
  pool:       SqlitePool,
  op_timeout: Duration,
}

impl SqliteStore {
  pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

  /// Wrap an existing pool. The schema is not touched; call
  /// [`DatapointStore::ensure_schema`] before serving traffic.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool, op_timeout: Self::DEFAULT_OP_TIMEOUT }
  }

  /// Deadline applied to each operation, including the wait for a connection.
  ///
  /// A write that has already reached SQLite when the deadline passes still
  /// commits or rolls back as a whole; the caller just sees
  /// [`Error::Timeout`] and may retry.
  pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
    self.op_timeout = op_timeout;
    self
  }

  /// Open (or create) a store at `path` and ensure the schema.
  pub async fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
    let store = Self::new(SqlitePool::open(path, config).await?);
    store.ensure_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let store = Self::new(SqlitePool::open_in_memory().await?);
    store.ensure_schema().await?;
    Ok(store)
  }

  pub fn pool(&self) -> &SqlitePool { &self.pool }

  /// Run `f` on a pooled connection under the operation deadline.
  async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let work = async {
      let conn = self.pool.acquire().await?;
      Ok::<_, Error>(conn.call(f).await?)
    };
    match tokio::time::timeout(self.op_timeout, work).await {
      Ok(result) => {
        if let Err(e) = &result {
          tracing::warn!(op, error = %e, "datapoint store operation failed");
        }
        result
      }
      Err(_) => {
        tracing::warn!(op, timeout = ?self.op_timeout, "datapoint store operation timed out");
        Err(Error::Timeout(self.op_timeout))
      }
    }
  }
}

// ─── SQL builders ────────────────────────────────────────────────────────────

/// `INSERT … ON CONFLICT DO UPDATE` touching only the patched columns.
///
/// `created_at` is never in the update set. `updated_at` moves to the later of
/// now and one microsecond past its stored value, so it strictly advances
/// even if the clock stalls or steps back.
fn upsert_sql(patch: &Patch) -> String {
  let names: Vec<&str> = patch.iter().map(|(f, _)| f.name()).collect();
  let n = names.len();

  let placeholders: Vec<String> = (2..n + 2).map(|i| format!("?{i}")).collect();
  let updates: Vec<String> = names
    .iter()
    .map(|name| format!("{name} = excluded.{name}"))
    .collect();
  let now = n + 2;

  format!(
    "INSERT INTO {TABLE} (date, {cols}, created_at, updated_at)
     VALUES (?1, {vals}, ?{now}, ?{now})
     ON CONFLICT (date) DO UPDATE SET
       {updates},
       updated_at = max(excluded.updated_at, {TABLE}.updated_at + 1)
     RETURNING {columns}",
    cols = names.join(", "),
    vals = placeholders.join(", "),
    updates = updates.join(", "),
    columns = *COLUMNS,
  )
}

fn list_sql(query: &RangeQuery) -> (String, Vec<Value>) {
  let mut params = vec![encode_key(query.start), encode_key(query.end)];
  let mut sql = format!("SELECT {} FROM {TABLE} WHERE date BETWEEN ?1 AND ?2", *COLUMNS);

  if let Some(after) = query.after {
    sql.push_str(match query.order {
      Order::Asc => " AND date > ?3",
      Order::Desc => " AND date < ?3",
    });
    params.push(encode_key(after));
  }

  sql.push_str(match query.order {
    Order::Asc => " ORDER BY date ASC",
    Order::Desc => " ORDER BY date DESC",
  });

  if let Some(limit) = query.limit {
    sql.push_str(&format!(" LIMIT ?{}", params.len() + 1));
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
  }

  (sql, params)
}

// ─── DatapointStore impl ─────────────────────────────────────────────────────

impl DatapointStore for SqliteStore {
  type Error = Error;

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn ensure_schema(&self) -> Result<()> {
    tracing::info!("ensuring datapoint schema");
    let columns: Vec<ColumnInfo> = self
      .call("ensure_schema", |conn| {
        conn.execute_batch(SCHEMA)?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
        let cols = stmt
          .query_map([], |row| {
            Ok(ColumnInfo {
              name:     row.get("name")?,
              decl:     row.get("type")?,
              not_null: row.get::<_, i64>("notnull")? != 0,
              pk:       row.get::<_, i64>("pk")? != 0,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cols)
      })
      .await?;

    schema::verify(&columns)?;
    tracing::info!("datapoint schema ready");
    Ok(())
  }

  async fn drop_schema(&self) -> Result<()> {
    tracing::warn!("dropping datapoint table");
    self
      .call("drop_schema", |conn| {
        conn.execute(DROP, [])?;
        Ok(())
      })
      .await?;
    tracing::info!("datapoint table dropped");
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert(&self, key: DateKey, patch: Patch) -> Result<Datapoint> {
    patch.validate()?;

    let sql = upsert_sql(&patch);
    let mut params = vec![encode_key(key)];
    params.extend(patch.iter().map(|(_, v)| Value::Real(v)));
    params.push(Value::Integer(encode_ts(Utc::now())));

    let raw = self
      .call("upsert", move |conn| {
        Ok(conn.query_row(&sql, params_from_iter(params), RawDatapoint::from_row)?)
      })
      .await?;

    tracing::debug!(date = %key, fields = patch.len(), "upserted datapoint");
    raw.into_datapoint()
  }

  async fn delete_all(&self) -> Result<u64> {
    let deleted = self
      .call("delete_all", |conn| {
        Ok(conn.execute(&format!("DELETE FROM {TABLE}"), [])?)
      })
      .await?;
    tracing::info!(deleted, "deleted all datapoints");
    Ok(deleted as u64)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get(&self, key: DateKey) -> Result<Option<Datapoint>> {
    let sql = format!("SELECT {} FROM {TABLE} WHERE date = ?1", *COLUMNS);

    let raw: Option<RawDatapoint> = self
      .call("get", move |conn| {
        Ok(
          conn
            .query_row(&sql, [encode_key(key)], RawDatapoint::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDatapoint::into_datapoint).transpose()
  }

  async fn list(&self, query: &RangeQuery) -> Result<Vec<Datapoint>> {
    query.validate()?;
    let (sql, params) = list_sql(query);

    let raws: Vec<RawDatapoint> = self
      .call("list", move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params), RawDatapoint::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDatapoint::into_datapoint).collect()
  }
}

#[cfg(test)]
mod tests {
  use bubble_core::Field;

  use super::*;

  #[test]
  fn upsert_sql_updates_only_patched_columns() {
    let patch = Patch::new().with(Field::Vix, 1.0).with(Field::ShillerPe, 2.0);
    let sql = upsert_sql(&patch);
    assert!(sql.contains("(date, shiller_pe, vix, created_at, updated_at)"));
    assert!(sql.contains("VALUES (?1, ?2, ?3, ?4, ?4)"));
    assert!(sql.contains("shiller_pe = excluded.shiller_pe, vix = excluded.vix"));
    assert!(!sql.contains("created_at = "));
    assert!(!sql.contains("bubble_index = "));
  }

  #[test]
  fn list_sql_pages_in_scan_direction() {
    let start = DateKey::from_ymd(2024, 1, 1).unwrap();
    let end = DateKey::from_ymd(2024, 1, 31).unwrap();
    let after = DateKey::from_ymd(2024, 1, 10).unwrap();

    let (sql, params) = list_sql(&RangeQuery::new(start, end).order(Order::Desc).after(after).limit(5));
    assert!(sql.contains("date < ?3"));
    assert!(sql.ends_with("ORDER BY date DESC LIMIT ?4"));
    assert_eq!(params.len(), 4);

    let (sql, params) = list_sql(&RangeQuery::new(start, end));
    assert!(sql.ends_with("ORDER BY date ASC"));
    assert_eq!(params.len(), 2);
  }
}
