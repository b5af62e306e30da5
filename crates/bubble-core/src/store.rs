//! The `DatapointStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `bubble-store-sqlite`)
//! and by wrappers such as the read-through cache. Higher layers depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{Classify, Error, Result, datapoint::Datapoint, date::DateKey, patch::Patch};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Sort direction for range scans, by calendar date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
  #[default]
  Asc,
  Desc,
}

/// Parameters for [`DatapointStore::list`].
///
/// `start` and `end` are both inclusive. `after` continues a previous page:
/// only keys strictly past it in the scan direction are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeQuery {
  pub start: DateKey,
  pub end:   DateKey,
  pub order: Order,
  pub limit: Option<usize>,
  pub after: Option<DateKey>,
}

impl RangeQuery {
  pub fn new(start: DateKey, end: DateKey) -> Self {
    Self { start, end, order: Order::Asc, limit: None, after: None }
  }

  /// Every supported day.
  pub fn all() -> Self { Self::new(DateKey::MIN, DateKey::MAX) }

  pub fn order(mut self, order: Order) -> Self {
    self.order = order;
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn after(mut self, after: DateKey) -> Self {
    self.after = Some(after);
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.start > self.end {
      return Err(Error::Validation(format!(
        "range start {} is after end {}",
        self.start, self.end
      )));
    }
    if self.limit == Some(0) {
      return Err(Error::Validation("limit must be positive".into()));
    }
    Ok(())
  }

  /// Whether the range (ignoring paging) covers `key`.
  pub fn covers(&self, key: DateKey) -> bool { key.within(self.start, self.end) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a datapoint store backend.
///
/// There is exactly one row per calendar day. Writes are upsert-merges: only
/// the fields named in a [`Patch`] are written, everything else keeps its
/// stored value.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DatapointStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Schema ────────────────────────────────────────────────────────────

  /// Create the table if absent and verify an existing one matches the
  /// expected layout. Safe to call on every start.
  fn ensure_schema(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove the table and every row. Executes unconditionally; confirmation
  /// is the caller's job.
  fn drop_schema(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Atomically insert the row for `key` or merge `patch` into the existing
  /// row. Returns the row as stored after the merge.
  fn upsert(
    &self,
    key: DateKey,
    patch: Patch,
  ) -> impl Future<Output = Result<Datapoint, Self::Error>> + Send + '_;

  /// Remove every row, returning how many were deleted.
  fn delete_all(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Point lookup. `None` when no row exists for `key`.
  fn get(
    &self,
    key: DateKey,
  ) -> impl Future<Output = Result<Option<Datapoint>, Self::Error>> + Send + '_;

  /// Inclusive range scan ordered by calendar date.
  fn list<'a>(
    &'a self,
    query: &'a RangeQuery,
  ) -> impl Future<Output = Result<Vec<Datapoint>, Self::Error>> + Send + 'a;

  /// The most recent stored day, if any.
  fn latest(
    &self,
  ) -> impl Future<Output = Result<Option<Datapoint>, Self::Error>> + Send + '_ {
    async move {
      let query = RangeQuery::all().order(Order::Desc).limit(1);
      Ok(self.list(&query).await?.into_iter().next())
    }
  }
}

// ─── Paging ──────────────────────────────────────────────────────────────────

/// A lazy, restartable walk over a range in fixed-size pages.
///
/// Each page is an independent query keyed on the last date seen, so nothing
/// is held open between pages. Build a new scan to start over.
pub struct RangeScan<'s, S: DatapointStore> {
  store:     &'s S,
  query:     RangeQuery,
  page_size: usize,
  done:      bool,
}

impl<'s, S: DatapointStore> RangeScan<'s, S> {
  pub fn new(store: &'s S, query: RangeQuery, page_size: usize) -> Self {
    Self {
      store,
      query: RangeQuery { limit: None, ..query },
      page_size: page_size.max(1),
      done: false,
    }
  }

  /// Fetch the next page, or `None` once the range is exhausted.
  pub async fn next_page(&mut self) -> Result<Option<Vec<Datapoint>>, S::Error> {
    if self.done {
      return Ok(None);
    }
    let query = self.query.limit(self.page_size);
    let page = self.store.list(&query).await?;

    if page.len() < self.page_size {
      self.done = true;
    }
    match page.last() {
      Some(last) => {
        self.query.after = Some(last.date);
        Ok(Some(page))
      }
      None => {
        self.done = true;
        Ok(None)
      }
    }
  }

  /// Drain the remaining pages into one vector.
  pub async fn collect(mut self) -> Result<Vec<Datapoint>, S::Error> {
    let mut all = Vec::new();
    while let Some(page) = self.next_page().await? {
      all.extend(page);
    }
    Ok(all)
  }
}
