//! Read-through cache in front of any [`DatapointStore`].
//!
//! Reads are served from memory when possible and fall through to the wrapped
//! store on a miss. Writes always go to the store. Before dispatch and again
//! once the write is finished or abandoned, they remove (never update) every
//! cached entry they could have affected:
//!
//! - `upsert(k)` drops the point entry for `k` and every cached range whose
//!   bounds contain `k`.
//! - `delete_all` and `drop_schema` drop everything.
//!
//! Entries may additionally expire after a TTL, and the oldest entries are
//! evicted once `max_entries` is reached.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use bubble_core::{
  DateKey, Datapoint, Patch,
  store::{DatapointStore, RangeQuery},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Entries older than this are treated as misses. `None` keeps entries until
  /// a write invalidates them.
  pub ttl:         Option<Duration>,
  /// Upper bound on point plus range entries.
  pub max_entries: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { ttl: Some(Duration::from_secs(300)), max_entries: 1024 }
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

struct Entry<T> {
  value:    T,
  inserted: Instant,
  seq:      u64,
}

#[derive(Default)]
struct State {
  points:     HashMap<DateKey, Entry<Option<Datapoint>>>,
  ranges:     HashMap<RangeQuery, Entry<Vec<Datapoint>>>,
  /// Bumped by every invalidation. A read that started under an older
  /// generation must not populate the cache.
  generation: u64,
  seq:        u64,
}

impl State {
  fn len(&self) -> usize { self.points.len() + self.ranges.len() }

  fn invalidate_key(&mut self, key: DateKey) {
    self.generation += 1;
    self.points.remove(&key);
    self.ranges.retain(|query, _| !query.covers(key));
  }

  fn clear(&mut self) {
    self.generation += 1;
    self.points.clear();
    self.ranges.clear();
  }

  fn evict_oldest(&mut self) {
    let oldest_point = self
      .points
      .iter()
      .map(|(k, e)| (e.seq, *k))
      .min_by_key(|(seq, _)| *seq);
    let oldest_range = self
      .ranges
      .iter()
      .map(|(q, e)| (e.seq, *q))
      .min_by_key(|(seq, _)| *seq);
    match (oldest_point, oldest_range) {
      (Some((ps, key)), Some((rs, _))) if ps <= rs => {
        self.points.remove(&key);
      }
      (_, Some((_, query))) => {
        self.ranges.remove(&query);
      }
      (Some((_, key)), None) => {
        self.points.remove(&key);
      }
      (None, None) => {}
    }
  }

  fn next_entry<T>(&mut self, value: T) -> Entry<T> {
    self.seq += 1;
    Entry { value, inserted: Instant::now(), seq: self.seq }
  }
}

/// Invalidates `key` when dropped. Held across an upsert so a write whose
/// future is cancelled after dispatch still clears what it may have changed.
struct InvalidateOnDrop<'a> {
  state: &'a Mutex<State>,
  key:   DateKey,
}

impl Drop for InvalidateOnDrop<'_> {
  fn drop(&mut self) {
    self
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .invalidate_key(self.key);
    tracing::trace!(date = %self.key, "datapoint cache invalidated");
  }
}

// ─── Cached store ────────────────────────────────────────────────────────────

/// Wraps a store `S`, caching `get`, `list`, and `latest`.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct CachedStore<S> {
  inner:  S,
  config: CacheConfig,
  state:  Arc<Mutex<State>>,
  stats:  Arc<Stats>,
}

#[derive(Default)]
struct Stats {
  hits:   AtomicU64,
  misses: AtomicU64,
}

impl<S: DatapointStore> CachedStore<S> {
  pub fn new(inner: S, config: CacheConfig) -> Self {
    Self {
      inner,
      config,
      state: Arc::new(Mutex::new(State::default())),
      stats: Arc::new(Stats::default()),
    }
  }

  /// The wrapped store. Writes made through it bypass invalidation.
  pub fn inner(&self) -> &S { &self.inner }

  /// `(hits, misses)` since construction.
  pub fn stats(&self) -> (u64, u64) {
    (
      self.stats.hits.load(Ordering::Relaxed),
      self.stats.misses.load(Ordering::Relaxed),
    )
  }

  /// Number of live entries.
  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn lock(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn fresh<T>(&self, entry: &Entry<T>) -> bool {
    self
      .config
      .ttl
      .is_none_or(|ttl| entry.inserted.elapsed() < ttl)
  }

  fn record(&self, hit: bool) {
    let counter = if hit { &self.stats.hits } else { &self.stats.misses };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  fn make_room(&self, state: &mut State) {
    while state.len() >= self.config.max_entries.max(1) {
      state.evict_oldest();
    }
  }

  /// A fresh cached value, or the generation to pass to `store_point` after
  /// reading through.
  fn cached_point(&self, key: DateKey) -> Result<Option<Datapoint>, u64> {
    let mut state = self.lock();
    if let Some(entry) = state.points.get(&key) {
      if self.fresh(entry) {
        return Ok(entry.value.clone());
      }
      state.points.remove(&key);
    }
    Err(state.generation)
  }

  fn cached_range(&self, query: &RangeQuery) -> Result<Vec<Datapoint>, u64> {
    let mut state = self.lock();
    if let Some(entry) = state.ranges.get(query) {
      if self.fresh(entry) {
        return Ok(entry.value.clone());
      }
      state.ranges.remove(query);
    }
    Err(state.generation)
  }

  fn store_point(&self, generation: u64, key: DateKey, value: Option<Datapoint>) {
    let mut state = self.lock();
    if state.generation != generation {
      return;
    }
    self.make_room(&mut state);
    let entry = state.next_entry(value);
    state.points.insert(key, entry);
  }

  fn store_range(&self, generation: u64, query: RangeQuery, value: Vec<Datapoint>) {
    let mut state = self.lock();
    if state.generation != generation {
      return;
    }
    self.make_room(&mut state);
    let entry = state.next_entry(value);
    state.ranges.insert(query, entry);
  }
}

impl<S: DatapointStore> DatapointStore for CachedStore<S> {
  type Error = S::Error;

  async fn ensure_schema(&self) -> Result<(), S::Error> {
    self.inner.ensure_schema().await
  }

  async fn drop_schema(&self) -> Result<(), S::Error> {
    let result = self.inner.drop_schema().await;
    self.lock().clear();
    tracing::debug!("datapoint cache cleared after drop_schema");
    result
  }

  async fn upsert(&self, key: DateKey, patch: Patch) -> Result<Datapoint, S::Error> {
    // Reads already in flight carry the old generation and will not populate.
    self.lock().invalidate_key(key);
    // Reads that start while the write runs may still see the old row, so the
    // key is invalidated again on completion, error, or cancellation.
    let _guard = InvalidateOnDrop { state: &self.state, key };
    self.inner.upsert(key, patch).await
  }

  async fn delete_all(&self) -> Result<u64, S::Error> {
    let result = self.inner.delete_all().await;
    self.lock().clear();
    tracing::debug!("datapoint cache cleared after delete_all");
    result
  }

  async fn get(&self, key: DateKey) -> Result<Option<Datapoint>, S::Error> {
    let generation = match self.cached_point(key) {
      Ok(hit) => {
        self.record(true);
        return Ok(hit);
      }
      Err(generation) => generation,
    };
    self.record(false);

    let value = self.inner.get(key).await?;
    self.store_point(generation, key, value.clone());
    Ok(value)
  }

  async fn list(&self, query: &RangeQuery) -> Result<Vec<Datapoint>, S::Error> {
    let generation = match self.cached_range(query) {
      Ok(hit) => {
        self.record(true);
        return Ok(hit);
      }
      Err(generation) => generation,
    };
    self.record(false);

    let rows = self.inner.list(query).await?;
    self.store_range(generation, *query, rows.clone());
    Ok(rows)
  }
}

#[cfg(test)]
mod tests {
  use bubble_core::Field;
  use bubble_store_sqlite::SqliteStore;

  use super::*;

  async fn cached(config: CacheConfig) -> CachedStore<SqliteStore> {
    CachedStore::new(SqliteStore::open_in_memory().await.unwrap(), config)
  }

  fn day(d: u32) -> DateKey { DateKey::from_ymd(2024, 1, d).unwrap() }

  fn vix(v: f64) -> Patch { Patch::new().with(Field::Vix, v) }

  #[tokio::test]
  async fn second_get_is_a_hit() {
    let c = cached(CacheConfig::default()).await;
    c.upsert(day(1), vix(1.0)).await.unwrap();

    c.get(day(1)).await.unwrap();
    c.get(day(1)).await.unwrap();
    assert_eq!(c.stats(), (1, 1));
  }

  #[tokio::test]
  async fn cached_value_is_served_until_invalidated() {
    let c = cached(CacheConfig::default()).await;
    c.upsert(day(1), vix(1.0)).await.unwrap();
    assert_eq!(c.get(day(1)).await.unwrap().unwrap().vix, Some(1.0));

    // Bypass the cache: the stale entry is still served.
    c.inner().upsert(day(1), vix(2.0)).await.unwrap();
    assert_eq!(c.get(day(1)).await.unwrap().unwrap().vix, Some(1.0));

    // A write through the cache removes the entry.
    c.upsert(day(1), vix(3.0)).await.unwrap();
    assert_eq!(c.get(day(1)).await.unwrap().unwrap().vix, Some(3.0));
  }

  #[tokio::test]
  async fn misses_are_cached_and_invalidated_by_insert() {
    let c = cached(CacheConfig::default()).await;
    assert!(c.get(day(2)).await.unwrap().is_none());
    assert!(c.get(day(2)).await.unwrap().is_none());
    assert_eq!(c.stats(), (1, 1));

    c.upsert(day(2), vix(5.0)).await.unwrap();
    assert_eq!(c.get(day(2)).await.unwrap().unwrap().vix, Some(5.0));
  }

  #[tokio::test]
  async fn upsert_invalidates_only_covering_ranges() {
    let c = cached(CacheConfig::default()).await;
    let early = RangeQuery::new(day(1), day(5));
    let late = RangeQuery::new(day(10), day(15));

    c.list(&early).await.unwrap();
    c.list(&late).await.unwrap();
    assert_eq!(c.len(), 2);

    c.upsert(day(3), vix(1.0)).await.unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c.list(&early).await.unwrap().len(), 1);
    assert!(c.list(&late).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn latest_is_invalidated_by_any_write() {
    let c = cached(CacheConfig::default()).await;
    c.upsert(day(1), vix(1.0)).await.unwrap();
    assert_eq!(c.latest().await.unwrap().unwrap().date, day(1));

    c.upsert(day(9), vix(1.0)).await.unwrap();
    assert_eq!(c.latest().await.unwrap().unwrap().date, day(9));
  }

  #[tokio::test]
  async fn delete_all_clears_everything() {
    let c = cached(CacheConfig::default()).await;
    c.upsert(day(1), vix(1.0)).await.unwrap();
    c.get(day(1)).await.unwrap();
    c.list(&RangeQuery::all()).await.unwrap();
    assert!(!c.is_empty());

    c.delete_all().await.unwrap();
    assert!(c.is_empty());
    assert!(c.get(day(1)).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn entries_expire_after_ttl() {
    let c = cached(CacheConfig { ttl: Some(Duration::from_millis(20)), max_entries: 16 }).await;
    c.upsert(day(1), vix(1.0)).await.unwrap();
    c.get(day(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    c.get(day(1)).await.unwrap();
    assert_eq!(c.stats(), (0, 2));
  }

  #[tokio::test]
  async fn oldest_entry_is_evicted_at_capacity() {
    let c = cached(CacheConfig { ttl: None, max_entries: 2 }).await;
    for d in 1..=3 {
      c.get(day(d)).await.unwrap();
    }
    assert_eq!(c.len(), 2);

    // day(1) was evicted, day(3) is still cached.
    c.get(day(3)).await.unwrap();
    c.get(day(1)).await.unwrap();
    assert_eq!(c.stats(), (1, 4));
  }

  #[tokio::test]
  async fn cancelled_upsert_still_invalidates() {
    let c = cached(CacheConfig { ttl: None, max_entries: 16 }).await;
    c.upsert(day(1), vix(0.0)).await.unwrap();

    for i in 0..20 {
      let target = 1000.0 + f64::from(i);
      assert!(c.get(day(1)).await.unwrap().is_some());

      // Poll the write once, then drop it.
      tokio::select! {
        biased;
        _ = c.upsert(day(1), vix(target)) => {}
        _ = std::future::ready(()) => {}
      }

      // Wait for the dispatched write to land, if it was dispatched at all.
      for _ in 0..100 {
        if c.inner().get(day(1)).await.unwrap().unwrap().vix == Some(target) {
          break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
      }

      let stored = c.inner().get(day(1)).await.unwrap().unwrap().vix;
      let served = c.get(day(1)).await.unwrap().unwrap().vix;
      assert_eq!(served, stored, "iteration {i}");
    }
  }

  #[tokio::test]
  async fn read_racing_a_write_does_not_cache_the_old_row() {
    let c = cached(CacheConfig { ttl: None, max_entries: 16 }).await;
    c.upsert(day(1), vix(0.0)).await.unwrap();

    for i in 1..=20 {
      let (read, write) = tokio::join!(c.get(day(1)), c.upsert(day(1), vix(f64::from(i))));
      read.unwrap();
      write.unwrap();
      assert_eq!(c.get(day(1)).await.unwrap().unwrap().vix, Some(f64::from(i)));
    }
  }

  #[tokio::test]
  async fn stale_read_does_not_repopulate_after_invalidation() {
    let c = cached(CacheConfig::default()).await;
    let generation = c.cached_point(day(1)).unwrap_err();

    c.upsert(day(1), vix(1.0)).await.unwrap();
    c.store_point(generation, day(1), None);

    assert_eq!(c.get(day(1)).await.unwrap().unwrap().vix, Some(1.0));
  }
}
