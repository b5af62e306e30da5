//! A small bounded pool of [`tokio_rusqlite`] connections.
//!
//! Each connection owns a background thread. Callers take a connection for
//! the length of one logical operation and hand it back when the guard drops.
//! When every connection is busy, callers queue on a semaphore until one is
//! returned or `acquire_timeout` elapses.

use std::{
  ops::Deref,
  path::Path,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// Number of connections opened up front; also the concurrency limit.
  pub max_connections: usize,
  /// How long a caller may wait for a free connection.
  pub acquire_timeout: Duration,
  /// How long SQLite itself waits on a locked database before `SQLITE_BUSY`.
  pub busy_timeout:    Duration,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      max_connections: 10,
      acquire_timeout: Duration::from_secs(5),
      busy_timeout:    Duration::from_secs(5),
    }
  }
}

// ─── Pool ────────────────────────────────────────────────────────────────────

struct Inner {
  idle:            Mutex<Vec<tokio_rusqlite::Connection>>,
  permits:         Arc<Semaphore>,
  size:            usize,
  acquire_timeout: Duration,
}

/// Cloning is cheap; all clones share the same connections.
#[derive(Clone)]
pub struct SqlitePool {
  inner: Arc<Inner>,
}

impl SqlitePool {
  /// Open `config.max_connections` connections to the database file at
  /// `path`, creating it if needed.
  pub async fn open(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
    let size = config.max_connections.max(1);
    let mut conns = Vec::with_capacity(size);
    for _ in 0..size {
      let conn = tokio_rusqlite::Connection::open(path.as_ref()).await?;
      configure(&conn, config.busy_timeout, true).await?;
      conns.push(conn);
    }
    tracing::debug!(path = %path.as_ref().display(), size, "opened sqlite pool");
    Ok(Self::from_connections(conns, config.acquire_timeout))
  }

  /// A single-connection pool over a private in-memory database, useful for
  /// testing. Separate in-memory connections would each see their own empty
  /// database, so this pool never grows past one.
  pub async fn open_in_memory() -> Result<Self> {
    let config = PoolConfig::default();
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    configure(&conn, config.busy_timeout, false).await?;
    Ok(Self::from_connections(vec![conn], config.acquire_timeout))
  }

  fn from_connections(
    conns: Vec<tokio_rusqlite::Connection>,
    acquire_timeout: Duration,
  ) -> Self {
    let size = conns.len();
    Self {
      inner: Arc::new(Inner {
        idle: Mutex::new(conns),
        permits: Arc::new(Semaphore::new(size)),
        size,
        acquire_timeout,
      }),
    }
  }

  /// Wait for a free connection.
  pub async fn acquire(&self) -> Result<PooledConnection> {
    let permit = tokio::time::timeout(
      self.inner.acquire_timeout,
      self.inner.permits.clone().acquire_owned(),
    )
    .await
    .map_err(|_| Error::PoolTimeout(self.inner.acquire_timeout))?
    .map_err(|_| Error::PoolClosed)?;

    let conn = self
      .inner
      .idle
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .pop()
      .ok_or(Error::PoolClosed)?;

    Ok(PooledConnection {
      conn:    Some(conn),
      pool:    self.inner.clone(),
      _permit: permit,
    })
  }

  /// Total number of connections.
  pub fn size(&self) -> usize { self.inner.size }

  /// Connections not currently checked out.
  pub fn idle(&self) -> usize { self.inner.permits.available_permits() }
}

async fn configure(
  conn: &tokio_rusqlite::Connection,
  busy_timeout: Duration,
  wal: bool,
) -> Result<()> {
  conn
    .call(move |conn| {
      conn.busy_timeout(busy_timeout)?;
      if wal {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
      }
      conn.execute_batch("PRAGMA foreign_keys = ON;")?;
      Ok(())
    })
    .await?;
  Ok(())
}

// ─── Guard ───────────────────────────────────────────────────────────────────

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection {
  conn:    Option<tokio_rusqlite::Connection>,
  pool:    Arc<Inner>,
  // Released after `drop` has put the connection back.
  _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
  type Target = tokio_rusqlite::Connection;

  fn deref(&self) -> &Self::Target {
    // Only `drop` takes the connection out.
    self.conn.as_ref().unwrap_or_else(|| unreachable!())
  }
}

impl Drop for PooledConnection {
  fn drop(&mut self) {
    if let Some(conn) = self.conn.take() {
      self
        .pool
        .idle
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(conn);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn connections_return_on_drop() {
    let pool = SqlitePool::open_in_memory().await.unwrap();
    assert_eq!(pool.size(), 1);
    {
      let _conn = pool.acquire().await.unwrap();
      assert_eq!(pool.idle(), 0);
    }
    assert_eq!(pool.idle(), 1);
    assert!(pool.acquire().await.is_ok());
  }

  #[tokio::test]
  async fn exhausted_pool_times_out() {
    let conn = tokio_rusqlite::Connection::open_in_memory().await.unwrap();
    let pool = SqlitePool::from_connections(vec![conn], Duration::from_millis(50));

    let held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.err().unwrap();
    assert!(matches!(err, Error::PoolTimeout(_)));

    drop(held);
    assert!(pool.acquire().await.is_ok());
  }

  #[tokio::test]
  async fn file_pool_opens_every_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = PoolConfig { max_connections: 3, ..PoolConfig::default() };
    let pool = SqlitePool::open(dir.path().join("pool.db"), config).await.unwrap();
    assert_eq!(pool.size(), 3);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_eq!(pool.idle(), 1);
    drop((a, b));
    assert_eq!(pool.idle(), 3);
  }
}
