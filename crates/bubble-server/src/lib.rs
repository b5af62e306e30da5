//! Process wiring for the bubble-tracker API server.
//!
//! Loads [`ServerConfig`], opens the SQLite pool and store, optionally wraps
//! it in the read-through cache, and builds the top-level axum [`Router`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use axum::{Router, routing::get};
use bubble_cache::CacheConfig;
use bubble_core::store::DatapointStore;
use bubble_store_sqlite::{PoolConfig, SqliteStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`, an optional
/// `config.<env>.toml` overlay, and `BUBBLE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub max_connections:    usize,
  pub acquire_timeout_ms: u64,
  pub busy_timeout_ms:    u64,
  pub op_timeout_ms:      u64,
  pub cache:              CacheSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
  pub enabled:     bool,
  /// `0` disables expiry; entries then live until a write invalidates them.
  pub ttl_secs:    u64,
  pub max_entries: usize,
}

impl ServerConfig {
  /// Layer defaults, `path`, the `<stem>.<env>.toml` sibling of `path`, and
  /// the environment. Both files are optional.
  pub fn load(path: &Path, env: &str) -> anyhow::Result<Self> {
    Self::load_with_vars(path, env, None)
  }

  /// [`ServerConfig::load`] reading `BUBBLE_*` variables from `vars` instead
  /// of the process environment when given.
  fn load_with_vars(
    path: &Path,
    env: &str,
    vars: Option<config::Map<String, String>>,
  ) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080)?
      .set_default("store_path", "bubble.db")?
      .set_default("max_connections", 10)?
      .set_default("acquire_timeout_ms", 5_000)?
      .set_default("busy_timeout_ms", 5_000)?
      .set_default("op_timeout_ms", 10_000)?
      .set_default("cache.enabled", true)?
      .set_default("cache.ttl_secs", 300)?
      .set_default("cache.max_entries", 1024)?
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(config::File::from(env_overlay(path, env)).required(false))
      .add_source(
        config::Environment::with_prefix("BUBBLE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true)
          .source(vars),
      )
      .build()
      .context("failed to read configuration")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn pool_config(&self) -> PoolConfig {
    PoolConfig {
      max_connections: self.max_connections,
      acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
      busy_timeout:    Duration::from_millis(self.busy_timeout_ms),
    }
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      ttl:         (self.cache.ttl_secs > 0).then(|| Duration::from_secs(self.cache.ttl_secs)),
      max_entries: self.cache.max_entries,
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// `config.toml` + `production` → `config.production.toml`.
fn env_overlay(path: &Path, env: &str) -> PathBuf {
  let stem = path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "config".to_owned());
  path.with_file_name(format!("{stem}.{env}.toml"))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// Open the pool and store described by `cfg`. The schema is not touched.
pub async fn open_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  let store_path = expand_tilde(&cfg.store_path);
  let pool = bubble_store_sqlite::SqlitePool::open(&store_path, cfg.pool_config())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  Ok(SqliteStore::new(pool).with_op_timeout(Duration::from_millis(cfg.op_timeout_ms)))
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Top-level router: `/health` plus the JSON API under `/api`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: DatapointStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", bubble_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
