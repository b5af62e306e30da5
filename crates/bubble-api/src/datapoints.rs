//! Handlers for `/datapoints` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/datapoints` | Optional `start`, `end` (`YYYYMMDD`), `order=asc\|desc`, `limit`, `after` |
//! | `GET`   | `/datapoints/latest` | 404 if the store is empty |
//! | `GET`   | `/datapoints/:date` | 404 if not found |
//! | `PATCH` | `/datapoints/:date` | Body: `{"<field>": <number>, ...}`; merges into the day |

use std::sync::Arc;

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
};
use bubble_core::{
  DateKey, Datapoint, Patch,
  store::{DatapointStore, Order, RangeQuery},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

fn parse_key(raw: &str) -> Result<DateKey, ApiError> { Ok(raw.parse::<DateKey>()?) }

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  /// Inclusive lower bound; defaults to the earliest supported day.
  pub start: Option<String>,
  /// Inclusive upper bound; defaults to the latest supported day.
  pub end:   Option<String>,
  #[serde(default)]
  pub order: Order,
  pub limit: Option<usize>,
  /// Continue after this key (exclusive) in the scan direction.
  pub after: Option<String>,
}

impl ListParams {
  fn into_query(self) -> Result<RangeQuery, ApiError> {
    let start = self.start.as_deref().map(parse_key).transpose()?.unwrap_or(DateKey::MIN);
    let end = self.end.as_deref().map(parse_key).transpose()?.unwrap_or(DateKey::MAX);

    let mut query = RangeQuery::new(start, end).order(self.order);
    query.limit = self.limit;
    query.after = self.after.as_deref().map(parse_key).transpose()?;
    query.validate()?;
    Ok(query)
  }
}

/// `GET /datapoints[?start=...][&end=...][&order=...][&limit=...][&after=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Datapoint>>, ApiError>
where
  S: DatapointStore,
{
  let Query(params) = params?;
  let query = params.into_query()?;
  let rows = store.list(&query).await.map_err(ApiError::from_store)?;
  Ok(Json(rows))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /datapoints/:date`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  date: Result<Path<String>, PathRejection>,
) -> Result<Json<Datapoint>, ApiError>
where
  S: DatapointStore,
{
  let Path(date) = date?;
  let key = parse_key(&date)?;
  let dp = store
    .get(key)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("no datapoint for {key}")))?;
  Ok(Json(dp))
}

/// `GET /datapoints/latest`
pub async fn latest<S>(State(store): State<Arc<S>>) -> Result<Json<Datapoint>, ApiError>
where
  S: DatapointStore,
{
  let dp = store
    .latest()
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound("no datapoints recorded yet".into()))?;
  Ok(Json(dp))
}

// ─── Upsert ───────────────────────────────────────────────────────────────────

/// `PATCH /datapoints/:date`, body `{"shiller_pe": 37.2, "vix": 14.1}`
pub async fn upsert<S>(
  State(store): State<Arc<S>>,
  date: Result<Path<String>, PathRejection>,
  body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Datapoint>, ApiError>
where
  S: DatapointStore,
{
  let Path(date) = date?;
  let key = parse_key(&date)?;
  let Json(body) = body?;
  let patch = Patch::from_json(&body)?;
  let dp = store.upsert(key, patch).await.map_err(ApiError::from_store)?;
  Ok(Json(dp))
}
