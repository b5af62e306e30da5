//! JSON REST API for the bubble-tracker datapoint store.
//!
//! Exposes an axum [`Router`] backed by any [`bubble_core::store::DatapointStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", bubble_api::api_router(store.clone()))
//! ```

pub mod datapoints;
pub mod error;

use std::sync::Arc;

use axum::{Router, routing::get};
use bubble_core::store::DatapointStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: DatapointStore + 'static,
{
  Router::new()
    .route("/datapoints", get(datapoints::list::<S>))
    .route("/datapoints/latest", get(datapoints::latest::<S>))
    .route(
      "/datapoints/{date}",
      get(datapoints::get_one::<S>).patch(datapoints::upsert::<S>),
    )
    .with_state(store)
}
