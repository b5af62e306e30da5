//! Core types and trait definitions for the bubble-tracker datapoint store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod datapoint;
pub mod date;
pub mod error;
pub mod patch;
pub mod store;

pub use datapoint::{Datapoint, Field, FieldKind};
pub use date::DateKey;
pub use error::{Classify, Error, ErrorKind, Result};
pub use patch::Patch;
