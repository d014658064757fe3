//! Core types and trait definitions for the argent silver-layer stage.
//!
//! This crate is deliberately free of database and runtime dependencies. It
//! holds the entity catalog, the per-row transform, the quality rules and the
//! merge rule; storage backends and the pipeline depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod merge;
pub mod quality;
pub mod row;
pub mod stats;
pub mod store;
pub mod transform;
pub mod value;

pub use entity::Entity;
pub use error::{Error, Result};
