//! The `BronzeLog` and `SilverStore` traits.
//!
//! Both are implemented by storage backends (e.g. `argent-store-sqlite`).
//! The pipeline depends on these abstractions, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::Entity,
  merge::MergeOutcome,
  row::{BronzeRecord, BronzeRow, Offset, SilverRow},
  stats::FlowStats,
};

// ─── Event log ───────────────────────────────────────────────────────────────

/// A committed micro-batch, recorded for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
  /// The pipeline update (one `run` invocation) that produced this batch.
  pub update_id:   Uuid,
  pub entity:      Entity,
  pub recorded_at: DateTime<Utc>,
  /// Bronze offset the flow's checkpoint advanced to.
  pub checkpoint:  Offset,
  pub stats:       FlowStats,
}

// ─── Bronze ──────────────────────────────────────────────────────────────────

/// An append-only, ordered log of raw rows per entity.
pub trait BronzeLog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append rows and return the offset of the last one appended (or the
  /// current end of the log if `rows` is empty).
  fn append(
    &self,
    entity: Entity,
    rows: Vec<BronzeRow>,
  ) -> impl Future<Output = Result<Offset, Self::Error>> + Send + '_;

  /// Read up to `limit` records with offset strictly greater than `after`,
  /// in offset order.
  fn read_after(
    &self,
    entity: Entity,
    after: Offset,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<BronzeRecord>, Self::Error>> + Send + '_;
}

// ─── Silver ──────────────────────────────────────────────────────────────────

/// Target tables plus the per-flow checkpoints.
///
/// Both commit methods write the rows and advance the flow's checkpoint to
/// `checkpoint` as one atomic unit: either both happen or neither does.
pub trait SilverStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Last bronze offset whose effects are committed; 0 if none.
  fn checkpoint(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Offset, Self::Error>> + Send + '_;

  /// Merge dimension rows in arrival order using
  /// [`crate::merge::decide`]. Every row must have a non-null key.
  fn commit_upserts(
    &self,
    entity: Entity,
    rows: Vec<SilverRow>,
    checkpoint: Offset,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;

  /// Append fact rows; returns the number appended.
  fn commit_appends(
    &self,
    entity: Entity,
    rows: Vec<SilverRow>,
    checkpoint: Offset,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// All rows of a silver table. Dimensions are ordered by key, facts by
  /// insertion.
  fn scan(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<Vec<SilverRow>, Self::Error>> + Send + '_;

  /// Rows with surrogate key `key`. At most one for a dimension.
  fn get(
    &self,
    entity: Entity,
    key: i32,
  ) -> impl Future<Output = Result<Vec<SilverRow>, Self::Error>> + Send + '_;

  /// Full refresh: empty the silver table and rewind the checkpoint to 0.
  fn reset(&self, entity: Entity) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn record_event(
    &self,
    event: FlowEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Most recent events first.
  fn events(
    &self,
    entity: Option<Entity>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<FlowEvent>, Self::Error>> + Send + '_;
}
