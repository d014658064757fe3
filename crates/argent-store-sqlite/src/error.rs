//! Error type for `argent-store-sqlite`.

use argent_core::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] argent_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decode error: {0}")]
  Decode(String),

  /// A dimension row reached the upsert sink without a surrogate key.
  #[error("{0} row has a null surrogate key")]
  UnkeyedRow(Entity),

  /// A row was committed to the table of a different entity.
  #[error("{found} row committed to {expected} table")]
  EntityMismatch { expected: Entity, found: Entity },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
