//! Error types for `argent-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown entity: {0:?}")]
  UnknownEntity(String),

  #[error("bronze row is not a JSON object: {0}")]
  NotAnObject(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
