//! Error type for `argent-pipeline`.

use argent_core::{Entity, row::Offset};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid configuration: {0}")]
  Config(String),

  /// A row violated an expectation whose action is `Fail`. Nothing from the
  /// batch was committed.
  #[error("{entity}: expectation {expectation} failed at bronze offset {offset}")]
  ExpectationFailed {
    entity:      Entity,
    expectation: &'static str,
    offset:      Offset,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("flow task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  pub(crate) fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Whether a later poll may succeed. Store failures are treated as
  /// transient; data-quality failures are not.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Store(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
