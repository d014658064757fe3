//! Runtime pipeline configuration, deserialised from `argent.toml` and
//! `ARGENT_*` environment variables.

use std::{path::PathBuf, time::Duration};

use argent_core::{Entity, transform::CastPolicy};
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// SQLite file holding the bronze logs and silver tables.
  pub store_path:       PathBuf,
  /// Maximum bronze records per micro-batch.
  pub batch_size:       usize,
  /// Idle sleep between polls in continuous mode.
  pub poll_interval_ms: u64,
  pub cast_policy:      CastPolicy,
  /// Flows to run; all six when empty.
  pub entities:         Vec<Entity>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("argent.db"),
      batch_size:       500,
      poll_interval_ms: 1000,
      cast_policy:      CastPolicy::default(),
      entities:         Vec::new(),
    }
  }
}

impl PipelineConfig {
  pub fn validate(&self) -> Result<()> {
    if self.batch_size == 0 {
      return Err(Error::Config("batch_size must be at least 1".into()));
    }
    Ok(())
  }

  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  /// Selected flows in catalog order, without duplicates.
  pub fn selected_entities(&self) -> Vec<Entity> {
    Entity::iter()
      .filter(|e| self.entities.is_empty() || self.entities.contains(e))
      .collect()
  }
}
