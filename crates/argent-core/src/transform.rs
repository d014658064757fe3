//! Bronze → silver row normalisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{Entity, RESCUED_DATA_COLUMN},
  row::{BronzeRow, SilverRow},
  stats::FlowStats,
  value::{Value, cast},
};

/// What to do with a row when one of its columns fails to cast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastPolicy {
  /// Null the offending value and keep the row.
  #[default]
  Null,
  /// Drop the whole row.
  Reject,
}

/// Result of transforming a single bronze row.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
  /// `None` when the row was rejected by [`CastPolicy::Reject`].
  pub row:           Option<SilverRow>,
  /// Columns whose raw value could not be cast.
  pub cast_failures: Vec<&'static str>,
  /// Whether the bronze row carried rescued data.
  pub rescued:       bool,
}

impl Transformed {
  /// Fold this outcome into `stats`. Does not count `rows_read`.
  pub fn record(&self, stats: &mut FlowStats) {
    for column in &self.cast_failures {
      stats.record_cast_failure(column);
    }
    if self.rescued {
      stats.rescued_rows += 1;
    }
    if self.row.is_none() {
      stats.rows_rejected_cast += 1;
    }
  }
}

/// Schema-driven transformer for one entity.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
  entity: Entity,
  policy: CastPolicy,
}

impl Transformer {
  pub fn new(entity: Entity, policy: CastPolicy) -> Self { Self { entity, policy } }

  pub fn entity(&self) -> Entity { self.entity }

  /// Project `raw` onto the entity schema, casting each column, and stamp it
  /// with `now`.
  ///
  /// Columns absent from the schema, including the rescued-data column, are
  /// discarded. Missing columns become null.
  pub fn transform(&self, raw: &BronzeRow, now: DateTime<Utc>) -> Transformed {
    let schema = self.entity.schema();
    let mut values = Vec::with_capacity(schema.columns.len());
    let mut cast_failures = Vec::new();

    for column in schema.columns {
      let value = match raw.get(column.name) {
        None => Value::Null,
        Some(json) => cast(json, column.ty).unwrap_or_else(|_| {
          cast_failures.push(column.name);
          Value::Null
        }),
      };
      values.push(value);
    }

    let rescued = raw
      .get(RESCUED_DATA_COLUMN)
      .is_some_and(|v| !v.is_null());

    let row = if cast_failures.is_empty() || self.policy == CastPolicy::Null {
      Some(SilverRow { entity: self.entity, values, modified_date: now })
    } else {
      None
    };

    Transformed { row, cast_failures, rescued }
  }
}
