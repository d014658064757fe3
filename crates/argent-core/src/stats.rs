//! Per-flow counters.
//!
//! The silver stage drops data silently by design, so every drop and every
//! coercion failure is counted here and surfaced through logs and the event
//! log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
  /// Bronze records consumed.
  pub rows_read:            u64,
  /// Rows inserted into (or appended to) the silver table.
  pub rows_written:         u64,
  /// Dimension rows that replaced an existing row for the same key.
  pub rows_replaced:        u64,
  /// Dimension rows ignored because the stored row is newer.
  pub rows_stale:           u64,
  /// Dimension rows dropped because the surrogate key was null.
  pub unkeyed_rows:         u64,
  /// Rows whose `_rescued_data` column was populated.
  pub rescued_rows:         u64,
  /// Rows dropped under the reject cast policy.
  pub rows_rejected_cast:   u64,
  /// Rows dropped by `Drop` expectations.
  pub rows_dropped:         u64,
  /// Cast failures keyed by column name.
  #[serde(default)]
  pub cast_failures:        BTreeMap<String, u64>,
  /// Expectation violations keyed by expectation name.
  #[serde(default)]
  pub expectation_failures: BTreeMap<String, u64>,
}

impl FlowStats {
  /// Fold `other` into `self`.
  pub fn merge(&mut self, other: &FlowStats) {
    self.rows_read += other.rows_read;
    self.rows_written += other.rows_written;
    self.rows_replaced += other.rows_replaced;
    self.rows_stale += other.rows_stale;
    self.unkeyed_rows += other.unkeyed_rows;
    self.rescued_rows += other.rescued_rows;
    self.rows_rejected_cast += other.rows_rejected_cast;
    self.rows_dropped += other.rows_dropped;
    for (k, v) in &other.cast_failures {
      *self.cast_failures.entry(k.clone()).or_default() += v;
    }
    for (k, v) in &other.expectation_failures {
      *self.expectation_failures.entry(k.clone()).or_default() += v;
    }
  }

  pub fn record_cast_failure(&mut self, column: &str) {
    *self.cast_failures.entry(column.to_owned()).or_default() += 1;
  }

  pub fn record_expectation_failure(&mut self, name: &str) {
    *self.expectation_failures.entry(name.to_owned()).or_default() += 1;
  }

  pub fn total_cast_failures(&self) -> u64 { self.cast_failures.values().sum() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merge_adds_counters_and_maps() {
    let mut a = FlowStats { rows_read: 2, ..Default::default() };
    a.record_cast_failure("total_amount");

    let mut b = FlowStats { rows_read: 3, rows_dropped: 1, ..Default::default() };
    b.record_cast_failure("total_amount");
    b.record_cast_failure("date_sk");
    b.record_expectation_failure("sales_id_not_null");

    a.merge(&b);
    assert_eq!(a.rows_read, 5);
    assert_eq!(a.rows_dropped, 1);
    assert_eq!(a.cast_failures["total_amount"], 2);
    assert_eq!(a.total_cast_failures(), 3);
    assert_eq!(a.expectation_failures["sales_id_not_null"], 1);
  }
}
