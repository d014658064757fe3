//! Last-writer-wins merge for dimension tables.
//!
//! A dimension holds at most one row per surrogate key. An incoming row
//! replaces the stored one when its `modified_date` is greater than or equal
//! to the stored row's; on equal timestamps the most recently applied row
//! wins. No history is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::FlowStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
  /// No row exists for the key.
  Insert,
  /// The incoming row supersedes the stored one.
  Replace,
  /// The stored row is newer; the incoming row is discarded.
  KeepExisting,
}

/// Decide how an incoming row with `incoming` timestamp merges against the
/// stored row's timestamp, if any.
pub fn decide(existing: Option<DateTime<Utc>>, incoming: DateTime<Utc>) -> MergeDecision {
  match existing {
    None => MergeDecision::Insert,
    Some(current) if incoming >= current => MergeDecision::Replace,
    Some(_) => MergeDecision::KeepExisting,
  }
}

/// Tally of decisions taken while applying a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
  pub inserted: u64,
  pub replaced: u64,
  pub stale:    u64,
}

impl MergeOutcome {
  pub fn count(&mut self, decision: MergeDecision) {
    match decision {
      MergeDecision::Insert => self.inserted += 1,
      MergeDecision::Replace => self.replaced += 1,
      MergeDecision::KeepExisting => self.stale += 1,
    }
  }

  /// Fold into flow counters. Inserts and replacements both count as written.
  pub fn record(&self, stats: &mut FlowStats) {
    stats.rows_written += self.inserted + self.replaced;
    stats.rows_replaced += self.replaced;
    stats.rows_stale += self.stale;
  }
}
