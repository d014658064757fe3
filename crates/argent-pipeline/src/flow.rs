//! A single entity's flow: bronze log → transform → quality → silver sink.

use std::{sync::Arc, time::Duration};

use argent_core::{
  entity::{Entity, SinkKind},
  quality::ExpectationSet,
  stats::FlowStats,
  store::{BronzeLog, FlowEvent, SilverStore},
  transform::Transformer,
};
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{Error, Result, config::PipelineConfig};

/// Processes one entity's bronze log in micro-batches.
///
/// Each batch is read after the committed checkpoint, transformed with a
/// single processing timestamp, filtered, and committed together with the
/// new checkpoint. A batch that fails leaves the checkpoint untouched, so it
/// is re-read on the next attempt.
pub struct Flow<S> {
  store:        Arc<S>,
  transformer:  Transformer,
  expectations: ExpectationSet,
  batch_size:   usize,
}

impl<S> Flow<S>
where
  S: BronzeLog + SilverStore + 'static,
{
  pub fn new(store: Arc<S>, entity: Entity, config: &PipelineConfig) -> Self {
    Self {
      store,
      transformer: Transformer::new(entity, config.cast_policy),
      expectations: entity.expectations(),
      batch_size: config.batch_size.max(1),
    }
  }

  /// Replace the entity's default expectations.
  pub fn with_expectations(mut self, expectations: ExpectationSet) -> Self {
    self.expectations = expectations;
    self
  }

  pub fn entity(&self) -> Entity { self.transformer.entity() }

  /// Process the next micro-batch. Returns `None` when the flow is caught up
  /// with its bronze log.
  pub async fn run_batch(&self, update_id: Uuid) -> Result<Option<FlowStats>> {
    let entity = self.entity();
    let checkpoint = self.store.checkpoint(entity).await.map_err(Error::store)?;
    let records = self
      .store
      .read_after(entity, checkpoint, self.batch_size)
      .await
      .map_err(Error::store)?;
    let Some(last_offset) = records.last().map(|r| r.offset) else {
      return Ok(None);
    };

    let now = Utc::now();
    let mut stats = FlowStats { rows_read: records.len() as u64, ..Default::default() };
    let mut rows = Vec::with_capacity(records.len());

    for record in &records {
      let out = self.transformer.transform(&record.row, now);
      out.record(&mut stats);
      if !out.cast_failures.is_empty() {
        tracing::debug!(
          offset = record.offset,
          columns = ?out.cast_failures,
          rejected = out.row.is_none(),
          "cast failure"
        );
      }
      let Some(row) = out.row else { continue };

      let verdict = self.expectations.evaluate(&row);
      for name in &verdict.violated {
        stats.record_expectation_failure(name);
      }
      if let Some(expectation) = verdict.fail {
        return Err(Error::ExpectationFailed { entity, expectation, offset: record.offset });
      }
      if !verdict.keep() {
        stats.rows_dropped += 1;
        continue;
      }

      if entity.sink() == SinkKind::Upsert && row.key().is_none() {
        tracing::warn!(offset = record.offset, "dropping row with null surrogate key");
        stats.unkeyed_rows += 1;
        continue;
      }
      rows.push(row);
    }

    match entity.sink() {
      SinkKind::Upsert => {
        let outcome = self
          .store
          .commit_upserts(entity, rows, last_offset)
          .await
          .map_err(Error::store)?;
        outcome.record(&mut stats);
      }
      SinkKind::Append => {
        stats.rows_written += self
          .store
          .commit_appends(entity, rows, last_offset)
          .await
          .map_err(Error::store)?;
      }
    }

    tracing::info!(
      checkpoint = last_offset,
      read = stats.rows_read,
      written = stats.rows_written,
      dropped = stats.rows_dropped,
      stale = stats.rows_stale,
      cast_failures = stats.total_cast_failures(),
      "batch committed"
    );

    // The event log is informational; the batch is already committed.
    let event = FlowEvent {
      update_id,
      entity,
      recorded_at: Utc::now(),
      checkpoint: last_offset,
      stats: stats.clone(),
    };
    if let Err(e) = self.store.record_event(event).await {
      tracing::warn!(error = %e, "failed to record flow event");
    }

    Ok(Some(stats))
  }

  /// Run batches until the flow is caught up.
  pub async fn drain(&self, update_id: Uuid) -> Result<FlowStats> {
    let mut total = FlowStats::default();
    while let Some(stats) = self.run_batch(update_id).await? {
      total.merge(&stats);
    }
    Ok(total)
  }

  /// Keep the flow caught up, polling every `poll`, until `shutdown` flips to
  /// `true` or its sender is dropped.
  ///
  /// Store errors are logged and retried on the next poll. Any other error
  /// stops the flow at once and is returned.
  pub async fn follow(
    &self,
    update_id: Uuid,
    poll: Duration,
    mut shutdown: watch::Receiver<bool>,
  ) -> Result<FlowStats> {
    let mut total = FlowStats::default();
    loop {
      if *shutdown.borrow() {
        return Ok(total);
      }
      match self.run_batch(update_id).await {
        Ok(Some(stats)) => {
          total.merge(&stats);
          continue;
        }
        Ok(None) => {}
        Err(e) if e.is_retryable() => {
          tracing::warn!(error = %e, "batch failed; retrying after poll interval");
        }
        Err(e) => {
          tracing::error!(error = %e, "flow stopped; other flows keep running");
          return Err(e);
        }
      }
      tokio::select! {
        changed = shutdown.changed() => {
          if changed.is_err() {
            return Ok(total);
          }
        }
        _ = tokio::time::sleep(poll) => {}
      }
    }
  }
}
