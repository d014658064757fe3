//! Runs every selected flow in parallel, either once or continuously.

use std::{collections::BTreeMap, sync::Arc};

use argent_core::{
  Entity,
  stats::FlowStats,
  store::{BronzeLog, SilverStore},
};
use serde::Serialize;
use tokio::{sync::watch, task::JoinSet};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::{Error, Result, config::PipelineConfig, flow::Flow};

/// Totals for one pipeline update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
  pub update_id: Uuid,
  pub flows:     BTreeMap<Entity, FlowStats>,
}

/// The silver pipeline: one independent [`Flow`] per selected entity.
pub struct Pipeline<S> {
  store:  Arc<S>,
  config: PipelineConfig,
}

impl<S> Pipeline<S>
where
  S: BronzeLog + SilverStore + 'static,
{
  pub fn new(store: Arc<S>, config: PipelineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config })
  }

  fn flows(&self) -> Vec<Arc<Flow<S>>> {
    self
      .config
      .selected_entities()
      .into_iter()
      .map(|entity| Arc::new(Flow::new(self.store.clone(), entity, &self.config)))
      .collect()
  }

  /// Drain every flow until caught up, in parallel.
  ///
  /// All flows run to completion even if one fails; the first failure is
  /// returned after the others finish.
  pub async fn run_once(&self) -> Result<UpdateReport> {
    let update_id = Uuid::new_v4();
    tracing::info!(%update_id, "starting triggered update");

    let mut set = JoinSet::new();
    for flow in self.flows() {
      let span = tracing::info_span!("flow", entity = %flow.entity(), %update_id);
      set.spawn(
        async move {
          let result = flow.drain(update_id).await;
          (flow.entity(), result)
        }
        .instrument(span),
      );
    }

    collect(update_id, set).await
  }

  /// Keep every flow caught up until `shutdown` flips to `true` (or its
  /// sender is dropped).
  ///
  /// See [`Flow::follow`] for how each flow treats errors. The first error
  /// is returned once all flows have stopped.
  pub async fn run_continuous(
    &self,
    shutdown: watch::Receiver<bool>,
  ) -> Result<UpdateReport> {
    let update_id = Uuid::new_v4();
    let poll = self.config.poll_interval();
    tracing::info!(%update_id, ?poll, "starting continuous update");

    let mut set = JoinSet::new();
    for flow in self.flows() {
      let shutdown = shutdown.clone();
      let span = tracing::info_span!("flow", entity = %flow.entity(), %update_id);
      set.spawn(
        async move {
          let result = flow.follow(update_id, poll, shutdown).await;
          (flow.entity(), result)
        }
        .instrument(span),
      );
    }

    let report = collect(update_id, set).await;
    tracing::info!(%update_id, "continuous update stopped");
    report
  }
}

async fn collect(
  update_id: Uuid,
  mut set: JoinSet<(Entity, Result<FlowStats>)>,
) -> Result<UpdateReport> {
  let mut flows = BTreeMap::new();
  let mut first_error: Option<Error> = None;

  while let Some(joined) = set.join_next().await {
    match joined {
      Ok((entity, Ok(stats))) => {
        flows.insert(entity, stats);
      }
      Ok((entity, Err(e))) => {
        tracing::error!(%entity, error = %e, "flow failed");
        first_error.get_or_insert(e);
      }
      Err(e) => {
        first_error.get_or_insert(Error::Join(e));
      }
    }
  }

  match first_error {
    Some(e) => Err(e),
    None => Ok(UpdateReport { update_id, flows }),
  }
}
