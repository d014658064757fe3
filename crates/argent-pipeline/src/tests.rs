//! End-to-end flow tests against an in-memory SQLite store.

use std::{sync::Arc, time::Duration};

use argent_core::{
  Entity,
  quality::{Action, ExpectationSet},
  row::BronzeRow,
  store::{BronzeLog, SilverStore},
  transform::CastPolicy,
  value::Value,
};
use argent_store_sqlite::SqliteStore;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{Error, Flow, Pipeline, PipelineConfig};

async fn store() -> Arc<SqliteStore> {
  Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  )
}

fn config(entities: &[Entity]) -> PipelineConfig {
  PipelineConfig { entities: entities.to_vec(), ..Default::default() }
}

fn bronze(v: serde_json::Value) -> BronzeRow {
  match v {
    serde_json::Value::Object(map) => map,
    _ => unreachable!(),
  }
}

fn sale(sales_sk: i64, total_amount: serde_json::Value) -> BronzeRow {
  bronze(json!({
    "sales_sk": sales_sk,
    "sales_id": sales_sk + 1000,
    "customer_sk": 1,
    "product_sk": 2,
    "store_sk": 3,
    "salesperson_sk": 4,
    "campaign_sk": 5,
    "date_sk": 20260115,
    "time_sk": 1430,
    "total_amount": total_amount,
    "_rescued_data": null,
  }))
}

async fn ingest(s: &SqliteStore, entity: Entity, rows: Vec<serde_json::Value>) {
  s.append(entity, rows.into_iter().map(bronze).collect())
    .await
    .unwrap();
}

fn str_col<'a>(row: &'a argent_core::row::SilverRow, column: &str) -> &'a str {
  match row.get(column) {
    Some(Value::String(s)) => s,
    other => panic!("{column}: {other:?}"),
  }
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn later_product_version_replaces_earlier() {
  let s = store().await;
  let pipeline = Pipeline::new(s.clone(), config(&[Entity::Products])).unwrap();

  ingest(&s, Entity::Products, vec![json!({"product_sk": 1, "product_name": "Widget"})]).await;
  pipeline.run_once().await.unwrap();

  ingest(&s, Entity::Products, vec![json!({"product_sk": "1", "product_name": "Widget-v2"})])
    .await;
  let report = pipeline.run_once().await.unwrap();

  let rows = s.scan(Entity::Products).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(str_col(&rows[0], "product_name"), "Widget-v2");

  let stats = &report.flows[&Entity::Products];
  assert_eq!(stats.rows_read, 1);
  assert_eq!(stats.rows_replaced, 1);
}

#[tokio::test]
async fn duplicate_keys_within_a_batch_keep_the_last_row() {
  let s = store().await;
  ingest(
    &s,
    Entity::Customers,
    vec![
      json!({"customer_sk": 7, "email": "old@example.com"}),
      json!({"customer_sk": 7, "email": "new@example.com"}),
    ],
  )
  .await;

  Pipeline::new(s.clone(), config(&[Entity::Customers]))
    .unwrap()
    .run_once()
    .await
    .unwrap();

  let rows = s.get(Entity::Customers, 7).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(str_col(&rows[0], "email"), "new@example.com");
}

#[tokio::test]
async fn unkeyed_dimension_rows_are_counted_and_skipped() {
  let s = store().await;
  ingest(
    &s,
    Entity::Stores,
    vec![
      json!({"store_sk": null, "store_name": "Ghost"}),
      json!({"store_sk": "abc", "store_name": "Typo"}),
      json!({"store_sk": 2, "store_name": "Real", "store_manager_sk": "x"}),
    ],
  )
  .await;

  let report = Pipeline::new(s.clone(), config(&[Entity::Stores]))
    .unwrap()
    .run_once()
    .await
    .unwrap();
  let stats = &report.flows[&Entity::Stores];
  assert_eq!(stats.unkeyed_rows, 2);
  assert_eq!(stats.rows_written, 1);
  assert_eq!(stats.cast_failures["store_sk"], 1);
  assert_eq!(stats.cast_failures["store_manager_sk"], 1);

  let rows = s.scan(Entity::Stores).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("store_manager_sk"), Some(&Value::Null));
}

#[tokio::test]
async fn reject_policy_drops_rows_with_bad_casts() {
  let s = store().await;
  ingest(
    &s,
    Entity::Campaigns,
    vec![
      json!({"campaign_sk": 1, "campaign_budget": "1000.50"}),
      json!({"campaign_sk": 2, "campaign_budget": "a lot"}),
    ],
  )
  .await;

  let cfg = PipelineConfig { cast_policy: CastPolicy::Reject, ..config(&[Entity::Campaigns]) };
  let report = Pipeline::new(s.clone(), cfg).unwrap().run_once().await.unwrap();

  let stats = &report.flows[&Entity::Campaigns];
  assert_eq!(stats.rows_rejected_cast, 1);
  assert_eq!(stats.rows_written, 1);

  let rows = s.scan(Entity::Campaigns).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get("campaign_budget"), Some(&Value::Double(1000.5)));
}

#[tokio::test]
async fn rescued_data_is_counted_and_dropped() {
  let s = store().await;
  ingest(
    &s,
    Entity::Salespersons,
    vec![json!({"salesperson_sk": 1, "_rescued_data": "{\"extra\":1}"})],
  )
  .await;

  let report = Pipeline::new(s.clone(), config(&[Entity::Salespersons]))
    .unwrap()
    .run_once()
    .await
    .unwrap();
  assert_eq!(report.flows[&Entity::Salespersons].rescued_rows, 1);

  let json = s.scan(Entity::Salespersons).await.unwrap()[0].to_json();
  assert!(json.get("_rescued_data").is_none());
}

// ─── Sales ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_amounts_are_dropped() {
  let s = store().await;
  s.append(
    Entity::Sales,
    vec![sale(1, json!("-5.00")), sale(2, json!("12.345")), sale(3, json!("12.34"))],
  )
  .await
  .unwrap();

  let report = Pipeline::new(s.clone(), config(&[Entity::Sales]))
    .unwrap()
    .run_once()
    .await
    .unwrap();

  let rows = s.scan(Entity::Sales).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].key(), Some(3));
  assert_eq!(rows[0].get("total_amount"), Some(&Value::Double(12.34)));

  let stats = &report.flows[&Entity::Sales];
  assert_eq!(stats.rows_dropped, 2);
  assert_eq!(stats.expectation_failures["total_amount_positive"], 2);
}

#[tokio::test]
async fn rows_with_any_null_key_are_dropped() {
  let s = store().await;
  let columns = [
    "sales_sk",
    "sales_id",
    "customer_sk",
    "product_sk",
    "store_sk",
    "salesperson_sk",
    "campaign_sk",
    "date_sk",
    "time_sk",
    "total_amount",
  ];
  let rows: Vec<BronzeRow> = columns
    .iter()
    .enumerate()
    .map(|(i, column)| {
      let mut row = sale(i as i64 + 1, json!(10));
      row.insert((*column).to_owned(), serde_json::Value::Null);
      row
    })
    .collect();
  s.append(Entity::Sales, rows).await.unwrap();

  let report = Pipeline::new(s.clone(), config(&[Entity::Sales]))
    .unwrap()
    .run_once()
    .await
    .unwrap();

  assert!(s.scan(Entity::Sales).await.unwrap().is_empty());
  let stats = &report.flows[&Entity::Sales];
  assert_eq!(stats.rows_dropped, 10);
  for column in columns {
    assert_eq!(stats.expectation_failures[&format!("{column}_not_null")], 1, "{column}");
  }
}

#[tokio::test]
async fn sales_append_once_and_do_not_reprocess() {
  let s = store().await;
  s.append(Entity::Sales, vec![sale(100, json!(20.5)), sale(101, json!("7"))])
    .await
    .unwrap();
  let pipeline = Pipeline::new(s.clone(), config(&[Entity::Sales])).unwrap();

  pipeline.run_once().await.unwrap();
  let report = pipeline.run_once().await.unwrap();

  let keys: Vec<_> = s
    .scan(Entity::Sales)
    .await
    .unwrap()
    .iter()
    .map(|r| r.key().unwrap())
    .collect();
  assert_eq!(keys, vec![100, 101]);
  assert_eq!(report.flows[&Entity::Sales].rows_read, 0);
}

#[tokio::test]
async fn fail_expectation_aborts_without_committing() {
  let s = store().await;
  s.append(Entity::Sales, vec![sale(1, json!(5)), sale(2, json!(5000))])
    .await
    .unwrap();

  let flow = Flow::new(s.clone(), Entity::Sales, &PipelineConfig::default()).with_expectations(
    ExpectationSet::new().with("amount_under_limit", Action::Fail, |row| {
      row.get("total_amount").and_then(Value::as_double).is_some_and(|v| v < 1000.0)
    }),
  );

  let err = flow.run_batch(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::ExpectationFailed { entity: Entity::Sales, expectation: "amount_under_limit", offset: 2 }
  ));
  assert!(!err.is_retryable());
  assert!(s.scan(Entity::Sales).await.unwrap().is_empty());
  assert_eq!(s.checkpoint(Entity::Sales).await.unwrap(), 0);
}

#[tokio::test]
async fn failing_flow_stops_without_waiting_for_shutdown() {
  let s = store().await;
  s.append(Entity::Sales, vec![sale(1, json!(5000))]).await.unwrap();

  let flow = Flow::new(s.clone(), Entity::Sales, &PipelineConfig::default()).with_expectations(
    ExpectationSet::new().with("amount_under_limit", Action::Fail, |row| {
      row.get("total_amount").and_then(Value::as_double).is_some_and(|v| v < 1000.0)
    }),
  );
  let (_tx, rx) = watch::channel(false);

  let result = tokio::time::timeout(
    Duration::from_secs(5),
    flow.follow(Uuid::new_v4(), Duration::from_millis(10), rx),
  )
  .await
  .expect("flow should stop on its own");
  assert!(matches!(result, Err(Error::ExpectationFailed { offset: 1, .. })));
  assert_eq!(s.checkpoint(Entity::Sales).await.unwrap(), 0);
}

#[tokio::test]
async fn warn_expectation_keeps_rows() {
  let s = store().await;
  s.append(Entity::Sales, vec![sale(1, json!(5))]).await.unwrap();

  let flow = Flow::new(s.clone(), Entity::Sales, &PipelineConfig::default())
    .with_expectations(ExpectationSet::new().with("never_true", Action::Warn, |_| false));
  let stats = flow.drain(Uuid::new_v4()).await.unwrap();

  assert_eq!(stats.rows_written, 1);
  assert_eq!(stats.expectation_failures["never_true"], 1);
}

// ─── Non-finite doubles ──────────────────────────────────────────────────────

#[tokio::test]
async fn nan_budget_is_stored_as_nan() {
  let s = store().await;
  let pipeline = Pipeline::new(s.clone(), config(&[Entity::Campaigns])).unwrap();
  ingest(&s, Entity::Campaigns, vec![json!({"campaign_sk": 9, "campaign_budget": "NaN"})]).await;

  let report = pipeline.run_once().await.unwrap();
  assert_eq!(report.flows[&Entity::Campaigns].total_cast_failures(), 0);

  let rows = s.get(Entity::Campaigns, 9).await.unwrap();
  let budget = rows[0].get("campaign_budget").and_then(Value::as_double).unwrap();
  assert!(budget.is_nan());
}

// ─── Batching, checkpoints and events ────────────────────────────────────────

#[tokio::test]
async fn small_batches_resume_from_checkpoint() {
  let s = store().await;
  let rows = (1..=5).map(|i| json!({"product_sk": i})).collect();
  ingest(&s, Entity::Products, rows).await;

  let cfg = PipelineConfig { batch_size: 2, ..config(&[Entity::Products]) };
  let flow = Flow::new(s.clone(), Entity::Products, &cfg);
  let update_id = Uuid::new_v4();

  let first = flow.run_batch(update_id).await.unwrap().unwrap();
  assert_eq!(first.rows_read, 2);
  assert_eq!(s.checkpoint(Entity::Products).await.unwrap(), 2);

  let rest = flow.drain(update_id).await.unwrap();
  assert_eq!(rest.rows_read, 3);
  assert_eq!(s.checkpoint(Entity::Products).await.unwrap(), 5);
  assert!(flow.run_batch(update_id).await.unwrap().is_none());

  let events = s.events(Some(Entity::Products), 10).await.unwrap();
  assert_eq!(events.iter().map(|e| e.checkpoint).collect::<Vec<_>>(), vec![5, 4, 2]);
  assert!(events.iter().all(|e| e.update_id == update_id));
}

#[tokio::test]
async fn refresh_reprocesses_the_whole_log() {
  let s = store().await;
  ingest(&s, Entity::Products, vec![json!({"product_sk": 1}), json!({"product_sk": 2})]).await;
  let pipeline = Pipeline::new(s.clone(), config(&[Entity::Products])).unwrap();
  pipeline.run_once().await.unwrap();

  s.reset(Entity::Products).await.unwrap();
  let report = pipeline.run_once().await.unwrap();

  assert_eq!(report.flows[&Entity::Products].rows_read, 2);
  assert_eq!(s.scan(Entity::Products).await.unwrap().len(), 2);
}

#[tokio::test]
async fn all_flows_run_in_one_update() {
  let s = store().await;
  ingest(&s, Entity::Products, vec![json!({"product_sk": 1})]).await;
  ingest(&s, Entity::Customers, vec![json!({"customer_sk": 1})]).await;
  ingest(&s, Entity::Stores, vec![json!({"store_sk": 1})]).await;
  ingest(&s, Entity::Salespersons, vec![json!({"salesperson_sk": 1})]).await;
  ingest(&s, Entity::Campaigns, vec![json!({"campaign_sk": 1})]).await;
  s.append(Entity::Sales, vec![sale(1, json!(1.5))]).await.unwrap();

  let report = Pipeline::new(s.clone(), PipelineConfig::default())
    .unwrap()
    .run_once()
    .await
    .unwrap();

  assert_eq!(report.flows.len(), 6);
  assert!(report.flows.values().all(|stats| stats.rows_written == 1));
}

#[tokio::test]
async fn continuous_mode_picks_up_new_rows_and_stops() {
  let s = store().await;
  let cfg = PipelineConfig { poll_interval_ms: 10, ..config(&[Entity::Products]) };
  let pipeline = Pipeline::new(s.clone(), cfg).unwrap();
  let (tx, rx) = watch::channel(false);

  let handle = tokio::spawn(async move { pipeline.run_continuous(rx).await });

  ingest(&s, Entity::Products, vec![json!({"product_sk": 42, "brand": "Acme"})]).await;

  tokio::time::timeout(Duration::from_secs(5), async {
    while s.get(Entity::Products, 42).await.unwrap().is_empty() {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("row should arrive");

  tx.send(true).unwrap();
  let report = tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .expect("pipeline should stop")
    .unwrap()
    .unwrap();
  assert_eq!(report.flows[&Entity::Products].rows_written, 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
  let s = store().await;
  let cfg = PipelineConfig { batch_size: 0, ..Default::default() };
  assert!(matches!(Pipeline::new(s, cfg), Err(Error::Config(_))));
}
