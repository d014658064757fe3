//! SQL schema for the argent SQLite store.
//!
//! The bookkeeping tables are static DDL. Bronze logs and silver tables are
//! generated from the entity catalog so the column layout has a single source
//! of truth. Everything is idempotent thanks to `CREATE TABLE IF NOT EXISTS`.

use argent_core::{
  entity::{Entity, MODIFIED_DATE_COLUMN, SinkKind},
  value::SemanticType,
};

/// Pragmas and flow bookkeeping tables.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Last bronze offset whose effects are committed, per flow.
CREATE TABLE IF NOT EXISTS checkpoints (
    flow        TEXT PRIMARY KEY,
    log_offset  INTEGER NOT NULL,
    updated_at  TEXT NOT NULL
);

-- One row per committed micro-batch.
CREATE TABLE IF NOT EXISTS flow_events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    update_id   TEXT NOT NULL,
    flow        TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    checkpoint  INTEGER NOT NULL,
    stats_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS flow_events_flow_idx ON flow_events(flow);

PRAGMA user_version = 1;
";

fn sql_type(ty: SemanticType) -> &'static str {
  match ty {
    SemanticType::Int => "INTEGER",
    SemanticType::Double => "REAL",
    SemanticType::String => "TEXT",
  }
}

/// Raw append log for `entity`. Rows are never updated or deleted.
pub fn bronze_ddl(entity: Entity) -> String {
  let table = entity.bronze_table();
  format!(
    "CREATE TABLE IF NOT EXISTS {table} (
         log_offset  INTEGER PRIMARY KEY AUTOINCREMENT,
         row_json    TEXT NOT NULL,
         ingested_at TEXT NOT NULL
     );"
  )
}

/// Silver target table for `entity`.
///
/// Dimensions are keyed by their surrogate key. The fact table is keyed by an
/// internal insertion counter so duplicate surrogate keys can coexist.
pub fn silver_ddl(entity: Entity) -> String {
  let schema = entity.schema();
  let table = entity.silver_table();

  let mut defs = Vec::with_capacity(schema.columns.len() + 2);
  if entity.sink() == SinkKind::Append {
    defs.push("_row_id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned());
  }
  for column in schema.columns {
    let mut def = format!("{} {}", column.name, sql_type(column.ty));
    if entity.sink() == SinkKind::Upsert && column.name == schema.key {
      def.push_str(" PRIMARY KEY NOT NULL");
    }
    defs.push(def);
  }
  defs.push(format!("{MODIFIED_DATE_COLUMN} TEXT NOT NULL"));

  let mut ddl = format!("CREATE TABLE IF NOT EXISTS {table} (\n    {}\n);", defs.join(",\n    "));
  if entity.sink() == SinkKind::Append {
    ddl.push_str(&format!(
      "\nCREATE INDEX IF NOT EXISTS {table}_key_idx ON {table}({});",
      schema.key
    ));
  }
  ddl
}

/// Comma-separated list of silver columns including `modified_date`.
pub fn silver_columns(entity: Entity) -> String {
  let mut names: Vec<&str> = entity.schema().columns.iter().map(|c| c.name).collect();
  names.push(MODIFIED_DATE_COLUMN);
  names.join(", ")
}

/// `?1, ?2, …` for every silver column including `modified_date`.
pub fn silver_placeholders(entity: Entity) -> String {
  (1..=entity.schema().columns.len() + 1)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dimension_ddl_keys_on_surrogate() {
    let ddl = silver_ddl(Entity::Stores);
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS silver_stores"));
    assert!(ddl.contains("store_sk INTEGER PRIMARY KEY NOT NULL"));
    assert!(ddl.contains("store_manager_sk INTEGER"));
    assert!(ddl.contains("modified_date TEXT NOT NULL"));
    assert!(!ddl.contains("_row_id"));
  }

  #[test]
  fn fact_ddl_allows_duplicate_keys() {
    let ddl = silver_ddl(Entity::Sales);
    assert!(ddl.contains("_row_id INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert!(ddl.contains("sales_sk INTEGER,"));
    assert!(ddl.contains("total_amount REAL"));
    assert!(ddl.contains("silver_sales_key_idx"));
  }

  #[test]
  fn column_lists_line_up() {
    assert_eq!(
      silver_columns(Entity::Salespersons),
      "salesperson_sk, salesperson_id, salesperson_name, salesperson_role, modified_date"
    );
    assert_eq!(silver_placeholders(Entity::Salespersons), "?1, ?2, ?3, ?4, ?5");
  }
}
