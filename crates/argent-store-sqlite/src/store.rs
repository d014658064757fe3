//! [`SqliteStore`] — the SQLite implementation of [`BronzeLog`] and
//! [`SilverStore`].

use std::path::Path;

use argent_core::{
  entity::{Entity, SinkKind},
  merge::{self, MergeDecision, MergeOutcome},
  row::{BronzeRecord, BronzeRow, Offset, SilverRow},
  store::{BronzeLog, FlowEvent, SilverStore},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use strum::IntoEnumIterator;

use crate::{
  Error, Result,
  encode::{
    RawEvent, RawSilverRow, decode_dt_sql, encode_dt, encode_silver_row, encode_uuid,
  },
  schema::{SCHEMA, bronze_ddl, silver_columns, silver_ddl, silver_placeholders},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An argent store backed by a single SQLite file holding the bronze logs,
/// the silver tables and the flow checkpoints.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let mut ddl = String::from(SCHEMA);
    for entity in Entity::iter() {
      ddl.push_str(&bronze_ddl(entity));
      ddl.push('\n');
      ddl.push_str(&silver_ddl(entity));
      ddl.push('\n');
    }

    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Reject rows that belong to another entity or, for dimensions, have no
  /// key. Validated before any write so a bad batch commits nothing.
  fn validate_batch(entity: Entity, rows: &[SilverRow]) -> Result<()> {
    for row in rows {
      if row.entity != entity {
        return Err(Error::EntityMismatch { expected: entity, found: row.entity });
      }
      if entity.sink() == SinkKind::Upsert && row.key().is_none() {
        return Err(Error::UnkeyedRow(entity));
      }
    }
    Ok(())
  }

  async fn select_rows(
    &self,
    entity: Entity,
    filter: Option<i32>,
  ) -> Result<Vec<SilverRow>> {
    let schema = entity.schema();
    let width = schema.columns.len();
    let order = match entity.sink() {
      SinkKind::Upsert => schema.key,
      SinkKind::Append => "_row_id",
    };
    let sql = format!(
      "SELECT {} FROM {} WHERE (?1 IS NULL OR {} = ?1) ORDER BY {order}",
      silver_columns(entity),
      entity.silver_table(),
      schema.key,
    );

    let raws: Vec<RawSilverRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![filter], |row| RawSilverRow::from_row(row, width))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|raw| raw.into_row(entity)).collect()
  }
}

/// Upsert the flow's checkpoint inside an open transaction.
fn write_checkpoint(
  tx: &rusqlite::Transaction<'_>,
  flow: &str,
  checkpoint: Offset,
  at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO checkpoints (flow, log_offset, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(flow) DO UPDATE SET log_offset = excluded.log_offset,
                                     updated_at = excluded.updated_at",
    rusqlite::params![flow, checkpoint as i64, at],
  )?;
  Ok(())
}

// ─── BronzeLog impl ──────────────────────────────────────────────────────────

impl BronzeLog for SqliteStore {
  type Error = Error;

  async fn append(&self, entity: Entity, rows: Vec<BronzeRow>) -> Result<Offset> {
    let table = entity.bronze_table();
    let encoded = rows
      .iter()
      .map(serde_json::to_string)
      .collect::<serde_json::Result<Vec<_>>>()?;
    let at_str = encode_dt(Utc::now());

    let last: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} (row_json, ingested_at) VALUES (?1, ?2)"
          ))?;
          for json in &encoded {
            stmt.execute(rusqlite::params![json, at_str])?;
          }
        }
        let last: i64 = tx.query_row(
          &format!("SELECT COALESCE(MAX(log_offset), 0) FROM {table}"),
          [],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(last)
      })
      .await?;

    Ok(last as Offset)
  }

  async fn read_after(
    &self,
    entity: Entity,
    after: Offset,
    limit: usize,
  ) -> Result<Vec<BronzeRecord>> {
    let sql = format!(
      "SELECT log_offset, row_json FROM {} WHERE log_offset > ?1
       ORDER BY log_offset LIMIT ?2",
      entity.bronze_table()
    );
    let after_val = after as i64;
    let limit_val = limit as i64;

    let raws: Vec<(i64, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![after_val, limit_val], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(offset, json)| {
        Ok(BronzeRecord { offset: offset as Offset, row: serde_json::from_str(&json)? })
      })
      .collect()
  }
}

// ─── SilverStore impl ────────────────────────────────────────────────────────

impl SilverStore for SqliteStore {
  type Error = Error;

  async fn checkpoint(&self, entity: Entity) -> Result<Offset> {
    let flow = entity.to_string();
    let offset: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT log_offset FROM checkpoints WHERE flow = ?1",
            rusqlite::params![flow],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(offset.unwrap_or(0) as Offset)
  }

  async fn commit_upserts(
    &self,
    entity: Entity,
    rows: Vec<SilverRow>,
    checkpoint: Offset,
  ) -> Result<MergeOutcome> {
    Self::validate_batch(entity, &rows)?;

    let schema = entity.schema();
    let table = entity.silver_table();
    let select_sql = format!("SELECT modified_date FROM {table} WHERE {} = ?1", schema.key);
    let upsert_sql = format!(
      "INSERT OR REPLACE INTO {table} ({}) VALUES ({})",
      silver_columns(entity),
      silver_placeholders(entity),
    );
    // Keys were validated above.
    let encoded: Vec<(i32, chrono::DateTime<Utc>, Vec<SqlValue>)> = rows
      .iter()
      .map(|row| (row.key().unwrap_or_default(), row.modified_date, encode_silver_row(row)))
      .collect();
    let flow = entity.to_string();
    let at_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut outcome = MergeOutcome::default();
        {
          let mut select = tx.prepare(&select_sql)?;
          let mut upsert = tx.prepare(&upsert_sql)?;
          for (key, modified_date, params) in &encoded {
            let existing = select
              .query_row(rusqlite::params![key], |r| r.get::<_, String>(0))
              .optional()?
              .map(|s| decode_dt_sql(&s, 0))
              .transpose()?;

            let decision = merge::decide(existing, *modified_date);
            outcome.count(decision);
            if decision != MergeDecision::KeepExisting {
              upsert.execute(rusqlite::params_from_iter(params.iter()))?;
            }
          }
        }
        write_checkpoint(&tx, &flow, checkpoint, &at_str)?;
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  async fn commit_appends(
    &self,
    entity: Entity,
    rows: Vec<SilverRow>,
    checkpoint: Offset,
  ) -> Result<u64> {
    Self::validate_batch(entity, &rows)?;

    let insert_sql = format!(
      "INSERT INTO {} ({}) VALUES ({})",
      entity.silver_table(),
      silver_columns(entity),
      silver_placeholders(entity),
    );
    let encoded: Vec<Vec<SqlValue>> = rows.iter().map(encode_silver_row).collect();
    let flow = entity.to_string();
    let at_str = encode_dt(Utc::now());

    let appended = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut appended = 0_u64;
        {
          let mut insert = tx.prepare(&insert_sql)?;
          for params in &encoded {
            appended += insert.execute(rusqlite::params_from_iter(params.iter()))? as u64;
          }
        }
        write_checkpoint(&tx, &flow, checkpoint, &at_str)?;
        tx.commit()?;
        Ok(appended)
      })
      .await?;

    Ok(appended)
  }

  async fn scan(&self, entity: Entity) -> Result<Vec<SilverRow>> {
    self.select_rows(entity, None).await
  }

  async fn get(&self, entity: Entity, key: i32) -> Result<Vec<SilverRow>> {
    self.select_rows(entity, Some(key)).await
  }

  async fn reset(&self, entity: Entity) -> Result<()> {
    let delete_sql = format!("DELETE FROM {}", entity.silver_table());
    let flow = entity.to_string();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(&delete_sql, [])?;
        tx.execute("DELETE FROM checkpoints WHERE flow = ?1", rusqlite::params![flow])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_event(&self, event: FlowEvent) -> Result<()> {
    let update_id_str = encode_uuid(event.update_id);
    let flow = event.entity.to_string();
    let at_str = encode_dt(event.recorded_at);
    let checkpoint = event.checkpoint as i64;
    let stats_json = serde_json::to_string(&event.stats)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO flow_events (update_id, flow, recorded_at, checkpoint, stats_json)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![update_id_str, flow, at_str, checkpoint, stats_json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn events(&self, entity: Option<Entity>, limit: usize) -> Result<Vec<FlowEvent>> {
    let flow = entity.map(|e| e.to_string());
    let limit_val = limit as i64;

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT update_id, flow, recorded_at, checkpoint, stats_json
           FROM flow_events
           WHERE (?1 IS NULL OR flow = ?1)
           ORDER BY event_id DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![flow, limit_val], |row| {
            Ok(RawEvent {
              update_id:   row.get(0)?,
              flow:        row.get(1)?,
              recorded_at: row.get(2)?,
              checkpoint:  row.get(3)?,
              stats_json:  row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}
