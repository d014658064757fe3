//! Encoding and decoding helpers between argent domain types and the
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with nanosecond
//! precision so that lexical order equals chronological order. Column values
//! map onto SQLite's native storage classes, except non-finite doubles, which
//! SQLite cannot hold as REAL and are stored as their text form (`NaN`,
//! `Infinity`, `-Infinity`). Flow statistics are stored as compact JSON.

use argent_core::{
  entity::Entity,
  row::SilverRow,
  stats::FlowStats,
  store::FlowEvent,
  value::{SemanticType, Value, render_double},
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Same as [`decode_dt`] but reports failure as a rusqlite error, for use
/// inside `Connection::call` closures.
pub fn decode_dt_sql(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Value ───────────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Int(v) => SqlValue::Integer(i64::from(*v)),
    Value::Double(v) if !v.is_finite() => SqlValue::Text(render_double(*v)),
    Value::Double(v) => SqlValue::Real(*v),
    Value::String(s) => SqlValue::Text(s.clone()),
  }
}

pub fn decode_value(raw: SqlValue, ty: SemanticType, column: &str) -> Result<Value> {
  let mismatch = |found: &SqlValue| {
    Error::Decode(format!("column {column}: expected {ty:?}, found {found:?}"))
  };
  match (raw, ty) {
    (SqlValue::Null, _) => Ok(Value::Null),
    (SqlValue::Integer(i), SemanticType::Int) => i32::try_from(i)
      .map(Value::Int)
      .map_err(|_| mismatch(&SqlValue::Integer(i))),
    (SqlValue::Integer(i), SemanticType::Double) => Ok(Value::Double(i as f64)),
    (SqlValue::Real(f), SemanticType::Double) => Ok(Value::Double(f)),
    (SqlValue::Text(s), SemanticType::Double) => match s.as_str() {
      "NaN" => Ok(Value::Double(f64::NAN)),
      "Infinity" => Ok(Value::Double(f64::INFINITY)),
      "-Infinity" => Ok(Value::Double(f64::NEG_INFINITY)),
      _ => Err(mismatch(&SqlValue::Text(s))),
    },
    (SqlValue::Text(s), SemanticType::String) => Ok(Value::String(s)),
    (other, _) => Err(mismatch(&other)),
  }
}

/// Encode a silver row as positional parameters matching
/// [`crate::schema::silver_columns`].
pub fn encode_silver_row(row: &SilverRow) -> Vec<SqlValue> {
  let mut params: Vec<SqlValue> = row.values.iter().map(encode_value).collect();
  params.push(SqlValue::Text(encode_dt(row.modified_date)));
  params
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw column values read directly from a silver table.
pub struct RawSilverRow {
  pub values:        Vec<SqlValue>,
  pub modified_date: String,
}

impl RawSilverRow {
  /// Read `width` value columns followed by `modified_date`.
  pub fn from_row(row: &rusqlite::Row<'_>, width: usize) -> rusqlite::Result<Self> {
    let values = (0..width)
      .map(|i| row.get::<_, SqlValue>(i))
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Self { values, modified_date: row.get(width)? })
  }

  pub fn into_row(self, entity: Entity) -> Result<SilverRow> {
    let schema = entity.schema();
    if self.values.len() != schema.columns.len() {
      return Err(Error::Decode(format!(
        "{entity}: expected {} columns, found {}",
        schema.columns.len(),
        self.values.len()
      )));
    }

    let values = self
      .values
      .into_iter()
      .zip(schema.columns)
      .map(|(raw, column)| decode_value(raw, column.ty, column.name))
      .collect::<Result<Vec<_>>>()?;

    Ok(SilverRow {
      entity,
      values,
      modified_date: decode_dt(&self.modified_date)?,
    })
  }
}

/// Raw strings read directly from a `flow_events` row.
pub struct RawEvent {
  pub update_id:   String,
  pub flow:        String,
  pub recorded_at: String,
  pub checkpoint:  i64,
  pub stats_json:  String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<FlowEvent> {
    let stats: FlowStats = serde_json::from_str(&self.stats_json)?;
    Ok(FlowEvent {
      update_id: decode_uuid(&self.update_id)?,
      entity: Entity::parse(&self.flow)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      checkpoint: u64::try_from(self.checkpoint)
        .map_err(|_| Error::Decode(format!("negative checkpoint {}", self.checkpoint)))?,
      stats,
    })
  }
}
