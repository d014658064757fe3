//! Bronze input records and normalised silver rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{Entity, MODIFIED_DATE_COLUMN},
  value::Value,
};

/// Position within an entity's bronze log. Offsets start at 1; a checkpoint
/// of 0 means nothing has been processed yet.
pub type Offset = u64;

/// A raw bronze row exactly as ingested.
pub type BronzeRow = serde_json::Map<String, serde_json::Value>;

/// Parse one line of a JSON-lines bronze file.
pub fn parse_bronze_line(line: &str) -> Result<BronzeRow> {
  match serde_json::from_str(line)? {
    serde_json::Value::Object(map) => Ok(map),
    other => Err(Error::NotAnObject(other.to_string())),
  }
}

/// A bronze row together with its log position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BronzeRecord {
  pub offset: Offset,
  pub row:    BronzeRow,
}

/// A type-normalised row for one entity.
///
/// `values` is aligned with the entity schema's `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct SilverRow {
  pub entity:        Entity,
  pub values:        Vec<Value>,
  pub modified_date: DateTime<Utc>,
}

impl SilverRow {
  /// Look up a column by name.
  pub fn get(&self, column: &str) -> Option<&Value> {
    self.entity.schema().index_of(column).and_then(|i| self.values.get(i))
  }

  /// The surrogate key, or `None` if it is null.
  pub fn key(&self) -> Option<i32> {
    self
      .values
      .get(self.entity.schema().key_index())
      .and_then(Value::as_int)
  }

  /// Render as a flat JSON object including `modified_date`.
  pub fn to_json(&self) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (column, value) in self.entity.schema().columns.iter().zip(&self.values) {
      map.insert(column.name.to_owned(), value.to_json());
    }
    map.insert(
      MODIFIED_DATE_COLUMN.to_owned(),
      serde_json::Value::String(self.modified_date.to_rfc3339()),
    );
    serde_json::Value::Object(map)
  }
}
