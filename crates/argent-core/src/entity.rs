//! The entity catalog: the six silver tables, their column schemas and how
//! each one is written.
//!
//! Schemas are static tables of `(column, type)` pairs so the transformer,
//! the quality rules and the storage backends all derive their behaviour from
//! one place instead of repeating per-entity code.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result, quality::ExpectationSet, value::SemanticType};

/// Name of the platform-injected column holding data that failed to parse
/// during raw ingestion. Never carried into silver.
pub const RESCUED_DATA_COLUMN: &str = "_rescued_data";

/// Name of the processing timestamp column appended to every silver row.
pub const MODIFIED_DATE_COLUMN: &str = "modified_date";

// ─── Schema ──────────────────────────────────────────────────────────────────

/// A single typed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub ty:   SemanticType,
}

const fn int(name: &'static str) -> Column { Column { name, ty: SemanticType::Int } }

const fn double(name: &'static str) -> Column {
  Column { name, ty: SemanticType::Double }
}

const fn string(name: &'static str) -> Column {
  Column { name, ty: SemanticType::String }
}

/// Ordered column layout of a silver table, excluding `modified_date`.
#[derive(Debug)]
pub struct EntitySchema {
  /// Surrogate key column; always the first column.
  pub key:     &'static str,
  pub columns: &'static [Column],
}

impl EntitySchema {
  /// Position of `name` within [`Self::columns`].
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c.name == name)
  }

  pub fn key_index(&self) -> usize { self.index_of(self.key).unwrap_or(0) }
}

static PRODUCTS: EntitySchema = EntitySchema {
  key:     "product_sk",
  columns: &[
    int("product_sk"),
    string("product_id"),
    string("product_name"),
    string("category"),
    string("brand"),
    string("origin_location"),
  ],
};

static CUSTOMERS: EntitySchema = EntitySchema {
  key:     "customer_sk",
  columns: &[
    int("customer_sk"),
    string("customer_id"),
    string("first_name"),
    string("last_name"),
    string("email"),
    string("residential_location"),
    string("customer_segment"),
  ],
};

static STORES: EntitySchema = EntitySchema {
  key:     "store_sk",
  columns: &[
    int("store_sk"),
    string("store_id"),
    string("store_name"),
    string("store_type"),
    string("store_location"),
    int("store_manager_sk"),
  ],
};

static SALESPERSONS: EntitySchema = EntitySchema {
  key:     "salesperson_sk",
  columns: &[
    int("salesperson_sk"),
    string("salesperson_id"),
    string("salesperson_name"),
    string("salesperson_role"),
  ],
};

static CAMPAIGNS: EntitySchema = EntitySchema {
  key:     "campaign_sk",
  columns: &[
    int("campaign_sk"),
    string("campaign_id"),
    string("campaign_name"),
    int("start_date_sk"),
    int("end_date_sk"),
    double("campaign_budget"),
  ],
};

static SALES: EntitySchema = EntitySchema {
  key:     "sales_sk",
  columns: &[
    int("sales_sk"),
    int("sales_id"),
    int("customer_sk"),
    int("product_sk"),
    int("store_sk"),
    int("salesperson_sk"),
    int("campaign_sk"),
    int("date_sk"),
    int("time_sk"),
    double("total_amount"),
  ],
};

// ─── Entity ──────────────────────────────────────────────────────────────────

/// How transformed rows reach their silver table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
  /// Keyed last-writer-wins upsert ordered by `modified_date`.
  Upsert,
  /// Quality-filtered, append-only.
  Append,
}

/// One of the six processed source entities.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
  Products,
  Customers,
  Stores,
  Salespersons,
  Campaigns,
  Sales,
}

impl Entity {
  /// Parse a lowercase entity name such as `products`.
  pub fn parse(name: &str) -> Result<Self> {
    name.parse().map_err(|_| Error::UnknownEntity(name.to_owned()))
  }

  pub fn schema(self) -> &'static EntitySchema {
    match self {
      Self::Products => &PRODUCTS,
      Self::Customers => &CUSTOMERS,
      Self::Stores => &STORES,
      Self::Salespersons => &SALESPERSONS,
      Self::Campaigns => &CAMPAIGNS,
      Self::Sales => &SALES,
    }
  }

  pub fn sink(self) -> SinkKind {
    match self {
      Self::Sales => SinkKind::Append,
      _ => SinkKind::Upsert,
    }
  }

  /// Quality expectations evaluated before the row reaches its sink.
  /// Dimensions carry none.
  pub fn expectations(self) -> ExpectationSet {
    match self {
      Self::Sales => crate::quality::sales_expectations(),
      _ => ExpectationSet::default(),
    }
  }

  /// Name of the silver target table, e.g. `silver_products`.
  pub fn silver_table(self) -> String { format!("silver_{}", self.as_ref()) }

  /// Name of the bronze source log, e.g. `bronze_products`.
  pub fn bronze_table(self) -> String { format!("bronze_{}", self.as_ref()) }
}
