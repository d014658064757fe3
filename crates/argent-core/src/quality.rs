//! Data-quality expectations evaluated against silver rows.
//!
//! An expectation is a named boolean predicate plus the action taken when a
//! row violates it. A set of expectations is evaluated in declaration order
//! and every violation is reported, not just the first.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
  row::SilverRow,
  value::{Value, render_double},
};

/// Reaction to a row that violates an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
  /// Keep the row; count the violation.
  Warn,
  /// Drop the row; count the violation.
  Drop,
  /// Abort the whole batch.
  Fail,
}

pub type Predicate = fn(&SilverRow) -> bool;

/// A single named rule.
#[derive(Clone)]
pub struct Expectation {
  pub name:      &'static str,
  pub action:    Action,
  pub predicate: Predicate,
}

impl fmt::Debug for Expectation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Expectation")
      .field("name", &self.name)
      .field("action", &self.action)
      .finish_non_exhaustive()
  }
}

/// Outcome of evaluating an [`ExpectationSet`] against one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
  /// Names of every violated expectation, in declaration order.
  pub violated: Vec<&'static str>,
  /// Whether a `Drop` expectation was violated.
  pub drop:     bool,
  /// First violated `Fail` expectation, if any.
  pub fail:     Option<&'static str>,
}

impl Verdict {
  /// Whether the row survives: no `Drop` or `Fail` expectation was violated.
  pub fn keep(&self) -> bool { !self.drop && self.fail.is_none() }
}

/// An ordered collection of expectations.
#[derive(Debug, Clone, Default)]
pub struct ExpectationSet {
  expectations: Vec<Expectation>,
}

impl ExpectationSet {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, name: &'static str, action: Action, predicate: Predicate) -> Self {
    self.expectations.push(Expectation { name, action, predicate });
    self
  }

  pub fn len(&self) -> usize { self.expectations.len() }

  pub fn is_empty(&self) -> bool { self.expectations.is_empty() }

  pub fn evaluate(&self, row: &SilverRow) -> Verdict {
    let mut verdict = Verdict::default();
    for e in &self.expectations {
      if (e.predicate)(row) {
        continue;
      }
      verdict.violated.push(e.name);
      match e.action {
        Action::Warn => {}
        Action::Drop => verdict.drop = true,
        Action::Fail => {
          verdict.fail.get_or_insert(e.name);
        }
      }
    }
    verdict
  }
}

// ─── Sales rules ─────────────────────────────────────────────────────────────

static AMOUNT_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]{1,2})?$").expect("amount regex"));

fn not_null(row: &SilverRow, column: &str) -> bool {
  row.get(column).is_some_and(|v| !v.is_null())
}

/// `total_amount` must render as a plain decimal with at most two fractional
/// digits and be strictly positive.
pub fn is_positive_amount(value: &Value) -> bool {
  let Some(amount) = value.as_double() else {
    return false;
  };
  AMOUNT_PATTERN.is_match(&render_double(amount)) && amount > 0.0
}

macro_rules! not_null_rule {
  ($set:expr, $column:literal) => {
    $set.with(concat!($column, "_not_null"), Action::Drop, |row| {
      not_null(row, $column)
    })
  };
}

/// The validity rules applied to the sales fact. Every rule drops.
pub fn sales_expectations() -> ExpectationSet {
  let set = ExpectationSet::new();
  let set = not_null_rule!(set, "sales_sk");
  let set = not_null_rule!(set, "sales_id");
  let set = not_null_rule!(set, "customer_sk");
  let set = not_null_rule!(set, "product_sk");
  let set = not_null_rule!(set, "store_sk");
  let set = not_null_rule!(set, "salesperson_sk");
  let set = not_null_rule!(set, "campaign_sk");
  let set = not_null_rule!(set, "date_sk");
  let set = not_null_rule!(set, "time_sk");
  let set = not_null_rule!(set, "total_amount");
  set.with("total_amount_positive", Action::Drop, |row| {
    row.get("total_amount").is_some_and(is_positive_amount)
  })
}
