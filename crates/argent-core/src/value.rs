//! Typed column values and the cast rules that produce them from raw bronze
//! JSON.
//!
//! Casts follow the lenient semantics of the upstream lakehouse platform: a
//! value that cannot be coerced is reported as a failure rather than raising,
//! and the caller decides what to do with the row.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

// ─── Semantic types ──────────────────────────────────────────────────────────

/// The target type of a silver column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
  /// 32-bit signed integer.
  Int,
  /// 64-bit float.
  Double,
  String,
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single normalised column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Int(i32),
  Double(f64),
  String(String),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_int(&self) -> Option<i32> {
    match self {
      Self::Int(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_double(&self) -> Option<f64> {
    match self {
      Self::Double(v) => Some(*v),
      Self::Int(v) => Some(f64::from(*v)),
      _ => None,
    }
  }

  /// Convert to plain JSON for display and export.
  pub fn to_json(&self) -> Json {
    match self {
      Self::Null => Json::Null,
      Self::Int(v) => Json::from(*v),
      Self::Double(v) => serde_json::Number::from_f64(*v)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(render_double(*v))),
      Self::String(s) => Json::String(s.clone()),
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Int(v) => write!(f, "{v}"),
      Self::Double(v) => f.write_str(&render_double(*v)),
      Self::String(s) => f.write_str(s),
    }
  }
}

// ─── Casting ─────────────────────────────────────────────────────────────────

/// A raw value that could not be coerced to its target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastFailure {
  pub target: SemanticType,
  pub raw:    String,
}

/// Cast a raw JSON value to `target`.
///
/// JSON `null` always casts to [`Value::Null`] and is not a failure.
pub fn cast(raw: &Json, target: SemanticType) -> Result<Value, CastFailure> {
  if raw.is_null() {
    return Ok(Value::Null);
  }
  let cast = match target {
    SemanticType::Int => cast_int(raw).map(Value::Int),
    SemanticType::Double => cast_double(raw).map(Value::Double),
    SemanticType::String => Some(Value::String(cast_string(raw))),
  };
  cast.ok_or_else(|| CastFailure { target, raw: raw.to_string() })
}

fn cast_int(raw: &Json) -> Option<i32> {
  match raw {
    Json::Number(n) => {
      if let Some(i) = n.as_i64() {
        i32::try_from(i).ok()
      } else {
        n.as_f64().and_then(truncate_to_i32)
      }
    }
    Json::String(s) => {
      let s = s.trim();
      match s.parse::<i64>() {
        Ok(i) => i32::try_from(i).ok(),
        Err(_) => parse_decimal(s).and_then(truncate_to_i32),
      }
    }
    Json::Bool(b) => Some(i32::from(*b)),
    _ => None,
  }
}

fn cast_double(raw: &Json) -> Option<f64> {
  match raw {
    Json::Number(n) => n.as_f64(),
    Json::String(s) => parse_float_literal(s.trim()),
    Json::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    _ => None,
  }
}

fn cast_string(raw: &Json) -> String {
  match raw {
    Json::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn truncate_to_i32(v: f64) -> Option<i32> {
  if !v.is_finite() {
    return None;
  }
  let t = v.trunc();
  if t < f64::from(i32::MIN) || t > f64::from(i32::MAX) {
    return None;
  }
  Some(t as i32)
}

/// Plain decimal literal: optional sign, digits, optional fraction. Rejects
/// the special float spellings that `f64::from_str` would accept.
fn parse_decimal(s: &str) -> Option<f64> {
  let body = s.strip_prefix(['-', '+']).unwrap_or(s);
  if body.is_empty()
    || !body.chars().all(|c| c.is_ascii_digit() || c == '.')
    || body.chars().filter(|c| *c == '.').count() > 1
    || !body.chars().any(|c| c.is_ascii_digit())
  {
    return None;
  }
  s.parse().ok()
}

fn parse_float_literal(s: &str) -> Option<f64> {
  match s.to_ascii_lowercase().as_str() {
    "nan" => Some(f64::NAN),
    "infinity" | "+infinity" | "inf" | "+inf" => Some(f64::INFINITY),
    "-infinity" | "-inf" => Some(f64::NEG_INFINITY),
    _ => s.parse().ok().filter(|v: &f64| v.is_finite()),
  }
}

// ─── Double rendering ────────────────────────────────────────────────────────

/// Render a double the way the lakehouse platform does when a double is
/// compared against a text pattern: plain notation with at least one
/// fractional digit for magnitudes in `[1e-3, 1e7)`, scientific notation
/// (`1.0E10`) otherwise.
pub fn render_double(v: f64) -> String {
  if v.is_nan() {
    return "NaN".to_owned();
  }
  if v.is_infinite() {
    return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
  }
  if v == 0.0 {
    return if v.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
  }

  let magnitude = v.abs();
  if (1e-3..1e7).contains(&magnitude) {
    let plain = format!("{v}");
    if plain.contains('.') { plain } else { format!("{plain}.0") }
  } else {
    let sci = format!("{v:E}");
    match sci.split_once('E') {
      Some((mantissa, exp)) if !mantissa.contains('.') => {
        format!("{mantissa}.0E{exp}")
      }
      _ => sci,
    }
  }
}
