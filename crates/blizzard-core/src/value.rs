//! Value typing for field definitions.
//!
//! Every field definition carries one [`ValueType`] inferred from the first
//! value seen at its locator. Values are always kept verbatim; the type only
//! decides which typed store column is filled alongside the text.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Case-insensitive literals accepted as booleans on first sight.
const BOOLEAN_TRUE: &[&str] = &["true", "yes", "t", "y", "x"];
const BOOLEAN_FALSE: &[&str] = &["false", "no", "f", "n"];

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  #[default]
  Text,
  Numeric,
  Boolean,
  Date,
}

impl ValueType {
  /// Infer a type from a single value: numeric, then boolean, then date,
  /// falling back to text.
  pub fn classify(raw: &str) -> Self {
    if parse_numeric(raw).is_some() {
      Self::Numeric
    } else if is_boolean_literal(raw) {
      Self::Boolean
    } else if parse_date(raw).is_some() {
      Self::Date
    } else {
      Self::Text
    }
  }

  /// Whether `raw` is a valid value of this type.
  pub fn accepts(self, raw: &str) -> bool {
    match self {
      Self::Text => true,
      Self::Numeric => parse_numeric(raw).is_some(),
      Self::Boolean => parse_boolean(raw).is_some(),
      Self::Date => parse_date(raw).is_some(),
    }
  }

  /// The typed column values for `raw` under this type. Values the type does
  /// not accept produce an empty [`TypedColumns`].
  pub fn typed(self, raw: &str) -> TypedColumns {
    match self {
      Self::Text => TypedColumns::default(),
      Self::Numeric => TypedColumns {
        numeric: parse_numeric(raw),
        ..TypedColumns::default()
      },
      Self::Boolean => TypedColumns {
        boolean: parse_boolean(raw),
        ..TypedColumns::default()
      },
      Self::Date => TypedColumns {
        date: parse_date(raw),
        ..TypedColumns::default()
      },
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Text => "text",
      Self::Numeric => "numeric",
      Self::Boolean => "boolean",
      Self::Date => "date",
    }
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ValueType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "text" => Ok(Self::Text),
      "numeric" => Ok(Self::Numeric),
      "boolean" => Ok(Self::Boolean),
      "date" => Ok(Self::Date),
      other => Err(Error::UnknownValueType(other.to_owned())),
    }
  }
}

/// Typed renderings of one value, at most one of which is set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TypedColumns {
  pub numeric: Option<f64>,
  pub boolean: Option<bool>,
  pub date:    Option<NaiveDate>,
}

// ─── Parsers ─────────────────────────────────────────────────────────────────

/// A finite decimal number, ignoring thousands separators and `$`.
pub fn parse_numeric(raw: &str) -> Option<f64> {
  let cleaned: String = raw
    .trim()
    .chars()
    .filter(|c| !matches!(c, ',' | '$'))
    .collect();
  let first = cleaned.chars().next()?;
  // Rejects `inf`, `NaN` and friends, which `f64::from_str` accepts.
  if !(first.is_ascii_digit() || matches!(first, '-' | '+' | '.')) {
    return None;
  }
  cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_boolean_literal(raw: &str) -> bool {
  let lower = raw.trim().to_ascii_lowercase();
  BOOLEAN_TRUE.contains(&lower.as_str()) || BOOLEAN_FALSE.contains(&lower.as_str())
}

/// Boolean literals, plus `1`/`0` for fields already declared boolean.
pub fn parse_boolean(raw: &str) -> Option<bool> {
  let lower = raw.trim().to_ascii_lowercase();
  if lower == "1" || BOOLEAN_TRUE.contains(&lower.as_str()) {
    Some(true)
  } else if lower == "0" || BOOLEAN_FALSE.contains(&lower.as_str()) {
    Some(false)
  } else {
    None
  }
}

/// `YYYY-MM-DD`, `MM/DD/YYYY`, or an RFC 3339 timestamp (date part kept).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
    .ok()
    .or_else(|| {
      DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classify_orders_numeric_before_boolean() {
    assert_eq!(ValueType::classify("1200"), ValueType::Numeric);
    assert_eq!(ValueType::classify("1"), ValueType::Numeric);
    assert_eq!(ValueType::classify("$1,200.50"), ValueType::Numeric);
    assert_eq!(ValueType::classify("X"), ValueType::Boolean);
    assert_eq!(ValueType::classify("true"), ValueType::Boolean);
    assert_eq!(ValueType::classify("2020-12-31"), ValueType::Date);
    assert_eq!(ValueType::classify("12/31/2020"), ValueType::Date);
    assert_eq!(
      ValueType::classify("2021-05-12T10:22:33-05:00"),
      ValueType::Date
    );
    assert_eq!(ValueType::classify("N/A"), ValueType::Text);
  }

  #[test]
  fn non_finite_spellings_are_text() {
    assert_eq!(ValueType::classify("inf"), ValueType::Text);
    assert_eq!(ValueType::classify("NaN"), ValueType::Text);
    assert_eq!(ValueType::classify("Infinity"), ValueType::Text);
  }

  #[test]
  fn declared_boolean_accepts_digits() {
    assert!(ValueType::Boolean.accepts("1"));
    assert!(ValueType::Boolean.accepts("0"));
    assert!(!ValueType::Boolean.accepts("maybe"));
  }

  #[test]
  fn typed_columns_follow_declared_type() {
    let cols = ValueType::Numeric.typed("1,200");
    assert_eq!(cols.numeric, Some(1200.0));
    assert_eq!(cols.boolean, None);

    let cols = ValueType::Numeric.typed("N/A");
    assert_eq!(cols, TypedColumns::default());

    let cols = ValueType::Date.typed("2020-12-31");
    assert_eq!(cols.date, NaiveDate::from_ymd_opt(2020, 12, 31));
  }

  #[test]
  fn unknown_value_type_is_rejected() {
    assert!(matches!(
      "decimal".parse::<ValueType>(),
      Err(Error::UnknownValueType(s)) if s == "decimal"
    ));
  }
}
