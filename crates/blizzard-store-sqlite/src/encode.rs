//! Encoding and decoding between domain types and SQLite columns.
//!
//! Dates are stored as `YYYY-MM-DD`, timestamps as RFC 3339, booleans as
//! `0`/`1`. Enumerations use their canonical string codes.

use blizzard_core::{
  document::Locator,
  field::{FieldDefinition, FieldId},
  record::FieldValue,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;

use crate::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_date(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Value rows ──────────────────────────────────────────────────────────────

/// Number of bound parameters per value row.
pub const VALUE_COLUMNS: usize = 6;

/// The parameters of one `filing_values` / `repeating_group_values` row:
/// owner, field, verbatim text, then the typed columns.
pub fn value_row(owner: Value, value: &FieldValue) -> [Value; VALUE_COLUMNS] {
  let typed = value.value_type.typed(&value.raw);
  [
    owner,
    Value::Integer(value.field_id.0),
    Value::Text(value.raw.clone()),
    typed.numeric.map_or(Value::Null, Value::Real),
    typed
      .boolean
      .map_or(Value::Null, |b| Value::Integer(i64::from(b))),
    typed
      .date
      .map_or(Value::Null, |d| Value::Text(encode_date(d))),
  ]
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

pub struct RawFieldDefinition {
  pub field_id:    i64,
  pub locator:     String,
  pub form_type:   String,
  pub label:       String,
  pub description: String,
  pub value_type:  String,
}

pub const FIELD_DEFINITION_COLUMNS: &str =
  "field_id, locator, form_type, label, description, value_type";

impl RawFieldDefinition {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      field_id:    row.get(0)?,
      locator:     row.get(1)?,
      form_type:   row.get(2)?,
      label:       row.get(3)?,
      description: row.get(4)?,
      value_type:  row.get(5)?,
    })
  }

  pub fn into_definition(self) -> Result<FieldDefinition> {
    Ok(FieldDefinition {
      field_id:    FieldId(self.field_id),
      locator:     Locator::parse(&self.locator)?,
      form_type:   self.form_type.parse()?,
      label:       self.label,
      description: self.description,
      value_type:  self.value_type.parse()?,
    })
  }
}

pub struct RawStoredValue {
  pub field_id:      i64,
  pub locator:       String,
  pub text_value:    String,
  pub numeric_value: Option<f64>,
  pub boolean_value: Option<bool>,
  pub date_value:    Option<String>,
}

impl RawStoredValue {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      field_id:      row.get(0)?,
      locator:       row.get(1)?,
      text_value:    row.get(2)?,
      numeric_value: row.get(3)?,
      boolean_value: row.get(4)?,
      date_value:    row.get(5)?,
    })
  }
}

pub struct RawStoredGroup {
  pub group_id:        i64,
  pub parent_group_id: Option<i64>,
  pub name:            String,
  pub locator:         String,
  pub ordinal:         u32,
}

impl RawStoredGroup {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:        row.get(0)?,
      parent_group_id: row.get(1)?,
      name:            row.get(2)?,
      locator:         row.get(3)?,
      ordinal:         row.get(4)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use blizzard_core::value::ValueType;

  use super::*;

  fn value(value_type: ValueType, raw: &str) -> FieldValue {
    FieldValue {
      field_id: FieldId(4),
      value_type,
      locator: Locator::parse("/Return/X").unwrap(),
      raw: raw.to_owned(),
    }
  }

  #[test]
  fn typed_columns_follow_declared_type() {
    let row = value_row(Value::Integer(1), &value(ValueType::Numeric, "1,200"));
    assert_eq!(row[2], Value::Text("1,200".into()));
    assert_eq!(row[3], Value::Real(1200.0));
    assert_eq!(row[4], Value::Null);

    let row = value_row(Value::Integer(1), &value(ValueType::Boolean, "X"));
    assert_eq!(row[4], Value::Integer(1));

    let row = value_row(Value::Integer(1), &value(ValueType::Date, "12/31/2020"));
    assert_eq!(row[5], Value::Text("2020-12-31".into()));
  }

  #[test]
  fn rejected_values_keep_only_text() {
    let row = value_row(Value::Integer(1), &value(ValueType::Numeric, "N/A"));
    assert_eq!(row[2], Value::Text("N/A".into()));
    assert_eq!(&row[3..], &[Value::Null, Value::Null, Value::Null]);
  }
}
