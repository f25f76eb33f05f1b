//! The normalized record set produced for one filing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  detect::GroupInstanceId,
  document::Locator,
  field::FieldId,
  filing::{FilingHeader, Organization},
  value::ValueType,
};

/// One resolved scalar value, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
  pub field_id:   FieldId,
  /// Declared type of the field at resolution time.
  pub value_type: ValueType,
  pub locator:    Locator,
  pub raw:        String,
}

/// One group instance and its own values. `parent` always refers to a group
/// earlier in [`NormalizedRecordSet::groups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
  pub id:      GroupInstanceId,
  pub parent:  Option<GroupInstanceId>,
  pub name:    String,
  pub locator: Locator,
  /// Position in document order within the filing.
  pub ordinal: u32,
  pub values:  Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecordSet {
  pub header:       FilingHeader,
  pub organization: Organization,
  pub values:       Vec<FieldValue>,
  /// Preorder: parents before children.
  pub groups:       Vec<GroupRecord>,
  pub warnings:     Vec<SchemaWarning>,
}

impl NormalizedRecordSet {
  pub fn filing_id(&self) -> &str { &self.header.filing_id }

  /// Number of group value rows across all instances.
  pub fn group_value_count(&self) -> usize {
    self.groups.iter().map(|g| g.values.len()).sum()
  }
}

// ─── Warnings ────────────────────────────────────────────────────────────────

/// A schema conflict resolved without failing the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaWarning {
  /// The field's declared type rejected a value and was widened to text.
  TypeWidened {
    locator: Locator,
    from:    ValueType,
    value:   String,
  },
  /// A singular field appeared more than once in one scope; the first value
  /// was kept.
  DuplicateField {
    locator: Locator,
    kept:    String,
    dropped: String,
  },
}

impl fmt::Display for SchemaWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::TypeWidened { locator, from, value } => write!(
        f,
        "{locator}: {from} field widened to text by value {value:?}"
      ),
      Self::DuplicateField { locator, kept, dropped } => write!(
        f,
        "{locator}: repeated singular field, kept {kept:?}, dropped {dropped:?}"
      ),
    }
  }
}
