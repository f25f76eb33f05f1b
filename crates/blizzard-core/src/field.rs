//! Field definitions: the durable meaning of one locator within a form type.

use serde::{Deserialize, Serialize};

use crate::{document::Locator, filing::FormType, value::ValueType};

/// Stable identifier assigned by the store on first sight of a locator.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FieldId(pub i64);

impl std::fmt::Display for FieldId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// The uniqueness key of a field definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
  pub locator:   Locator,
  pub form_type: FormType,
}

impl FieldKey {
  pub fn new(locator: Locator, form_type: FormType) -> Self {
    Self { locator, form_type }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
  pub field_id:    FieldId,
  pub locator:     Locator,
  pub form_type:   FormType,
  pub label:       String,
  pub description: String,
  pub value_type:  ValueType,
}

impl FieldDefinition {
  pub fn key(&self) -> FieldKey {
    FieldKey::new(self.locator.clone(), self.form_type)
  }
}

/// A definition not yet persisted. The store assigns the [`FieldId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFieldDefinition {
  pub key:         FieldKey,
  pub label:       String,
  pub description: String,
  pub value_type:  ValueType,
}

impl NewFieldDefinition {
  /// Build a definition from the first value observed at `key`. The label is
  /// the element's own name and the description the full locator.
  pub fn infer(key: FieldKey, first_value: &str) -> Self {
    Self {
      label: key.locator.leaf().to_owned(),
      description: key.locator.to_string(),
      value_type: ValueType::classify(first_value),
      key,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn infer_labels_from_locator() {
    let key = FieldKey::new(
      Locator::parse("/Return/ReturnData/IRS990/TotalRevenueAmt").unwrap(),
      FormType::Form990,
    );
    let def = NewFieldDefinition::infer(key, "12,500");

    assert_eq!(def.label, "TotalRevenueAmt");
    assert_eq!(def.description, "/Return/ReturnData/IRS990/TotalRevenueAmt");
    assert_eq!(def.value_type, ValueType::Numeric);
  }
}
