//! Builds a [`NormalizedRecordSet`] from a document and its group forest.

use std::collections::HashMap;

use tracing::warn;

use crate::{
  Error, Result,
  detect::{GroupForest, ScalarField},
  document::{Document, Locator},
  filing::{FilingHeader, FormType},
  record::{FieldValue, GroupRecord, NormalizedRecordSet, SchemaWarning},
  resolve::Resolver,
  store::DefinitionStore,
};

pub struct Transformer<'a, S> {
  resolver: &'a Resolver<S>,
}

impl<'a, S: DefinitionStore> Transformer<'a, S> {
  pub fn new(resolver: &'a Resolver<S>) -> Self { Self { resolver } }

  /// Extract the header, then resolve every scalar field of the root and of
  /// each group instance. Groups mirror `forest` in shape and order.
  ///
  /// Fails with [`Error::MalformedDocument`] before resolving anything if the
  /// header is incomplete, so no definitions are registered for documents
  /// that cannot load.
  pub async fn transform(
    &self,
    doc: &Document,
    forest: &GroupForest,
    form_type: FormType,
  ) -> Result<NormalizedRecordSet> {
    let (header, organization) = FilingHeader::extract(doc)?;
    if header.form_type != form_type {
      return Err(Error::malformed(format!(
        "document declares form {} but was routed as {form_type}",
        header.form_type
      )));
    }

    let mut warnings = Vec::new();
    let values = self
      .resolve_scope(forest.root_fields(), form_type, &mut warnings)
      .await?;

    let mut groups = Vec::with_capacity(forest.len());
    for (ordinal, instance) in forest.instances().iter().enumerate() {
      let values = self
        .resolve_scope(&instance.fields, form_type, &mut warnings)
        .await?;
      groups.push(GroupRecord {
        id: instance.id,
        parent: instance.parent,
        name: instance.name.clone(),
        locator: instance.locator.clone(),
        ordinal: ordinal as u32,
        values,
      });
    }

    Ok(NormalizedRecordSet {
      header,
      organization,
      values,
      groups,
      warnings,
    })
  }

  /// Resolve one scope's fields. A locator seen twice in the same scope keeps
  /// its first value.
  async fn resolve_scope(
    &self,
    fields: &[ScalarField],
    form_type: FormType,
    warnings: &mut Vec<SchemaWarning>,
  ) -> Result<Vec<FieldValue>> {
    let mut seen: HashMap<&Locator, &str> = HashMap::new();
    let mut values = Vec::with_capacity(fields.len());

    for field in fields {
      if let Some(kept) = seen.get(&field.locator) {
        warn!(
          locator = %field.locator,
          kept = %kept,
          dropped = %field.value,
          "schema conflict: repeated singular field"
        );
        warnings.push(SchemaWarning::DuplicateField {
          locator: field.locator.clone(),
          kept:    (*kept).to_owned(),
          dropped: field.value.clone(),
        });
        continue;
      }
      seen.insert(&field.locator, &field.value);

      let resolution = self
        .resolver
        .resolve(&field.locator, form_type, &field.value)
        .await?;
      warnings.extend(resolution.conflict);
      values.push(FieldValue {
        field_id:   resolution.field_id,
        value_type: resolution.value_type,
        locator:    field.locator.clone(),
        raw:        field.value.clone(),
      });
    }

    Ok(values)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detect::{Detector, DetectorConfig, detect},
    document::Element,
    test_helpers::{
      MemoryDefinitions, grant, header_only, nested_doc, return_doc,
    },
    value::ValueType,
  };

  #[tokio::test]
  async fn record_set_mirrors_forest() {
    let doc = nested_doc(3);
    let forest = detect(&doc, FormType::Form990);
    let resolver = Resolver::new(MemoryDefinitions::default());

    let records = Transformer::new(&resolver)
      .transform(&doc, &forest, FormType::Form990)
      .await
      .unwrap();

    assert_eq!(records.filing_id(), "123456789_2020-12-31_990");
    assert_eq!(records.groups.len(), forest.len());
    for (group, instance) in records.groups.iter().zip(forest.instances()) {
      assert_eq!(group.id, instance.id);
      assert_eq!(group.parent, instance.parent);
      assert_eq!(group.values.len(), instance.fields.len());
    }
    // Every instance's Amt shares one field identifier.
    let ids: std::collections::HashSet<_> = records
      .groups
      .iter()
      .filter(|g| g.locator.depth() == 3)
      .map(|g| g.values[0].field_id)
      .collect();
    assert_eq!(ids.len(), 1);
    assert!(records.warnings.is_empty());
  }

  #[tokio::test]
  async fn values_are_kept_verbatim() {
    let doc = return_doc("1", "2020-12-31", "990", vec![
      grant("A", "$1,000"),
      grant("B", "2,000"),
    ]);
    let forest = detect(&doc, FormType::Form990);
    let resolver = Resolver::new(MemoryDefinitions::default());
    let records = Transformer::new(&resolver)
      .transform(&doc, &forest, FormType::Form990)
      .await
      .unwrap();

    let amounts: Vec<(&str, ValueType)> = records
      .groups
      .iter()
      .flat_map(|g| &g.values)
      .filter(|v| v.locator.leaf() == "CashGrantAmt")
      .map(|v| (v.raw.as_str(), v.value_type))
      .collect();
    assert_eq!(amounts, [
      ("$1,000", ValueType::Numeric),
      ("2,000", ValueType::Numeric)
    ]);
  }

  #[tokio::test]
  async fn missing_header_fails_before_resolving() {
    let doc = header_only(None, Some("2020-12-31"), Some("990"));
    let forest = detect(&doc, FormType::Form990);
    let resolver = Resolver::new(MemoryDefinitions::default());

    let err = Transformer::new(&resolver)
      .transform(&doc, &forest, FormType::Form990)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));
    assert_eq!(resolver.store().calls(), 0);
  }

  #[tokio::test]
  async fn form_type_mismatch_is_malformed() {
    let doc = return_doc("1", "2020-12-31", "990EZ", vec![]);
    let forest = detect(&doc, FormType::Form990);
    let resolver = Resolver::new(MemoryDefinitions::default());

    let err = Transformer::new(&resolver)
      .transform(&doc, &forest, FormType::Form990)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));
  }

  #[tokio::test]
  async fn repeated_singular_field_keeps_first_value() {
    let mut doc = return_doc("1", "2020-12-31", "990", vec![]);
    // Two siblings stay singular under a threshold of three.
    doc.root.children[1] = Element::new("ReturnData")
      .with_child(Element::leaf("WebsiteAddressTxt", "a.org"))
      .with_child(Element::leaf("WebsiteAddressTxt", "b.org"));
    let forest = Detector::new(DetectorConfig { min_repeat: 3 })
      .detect(&doc, FormType::Form990);
    let resolver = Resolver::new(MemoryDefinitions::default());

    let records = Transformer::new(&resolver)
      .transform(&doc, &forest, FormType::Form990)
      .await
      .unwrap();

    let sites: Vec<&str> = records
      .values
      .iter()
      .filter(|v| v.locator.leaf() == "WebsiteAddressTxt")
      .map(|v| v.raw.as_str())
      .collect();
    assert_eq!(sites, ["a.org"]);
    assert!(matches!(
      records.warnings.as_slice(),
      [SchemaWarning::DuplicateField { dropped, .. }] if dropped == "b.org"
    ));
  }
}
