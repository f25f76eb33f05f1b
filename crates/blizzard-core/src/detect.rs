//! Repeating group detection.
//!
//! Repetition is decided locally: under one parent, children sharing a name
//! are a repeating group when there are at least `min_repeat` of them. The
//! same name may therefore repeat in one place and be singular in another.
//!
//! The result is a [`GroupForest`]: an arena of [`GroupInstance`]s in document
//! preorder, so a parent always precedes its children and parent links are
//! plain indices into the same arena.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  document::{Document, Element, Locator},
  filing::FormType,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// Index of a group instance within its [`GroupForest`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupInstanceId(usize);

impl GroupInstanceId {
  pub fn index(self) -> usize { self.0 }
}

/// A leaf value attached to the root or to a group instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarField {
  pub locator: Locator,
  pub value:   String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInstance {
  pub id:       GroupInstanceId,
  pub parent:   Option<GroupInstanceId>,
  pub name:     String,
  /// Locator pattern shared by every instance of this group.
  pub locator:  Locator,
  /// Immediate scalar fields, in document order.
  pub fields:   Vec<ScalarField>,
  /// Immediate child instances, in document order.
  pub children: Vec<GroupInstanceId>,
}

/// An abstract repeating structure: one per distinct group locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefinition {
  pub locator:   Locator,
  pub name:      String,
  pub form_type: FormType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupForest {
  form_type:   FormType,
  instances:   Vec<GroupInstance>,
  roots:       Vec<GroupInstanceId>,
  root_fields: Vec<ScalarField>,
}

impl GroupForest {
  pub fn form_type(&self) -> FormType { self.form_type }

  /// All instances in preorder.
  pub fn instances(&self) -> &[GroupInstance] { &self.instances }

  pub fn instance(&self, id: GroupInstanceId) -> &GroupInstance {
    &self.instances[id.0]
  }

  pub fn roots(&self) -> &[GroupInstanceId] { &self.roots }

  /// Fields outside any repeating context.
  pub fn root_fields(&self) -> &[ScalarField] { &self.root_fields }

  pub fn len(&self) -> usize { self.instances.len() }

  pub fn is_empty(&self) -> bool { self.instances.is_empty() }

  /// Ancestors of `id`, nearest first.
  pub fn ancestors(
    &self,
    id: GroupInstanceId,
  ) -> impl Iterator<Item = &GroupInstance> + '_ {
    std::iter::successors(self.instance(id).parent, |p| {
      self.instance(*p).parent
    })
    .map(|p| self.instance(p))
  }

  /// Number of ancestors; root-level instances have depth 0.
  pub fn depth(&self, id: GroupInstanceId) -> usize {
    self.ancestors(id).count()
  }

  /// Distinct group definitions in order of first appearance.
  pub fn definitions(&self) -> Vec<GroupDefinition> {
    let mut seen = std::collections::HashSet::new();
    self
      .instances
      .iter()
      .filter(|i| seen.insert(&i.locator))
      .map(|i| GroupDefinition {
        locator:   i.locator.clone(),
        name:      i.name.clone(),
        form_type: self.form_type,
      })
      .collect()
  }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// Minimum sibling count for a name to be treated as repeating.
  pub min_repeat: usize,
}

impl Default for DetectorConfig {
  fn default() -> Self { Self { min_repeat: 2 } }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Detector {
  config: DetectorConfig,
}

impl Detector {
  /// Thresholds below two are raised to two: a lone element is never a group.
  pub fn new(config: DetectorConfig) -> Self {
    Self {
      config: DetectorConfig { min_repeat: config.min_repeat.max(2) },
    }
  }

  pub fn min_repeat(&self) -> usize { self.config.min_repeat }

  pub fn detect(&self, doc: &Document, form_type: FormType) -> GroupForest {
    let mut forest = GroupForest {
      form_type,
      instances: Vec::new(),
      roots: Vec::new(),
      root_fields: Vec::new(),
    };
    self.visit(&doc.root, &doc.root_locator(), None, &mut forest);
    forest
  }

  fn visit(
    &self,
    element: &Element,
    locator: &Locator,
    scope: Option<GroupInstanceId>,
    forest: &mut GroupForest,
  ) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for child in &element.children {
      *counts.entry(child.name.as_str()).or_default() += 1;
    }

    for child in &element.children {
      let child_locator = locator.child(&child.name);
      let repeating = counts[child.name.as_str()] >= self.config.min_repeat;

      if repeating {
        let id = GroupInstanceId(forest.instances.len());
        forest.instances.push(GroupInstance {
          id,
          parent: scope,
          name: child.name.clone(),
          locator: child_locator.clone(),
          fields: Vec::new(),
          children: Vec::new(),
        });
        match scope {
          Some(parent) => forest.instances[parent.0].children.push(id),
          None => forest.roots.push(id),
        }

        if child.is_leaf() {
          push_field(forest, Some(id), child_locator, child);
        } else {
          self.visit(child, &child_locator, Some(id), forest);
        }
      } else if child.is_leaf() {
        push_field(forest, scope, child_locator, child);
      } else {
        self.visit(child, &child_locator, scope, forest);
      }
    }
  }
}

fn push_field(
  forest: &mut GroupForest,
  scope: Option<GroupInstanceId>,
  locator: Locator,
  element: &Element,
) {
  let Some(value) = element.text() else { return };
  let field = ScalarField { locator, value: value.to_owned() };
  match scope {
    Some(id) => forest.instances[id.0].fields.push(field),
    None => forest.root_fields.push(field),
  }
}

/// Detect with the default configuration.
pub fn detect(doc: &Document, form_type: FormType) -> GroupForest {
  Detector::default().detect(doc, form_type)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_helpers::{grant, nested_doc, return_doc};

  fn locators(fields: &[ScalarField]) -> Vec<&str> {
    fields.iter().map(|f| f.locator.as_str()).collect()
  }

  #[test]
  fn single_sibling_folds_into_enclosing_scope() {
    let doc = return_doc("1", "2020-12-31", "990", vec![grant("A", "100")]);
    let forest = detect(&doc, FormType::Form990);

    assert!(forest.is_empty());
    assert!(locators(forest.root_fields()).contains(
      &"/Return/ReturnData/IRS990ScheduleI/RecipientTable/RecipientBusinessName"
    ));
  }

  #[test]
  fn repeated_siblings_become_instances_in_document_order() {
    let doc = return_doc(
      "1",
      "2020-12-31",
      "990",
      vec![grant("A", "100"), grant("B", "200"), grant("C", "300")],
    );
    let forest = detect(&doc, FormType::Form990);

    assert_eq!(forest.len(), 3);
    assert_eq!(forest.roots().len(), 3);
    let amounts: Vec<&str> = forest
      .instances()
      .iter()
      .map(|i| {
        i.fields
          .iter()
          .find(|f| f.locator.leaf() == "CashGrantAmt")
          .map(|f| f.value.as_str())
          .unwrap()
      })
      .collect();
    assert_eq!(amounts, ["100", "200", "300"]);

    let defs = forest.definitions();
    assert_eq!(defs.len(), 1);
    assert_eq!(
      defs[0].locator.as_str(),
      "/Return/ReturnData/IRS990ScheduleI/RecipientTable"
    );
    // Header fields stay at the root.
    assert!(
      locators(forest.root_fields()).contains(&"/Return/ReturnHeader/Filer/EIN")
    );
  }

  #[test]
  fn nested_groups_have_parent_chains_of_depth_minus_one() {
    let doc = nested_doc(3);
    let forest = detect(&doc, FormType::Form990);

    // 2 + 4 + 8 instances across three nested levels.
    assert_eq!(forest.len(), 14);
    for instance in forest.instances() {
      let level = instance.locator.segments().filter(|s| *s == "Level").count();
      assert_eq!(forest.depth(instance.id), level - 1);
      if let Some(parent) = instance.parent {
        assert!(parent < instance.id, "parents precede children");
        assert!(forest.instance(parent).children.contains(&instance.id));
      }
    }
    let deepest = forest.instances().last().unwrap();
    assert_eq!(forest.ancestors(deepest.id).count(), 2);
  }

  #[test]
  fn repeated_leaves_carry_their_own_text() {
    let doc = Document::new(
      Element::new("Return").with_child(
        Element::new("ReturnData")
          .with_child(Element::leaf("ActivityCd", "A1"))
          .with_child(Element::leaf("ActivityCd", "B2")),
      ),
    );
    let forest = detect(&doc, FormType::Form990);

    assert_eq!(forest.len(), 2);
    let first = &forest.instances()[0];
    assert_eq!(first.fields.len(), 1);
    assert_eq!(first.fields[0].locator, first.locator);
    assert_eq!(first.fields[0].value, "A1");
  }

  #[test]
  fn same_name_can_repeat_in_one_context_only() {
    let doc = Document::new(
      Element::new("Return")
        .with_child(Element::new("Part").with_child(Element::leaf("Item", "x")))
        .with_child(
          Element::new("Other")
            .with_child(Element::leaf("Item", "y"))
            .with_child(Element::leaf("Item", "z")),
        ),
    );
    let forest = detect(&doc, FormType::Form990);

    assert_eq!(locators(forest.root_fields()), ["/Return/Part/Item"]);
    assert_eq!(forest.len(), 2);
    assert!(
      forest
        .instances()
        .iter()
        .all(|i| i.locator.as_str() == "/Return/Other/Item")
    );
  }

  #[test]
  fn higher_threshold_keeps_pairs_flat() {
    let doc = return_doc(
      "1",
      "2020-12-31",
      "990",
      vec![grant("A", "100"), grant("B", "200")],
    );
    let forest = Detector::new(DetectorConfig { min_repeat: 3 })
      .detect(&doc, FormType::Form990);
    assert!(forest.is_empty());

    let clamped = Detector::new(DetectorConfig { min_repeat: 1 });
    assert_eq!(clamped.min_repeat(), 2);
  }

  #[test]
  fn empty_leaves_produce_no_fields() {
    let doc = Document::new(
      Element::new("Return")
        .with_child(Element::leaf("Blank", "  "))
        .with_child(Element::new("Empty")),
    );
    let forest = detect(&doc, FormType::Form990);
    assert!(forest.root_fields().is_empty());
  }

  #[test]
  fn detection_is_deterministic() {
    let doc = nested_doc(3);
    assert_eq!(
      detect(&doc, FormType::Form990),
      detect(&doc, FormType::Form990)
    );
  }
}
