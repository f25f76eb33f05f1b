//! The field definition resolver.
//!
//! Maps `(locator, form type)` to a stable [`FieldId`]. Known definitions are
//! served from a process-wide cache without I/O. Misses go to the store's
//! insert-or-fetch, so concurrent first sightings of one locator converge on
//! the same durable identifier without a global lock; only the cache update
//! itself takes the write lock.

use std::collections::{HashMap, hash_map::Entry};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  document::Locator,
  field::{FieldDefinition, FieldId, FieldKey, NewFieldDefinition},
  filing::FormType,
  record::SchemaWarning,
  store::DefinitionStore,
  value::ValueType,
};

/// The identifier and declared type a value should be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub field_id:   FieldId,
  pub value_type: ValueType,
  /// Set when this value widened the definition to text.
  pub conflict:   Option<SchemaWarning>,
}

pub struct Resolver<S> {
  store: S,
  cache: RwLock<HashMap<FieldKey, FieldDefinition>>,
}

impl<S: DefinitionStore> Resolver<S> {
  /// A resolver with an empty cache.
  pub fn new(store: S) -> Self {
    Self { store, cache: RwLock::new(HashMap::new()) }
  }

  /// A resolver whose cache is populated with every stored definition.
  pub async fn warm(store: S) -> Result<Self> {
    let definitions = store.load_definitions().await.map_err(Error::store)?;
    debug!(count = definitions.len(), "warmed field definition cache");
    let cache = definitions.into_iter().map(|d| (d.key(), d)).collect();
    Ok(Self { store, cache: RwLock::new(cache) })
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn cached(&self, key: &FieldKey) -> Option<FieldDefinition> {
    self.cache.read().get(key).cloned()
  }

  /// Number of cached definitions.
  pub fn len(&self) -> usize { self.cache.read().len() }

  pub fn is_empty(&self) -> bool { self.cache.read().is_empty() }

  /// Resolve the field for `value` observed at `locator`.
  ///
  /// New definitions take their type from `value`. A value the declared type
  /// rejects widens the definition to text, durably and once.
  pub async fn resolve(
    &self,
    locator: &Locator,
    form_type: FormType,
    value: &str,
  ) -> Result<Resolution> {
    let key = FieldKey::new(locator.clone(), form_type);
    let definition = match self.cached(&key) {
      Some(definition) => definition,
      None => self.fetch_or_create(key, value).await?,
    };

    if definition.value_type.accepts(value) {
      return Ok(Resolution {
        field_id:   definition.field_id,
        value_type: definition.value_type,
        conflict:   None,
      });
    }

    let from = definition.value_type;
    let widened = self
      .store
      .widen_to_text(definition.field_id)
      .await
      .map_err(Error::store)?;
    warn!(
      field_id = %widened.field_id,
      %locator,
      %from,
      value,
      "schema conflict: field widened to text"
    );
    let resolution = Resolution {
      field_id:   widened.field_id,
      value_type: widened.value_type,
      conflict:   Some(SchemaWarning::TypeWidened {
        locator: locator.clone(),
        from,
        value: value.to_owned(),
      }),
    };
    self.remember(widened);
    Ok(resolution)
  }

  async fn fetch_or_create(
    &self,
    key: FieldKey,
    first_value: &str,
  ) -> Result<FieldDefinition> {
    let existing =
      self.store.fetch_definition(&key).await.map_err(Error::store)?;
    let definition = match existing {
      Some(definition) => definition,
      None => self
        .store
        .insert_or_fetch(NewFieldDefinition::infer(key, first_value))
        .await
        .map_err(Error::store)?,
    };
    debug!(
      field_id = %definition.field_id,
      locator = %definition.locator,
      value_type = %definition.value_type,
      "resolved field definition"
    );
    Ok(self.remember(definition))
  }

  /// Cache `definition` and return the entry now cached. Widening is
  /// one-way: a cached text definition is never replaced by a narrower one
  /// read before the widening landed.
  fn remember(&self, definition: FieldDefinition) -> FieldDefinition {
    let mut cache = self.cache.write();
    match cache.entry(definition.key()) {
      Entry::Occupied(entry)
        if entry.get().value_type == ValueType::Text
          && definition.value_type != ValueType::Text =>
      {
        entry.get().clone()
      }
      Entry::Occupied(mut entry) => {
        entry.insert(definition.clone());
        definition
      }
      Entry::Vacant(entry) => entry.insert(definition).clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::test_helpers::MemoryDefinitions;

  fn loc(s: &str) -> Locator { Locator::parse(s).unwrap() }

  #[tokio::test]
  async fn cache_hit_performs_no_io() {
    let resolver = Resolver::new(MemoryDefinitions::default());
    let a = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "10")
      .await
      .unwrap();
    let b = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "20")
      .await
      .unwrap();

    assert_eq!(a.field_id, b.field_id);
    assert_eq!(a.value_type, ValueType::Numeric);
    assert_eq!(resolver.store().calls(), 2, "one fetch and one insert");
  }

  #[tokio::test]
  async fn form_type_is_part_of_the_key() {
    let resolver = Resolver::new(MemoryDefinitions::default());
    let a = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "10")
      .await
      .unwrap();
    let b = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990Ez, "10")
      .await
      .unwrap();
    assert_ne!(a.field_id, b.field_id);
  }

  #[tokio::test]
  async fn conflicting_value_widens_to_text_once() {
    let resolver = Resolver::new(MemoryDefinitions::default());
    resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "1200")
      .await
      .unwrap();
    let widened = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "N/A")
      .await
      .unwrap();

    assert_eq!(widened.value_type, ValueType::Text);
    assert!(matches!(
      widened.conflict,
      Some(SchemaWarning::TypeWidened { from: ValueType::Numeric, .. })
    ));

    // Text accepts everything from now on.
    let later = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "1300")
      .await
      .unwrap();
    assert_eq!(later.value_type, ValueType::Text);
    assert!(later.conflict.is_none());
  }

  #[tokio::test]
  async fn stale_reads_never_narrow_a_widened_field() {
    let resolver = Resolver::new(MemoryDefinitions::default());
    let numeric = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "1200")
      .await
      .unwrap();
    let stale = resolver
      .cached(&FieldKey::new(loc("/Return/Amt"), FormType::Form990))
      .unwrap();
    resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "N/A")
      .await
      .unwrap();

    // Another worker's fetch finishing late, with the pre-widening row.
    let kept = resolver.remember(stale);
    assert_eq!(kept.value_type, ValueType::Text);
    assert_eq!(kept.field_id, numeric.field_id);

    let later = resolver
      .resolve(&loc("/Return/Amt"), FormType::Form990, "pending")
      .await
      .unwrap();
    assert_eq!(later.value_type, ValueType::Text);
    assert!(later.conflict.is_none(), "widened a second time");
  }

  #[tokio::test]
  async fn warm_resolver_reuses_stored_identifiers() {
    let store = MemoryDefinitions::default();
    let first = Resolver::new(store.clone())
      .resolve(&loc("/Return/Flag"), FormType::Form990, "X")
      .await
      .unwrap();

    let resolver = Resolver::warm(store).await.unwrap();
    assert_eq!(resolver.len(), 1);
    let second = resolver
      .resolve(&loc("/Return/Flag"), FormType::Form990, "X")
      .await
      .unwrap();
    assert_eq!(first.field_id, second.field_id);
    assert_eq!(second.value_type, ValueType::Boolean);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_first_sightings_converge() {
    let resolver = Arc::new(Resolver::new(MemoryDefinitions::default()));
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
      let resolver = resolver.clone();
      tasks.spawn(async move {
        resolver
          .resolve(&loc("/Return/New"), FormType::Form990, "abc")
          .await
          .unwrap()
          .field_id
      });
    }

    let mut ids = Vec::new();
    while let Some(id) = tasks.join_next().await {
      ids.push(id.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(resolver.store().definition_count(), 1);
  }
}
