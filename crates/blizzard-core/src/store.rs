//! Persistence traits implemented by storage backends (e.g.
//! `blizzard-store-sqlite`).
//!
//! The core reaches the store only through these traits, so it has no
//! database dependency. All methods return `Send` futures so implementations
//! can be shared across worker tasks in a multi-threaded runtime.

use std::future::Future;

use crate::{
  field::{FieldDefinition, FieldId, FieldKey, NewFieldDefinition},
  outcome::LoadOutcome,
  record::NormalizedRecordSet,
};

/// Backend errors that know whether retrying could help.
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  /// Busy database, pool exhaustion, lost connection.
  fn is_transient(&self) -> bool;
}

// ─── Field definitions ───────────────────────────────────────────────────────

/// Durable home of the shared field-definition schema.
pub trait DefinitionStore: Send + Sync {
  type Error: StoreFailure;

  /// All known definitions, used to warm the resolver cache at startup.
  fn load_definitions(
    &self,
  ) -> impl Future<Output = Result<Vec<FieldDefinition>, Self::Error>> + Send + '_;

  /// The definition for `key`, if one exists.
  fn fetch_definition<'a>(
    &'a self,
    key: &'a FieldKey,
  ) -> impl Future<Output = Result<Option<FieldDefinition>, Self::Error>> + Send + 'a;

  /// Insert `definition` unless one with the same key exists, and return
  /// whichever definition is durable afterwards. Concurrent callers with the
  /// same key all observe the same [`FieldId`].
  fn insert_or_fetch(
    &self,
    definition: NewFieldDefinition,
  ) -> impl Future<Output = Result<FieldDefinition, Self::Error>> + Send + '_;

  /// Widen a definition's type to text and return the stored result.
  fn widen_to_text(
    &self,
    field_id: FieldId,
  ) -> impl Future<Output = Result<FieldDefinition, Self::Error>> + Send + '_;
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Persists one filing atomically.
pub trait FilingLoader: Send + Sync {
  type Error: StoreFailure;

  /// Write the whole record set in one transaction, or nothing. A filing
  /// whose identifier already exists yields [`LoadOutcome::AlreadyLoaded`].
  fn load(
    &self,
    records: NormalizedRecordSet,
  ) -> impl Future<Output = Result<LoadOutcome, Self::Error>> + Send + '_;
}
