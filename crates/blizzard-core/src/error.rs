//! Error types for `blizzard-core`.

use thiserror::Error;

use crate::{outcome::OutcomeKind, store::StoreFailure};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  /// A required header locator is missing or its value is unusable.
  #[error("malformed document: {0}")]
  MalformedDocument(String),

  #[error("unknown form type: {0:?}")]
  UnknownFormType(String),

  #[error("invalid locator: {0:?}")]
  InvalidLocator(String),

  #[error("unknown value type: {0:?}")]
  UnknownValueType(String),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// Store failure that may succeed if retried (busy database, pool
  /// exhaustion, lost connection).
  #[error("transient store failure: {0}")]
  TransientStore(#[source] BoxError),

  #[error("store failure: {0}")]
  FatalStore(#[source] BoxError),
}

impl Error {
  /// Wrap a backend error, keeping its transient/fatal classification.
  pub fn store<E: StoreFailure>(error: E) -> Self {
    if error.is_transient() {
      Self::TransientStore(Box::new(error))
    } else {
      Self::FatalStore(Box::new(error))
    }
  }

  pub fn malformed(message: impl Into<String>) -> Self {
    Self::MalformedDocument(message.into())
  }

  /// The outcome a document receives when its pipeline fails with `self`.
  pub fn kind(&self) -> OutcomeKind {
    match self {
      Self::TransientStore(_) => OutcomeKind::TransientStoreFailure,
      Self::FatalStore(_) | Self::InvalidConfig(_) => {
        OutcomeKind::FatalStoreFailure
      }
      Self::MalformedDocument(_)
      | Self::UnknownFormType(_)
      | Self::InvalidLocator(_)
      | Self::UnknownValueType(_) => OutcomeKind::MalformedDocument,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
