//! Error type for `blizzard-etl`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] blizzard_core::Error),

  #[error("store error: {0}")]
  Store(#[from] blizzard_store_sqlite::Error),

  #[error("concordance error: {0}")]
  Concordance(#[from] csv::Error),
}

impl Error {
  pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
    Self::Core(blizzard_core::Error::InvalidConfig(message.into()))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
