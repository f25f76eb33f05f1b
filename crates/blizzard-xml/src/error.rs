//! Error types for `blizzard-xml`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("XML error: {0}")]
  Xml(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("document has no root element")]
  Empty,

  /// Input ended with elements still open.
  #[error("unclosed element <{0}>")]
  Unbalanced(String),

  #[error("more than one root element")]
  MultipleRoots,
}

impl From<quick_xml::Error> for Error {
  fn from(e: quick_xml::Error) -> Self { Self::Xml(e.to_string()) }
}

impl From<Error> for blizzard_core::Error {
  fn from(e: Error) -> Self { blizzard_core::Error::malformed(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
