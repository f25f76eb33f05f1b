//! Reads namespaced filing markup into the `blizzard-core` document tree.
//!
//! Element and attribute names are reduced to their local names, text is
//! trimmed, CDATA is treated as text, and comments and processing
//! instructions are dropped. Namespace declarations are not kept.

mod parse;

pub mod error;

pub use error::{Error, Result};
pub use parse::{parse_document, parse_file, source_digest};
