//! Core types and the transformation engine for Blizzard.
//!
//! This crate turns a parsed filing document into a normalized
//! entity/attribute/value record set. It is deliberately free of database and
//! runtime dependencies: persistence is reached through the traits in
//! [`store`], which backends such as `blizzard-store-sqlite` implement.
//!
//! Pipeline, leaf-first:
//!   [`document::Document`]
//!     └─ [`detect::Detector`]        → [`detect::GroupForest`]
//!          └─ [`transform::Transformer`] (consults [`resolve::Resolver`])
//!               └─ [`record::NormalizedRecordSet`] → [`store::FilingLoader`]

// Native `async fn` in traits; the store traits spell out their `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod detect;
pub mod document;
pub mod error;
pub mod field;
pub mod filing;
pub mod outcome;
pub mod record;
pub mod resolve;
pub mod store;
pub mod transform;
pub mod value;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_helpers;
