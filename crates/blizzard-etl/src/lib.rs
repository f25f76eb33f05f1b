//! Batch orchestration for the Blizzard loader.
//!
//! [`Pipeline`] runs one document through detection, transformation and
//! loading. [`Orchestrator`] fans a batch of documents out over a fixed set of
//! worker tasks and folds their outcomes into a
//! [`RunReport`](blizzard_core::outcome::RunReport). A [`Concordance`] can seed
//! the field definitions before the first document is processed.

mod concordance;
mod config;
mod orchestrator;
mod pipeline;

pub mod error;

pub use concordance::{Concordance, ConcordanceEntry};
pub use config::{EtlConfig, PoolSettings};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, ShutdownHandle};
pub use pipeline::{DocumentSource, InputDocument, Pipeline};
