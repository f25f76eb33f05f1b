//! One document, start to finish: read, detect, transform, load.

use std::path::PathBuf;

use blizzard_core::{
  Error as CoreError,
  detect::{Detector, DetectorConfig},
  document::Document,
  filing::FormType,
  outcome::{DocumentOutcome, LoadOutcome},
  record::SchemaWarning,
  resolve::Resolver,
  store::{DefinitionStore, FilingLoader},
  transform::Transformer,
};
use tracing::{debug, error, info};

use crate::concordance::Concordance;

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum DocumentSource {
  Parsed(Document),
  /// Read and parsed on the worker.
  File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct InputDocument {
  /// Reported back on the document's outcome.
  pub id:     String,
  pub source: DocumentSource,
}

impl InputDocument {
  pub fn parsed(id: impl Into<String>, document: Document) -> Self {
    Self { id: id.into(), source: DocumentSource::Parsed(document) }
  }

  /// A file input identified by its path.
  pub fn file(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    Self {
      id:     path.display().to_string(),
      source: DocumentSource::File(path),
    }
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// The per-document stages, sharing one resolver cache across documents.
pub struct Pipeline<S> {
  resolver: Resolver<S>,
  detector: Detector,
}

impl<S> Pipeline<S>
where
  S: DefinitionStore + FilingLoader,
{
  /// Build a pipeline over `store`, preloading known field definitions.
  pub async fn open(store: S, detector: DetectorConfig) -> crate::Result<Self> {
    let resolver = Resolver::warm(store).await?;
    debug!(definitions = resolver.len(), "resolver cache warmed");
    Ok(Self { resolver, detector: Detector::new(detector) })
  }

  /// Seed `store` with a concordance's definitions, then [`open`] over it.
  /// Seeded definitions win over anything inferred from documents later.
  ///
  /// [`open`]: Pipeline::open
  pub async fn seeded(
    store: S,
    detector: DetectorConfig,
    concordance: &Concordance,
  ) -> crate::Result<Self> {
    let seeded = concordance.seed(&store).await?;
    info!(definitions = seeded, "field definitions seeded from concordance");
    Self::open(store, detector).await
  }

  pub fn store(&self) -> &S { self.resolver.store() }

  pub fn resolver(&self) -> &Resolver<S> { &self.resolver }

  /// Process one document. Never fails: every error becomes the outcome.
  pub async fn process(&self, input: InputDocument) -> DocumentOutcome {
    let InputDocument { id, source } = input;
    match self.run(source).await {
      Ok((outcome, warnings)) => {
        if let LoadOutcome::AlreadyLoaded { filing_id } = &outcome {
          info!(document = %id, %filing_id, "filing already loaded, skipped");
        }
        DocumentOutcome::loaded(id, &outcome, warnings)
      }
      Err(e) => {
        let kind = e.kind();
        error!(document = %id, %kind, error = %e, "document failed");
        DocumentOutcome::failed(id, kind, e.to_string())
      }
    }
  }

  async fn run(
    &self,
    source: DocumentSource,
  ) -> blizzard_core::Result<(LoadOutcome, Vec<SchemaWarning>)> {
    let doc = match source {
      DocumentSource::Parsed(doc) => doc,
      DocumentSource::File(path) => {
        match tokio::task::spawn_blocking(move || blizzard_xml::parse_file(&path))
          .await
        {
          Ok(parsed) => parsed?,
          Err(e) => {
            return Err(CoreError::malformed(format!("reader task failed: {e}")));
          }
        }
      }
    };

    let form_type = FormType::from_document(&doc)?;
    let forest = self.detector.detect(&doc, form_type);
    let records = Transformer::new(&self.resolver)
      .transform(&doc, &forest, form_type)
      .await?;
    let warnings = records.warnings.clone();

    let outcome = self
      .resolver
      .store()
      .load(records)
      .await
      .map_err(CoreError::store)?;
    Ok((outcome, warnings))
  }
}
