//! Per-document outcomes and the aggregate run report.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::record::SchemaWarning;

/// Classification of one document's processing result.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
  Loaded,
  /// The filing identifier was already present; nothing was written.
  DuplicateFiling,
  /// Never dispatched because the run halted.
  Skipped,
  MalformedDocument,
  TransientStoreFailure,
  FatalStoreFailure,
}

impl OutcomeKind {
  pub fn is_failure(self) -> bool {
    matches!(
      self,
      Self::MalformedDocument
        | Self::TransientStoreFailure
        | Self::FatalStoreFailure
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Loaded => "loaded",
      Self::DuplicateFiling => "duplicate_filing",
      Self::Skipped => "skipped",
      Self::MalformedDocument => "malformed_document",
      Self::TransientStoreFailure => "transient_store_failure",
      Self::FatalStoreFailure => "fatal_store_failure",
    }
  }
}

impl fmt::Display for OutcomeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Load outcome ────────────────────────────────────────────────────────────

/// Row counts written for one filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
  pub filing_id:    String,
  pub values:       usize,
  pub groups:       usize,
  pub group_values: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
  Loaded(LoadSummary),
  AlreadyLoaded { filing_id: String },
}

impl LoadOutcome {
  pub fn filing_id(&self) -> &str {
    match self {
      Self::Loaded(summary) => &summary.filing_id,
      Self::AlreadyLoaded { filing_id } => filing_id,
    }
  }

  pub fn kind(&self) -> OutcomeKind {
    match self {
      Self::Loaded(_) => OutcomeKind::Loaded,
      Self::AlreadyLoaded { .. } => OutcomeKind::DuplicateFiling,
    }
  }
}

// ─── Document outcome ────────────────────────────────────────────────────────

/// Exactly one of these is produced for every input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
  pub document_id: String,
  pub kind:        OutcomeKind,
  pub filing_id:   Option<String>,
  pub message:     Option<String>,
  pub warnings:    Vec<SchemaWarning>,
}

impl DocumentOutcome {
  pub fn loaded(
    document_id: impl Into<String>,
    outcome: &LoadOutcome,
    warnings: Vec<SchemaWarning>,
  ) -> Self {
    Self {
      document_id: document_id.into(),
      kind: outcome.kind(),
      filing_id: Some(outcome.filing_id().to_owned()),
      message: None,
      warnings,
    }
  }

  pub fn failed(
    document_id: impl Into<String>,
    kind: OutcomeKind,
    message: impl Into<String>,
  ) -> Self {
    Self {
      document_id: document_id.into(),
      kind,
      filing_id: None,
      message: Some(message.into()),
      warnings: Vec::new(),
    }
  }

  pub fn skipped(document_id: impl Into<String>) -> Self {
    Self {
      document_id: document_id.into(),
      kind: OutcomeKind::Skipped,
      filing_id: None,
      message: Some("run halted before dispatch".to_owned()),
      warnings: Vec::new(),
    }
  }
}

// ─── Run report ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
  pub document_id: String,
  pub kind:        OutcomeKind,
  pub message:     String,
}

/// Aggregate result of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub counts:           BTreeMap<OutcomeKind, usize>,
  /// Total schema-conflict warnings across all documents.
  pub schema_conflicts: usize,
  /// The first `max_failure_details` failures, in input order.
  pub failures:         Vec<FailureDetail>,
  pub total:            usize,
  pub elapsed_ms:       u64,
  /// Whether dispatch stopped early on a failure.
  pub halted:           bool,
  #[serde(skip)]
  max_failure_details:  usize,
}

impl RunReport {
  pub fn new(max_failure_details: usize) -> Self {
    Self { max_failure_details, ..Self::default() }
  }

  pub fn record(&mut self, outcome: &DocumentOutcome) {
    self.total += 1;
    *self.counts.entry(outcome.kind).or_default() += 1;
    self.schema_conflicts += outcome.warnings.len();

    if outcome.kind.is_failure()
      && self.failures.len() < self.max_failure_details
    {
      self.failures.push(FailureDetail {
        document_id: outcome.document_id.clone(),
        kind:        outcome.kind,
        message:     outcome.message.clone().unwrap_or_default(),
      });
    }
  }

  pub fn count(&self, kind: OutcomeKind) -> usize {
    self.counts.get(&kind).copied().unwrap_or(0)
  }

  pub fn failed(&self) -> usize {
    self
      .counts
      .iter()
      .filter(|(k, _)| k.is_failure())
      .map(|(_, n)| n)
      .sum()
  }

  /// Loaded plus duplicate (idempotent) outcomes.
  pub fn succeeded(&self) -> usize {
    self.count(OutcomeKind::Loaded) + self.count(OutcomeKind::DuplicateFiling)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_caps_failure_details() {
    let mut report = RunReport::new(1);
    report.record(&DocumentOutcome::failed(
      "a",
      OutcomeKind::MalformedDocument,
      "missing EIN",
    ));
    report.record(&DocumentOutcome::failed(
      "b",
      OutcomeKind::FatalStoreFailure,
      "constraint",
    ));
    report.record(&DocumentOutcome::loaded(
      "c",
      &LoadOutcome::AlreadyLoaded { filing_id: "x".into() },
      vec![],
    ));

    assert_eq!(report.total, 3);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.count(OutcomeKind::DuplicateFiling), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, "a");
  }

  #[test]
  fn skipped_is_not_a_failure() {
    assert!(!OutcomeKind::Skipped.is_failure());
    assert!(!OutcomeKind::DuplicateFiling.is_failure());
    assert!(OutcomeKind::TransientStoreFailure.is_failure());
  }
}
