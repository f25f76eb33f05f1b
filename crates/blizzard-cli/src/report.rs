//! Plain-text rendering for run reports and table counts.

use std::fmt::Write as _;

use blizzard_core::outcome::RunReport;
use blizzard_store_sqlite::TableCounts;

pub fn render_report(report: &RunReport) -> String {
  let mut out = String::new();
  let _ = writeln!(
    out,
    "processed {} documents in {} ms{}",
    report.total,
    report.elapsed_ms,
    if report.halted { " (halted after failure)" } else { "" },
  );
  for (kind, count) in &report.counts {
    let _ = writeln!(out, "  {:<24}{count:>8}", kind.as_str());
  }
  if report.schema_conflicts > 0 {
    let _ = writeln!(
      out,
      "  {:<24}{:>8}",
      "schema_conflicts", report.schema_conflicts
    );
  }

  if !report.failures.is_empty() {
    let _ = writeln!(out, "failures:");
    for failure in &report.failures {
      let _ = writeln!(
        out,
        "  {} [{}] {}",
        failure.document_id, failure.kind, failure.message
      );
    }
    let omitted = report.failed().saturating_sub(report.failures.len());
    if omitted > 0 {
      let _ = writeln!(out, "  ... and {omitted} more");
    }
  }
  out
}

pub fn render_counts(counts: &TableCounts) -> String {
  let rows = [
    ("organizations", counts.organizations),
    ("filings", counts.filings),
    ("field_definitions", counts.field_definitions),
    ("filing_values", counts.filing_values),
    ("repeating_groups", counts.repeating_groups),
    ("repeating_group_values", counts.repeating_group_values),
  ];
  let mut out = String::new();
  for (table, count) in rows {
    let _ = writeln!(out, "{table:<24}{count:>10}");
  }
  out
}
