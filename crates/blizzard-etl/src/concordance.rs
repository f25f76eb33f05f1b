//! Curated field definitions read from a concordance CSV.
//!
//! A concordance names the fields analysts care about before any document is
//! seen: a variable name, the element path, a description and a simple type.
//! Seeding the store with it means those fields keep their declared type and
//! label instead of whatever the first observed value suggests.
//!
//! Both the lower-case (`variable_name`, `xpath`, ...) and the upper-case
//! (`VAR_NAME`, `XPATH`, ...) header spellings are accepted. Columns this
//! loader has no use for, such as `rdb_table`, are ignored.

use std::path::Path;

use blizzard_core::{
  document::Locator,
  field::{FieldKey, NewFieldDefinition},
  filing::FormType,
  store::DefinitionStore,
  value::ValueType,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::Result;

#[derive(Debug, Deserialize)]
struct Row {
  #[serde(default, alias = "VAR_NAME")]
  variable_name:    Option<String>,
  #[serde(default, alias = "XPATH")]
  xpath:            Option<String>,
  #[serde(default, alias = "DESCRIPTION")]
  description:      Option<String>,
  #[serde(default, alias = "DATA_TYPE_SIMPLE")]
  data_type_simple: Option<String>,
  /// Blank means the field applies to every form type.
  #[serde(default, alias = "FORM_TYPE")]
  form_type:        Option<String>,
}

/// One usable concordance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcordanceEntry {
  pub locator:     Locator,
  pub form_types:  Vec<FormType>,
  pub label:       String,
  pub description: String,
  pub value_type:  ValueType,
}

impl ConcordanceEntry {
  fn definitions(&self) -> impl Iterator<Item = NewFieldDefinition> + '_ {
    self.form_types.iter().map(|form_type| NewFieldDefinition {
      key:         FieldKey::new(self.locator.clone(), *form_type),
      label:       self.label.clone(),
      description: self.description.clone(),
      value_type:  self.value_type,
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct Concordance {
  entries: Vec<ConcordanceEntry>,
}

impl Concordance {
  /// Read a concordance file. Rows without a variable name or path, or with
  /// a path this loader cannot address, are skipped.
  pub fn from_path(path: &Path) -> Result<Self> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut entries = Vec::new();
    let mut skipped = 0_usize;

    for (line, row) in reader.deserialize::<Row>().enumerate() {
      match entry(row?) {
        Some(entry) => entries.push(entry),
        None => {
          debug!(row = line + 1, "concordance row skipped");
          skipped += 1;
        }
      }
    }

    info!(
      path = %path.display(),
      entries = entries.len(),
      skipped,
      "concordance loaded"
    );
    Ok(Self { entries })
  }

  pub fn entries(&self) -> &[ConcordanceEntry] { &self.entries }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Insert every entry the store does not know yet. Existing definitions
  /// keep their identifiers and types. Returns the number of definitions
  /// now durable for the concordance's keys.
  pub async fn seed<S: DefinitionStore>(&self, store: &S) -> Result<usize> {
    let mut seeded = 0;
    for definition in self.entries.iter().flat_map(ConcordanceEntry::definitions) {
      store
        .insert_or_fetch(definition)
        .await
        .map_err(blizzard_core::Error::store)?;
      seeded += 1;
    }
    debug!(definitions = seeded, "concordance seeded");
    Ok(seeded)
  }
}

fn entry(row: Row) -> Option<ConcordanceEntry> {
  let label = non_blank(row.variable_name)?;
  let raw = non_blank(row.xpath)?;

  let Some(locator) = normalize_xpath(&raw) else {
    warn!(variable = %label, xpath = %raw, "unsupported concordance path");
    return None;
  };

  let form_types = match non_blank(row.form_type) {
    None => FormType::ALL.to_vec(),
    Some(code) => match code.parse() {
      Ok(form_type) => vec![form_type],
      Err(e) => {
        warn!(variable = %label, error = %e, "unknown concordance form type");
        return None;
      }
    },
  };

  Some(ConcordanceEntry {
    description: non_blank(row.description)
      .unwrap_or_else(|| locator.to_string()),
    value_type: simple_type(row.data_type_simple.as_deref()),
    locator,
    form_types,
    label,
  })
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

/// Strip namespace prefixes and stray slashes. Predicates and attribute
/// steps have no locator equivalent.
fn normalize_xpath(raw: &str) -> Option<Locator> {
  if raw.contains(['[', '@', '*']) {
    return None;
  }
  let segments: Vec<&str> = raw
    .split('/')
    .filter(|seg| !seg.is_empty())
    .map(|seg| seg.rsplit(':').next().unwrap_or(seg))
    .collect();
  if segments.is_empty() {
    return None;
  }
  Locator::parse(&format!("/{}", segments.join("/"))).ok()
}

/// Map the concordance's simple type names. Anything unrecognized is text.
fn simple_type(raw: Option<&str>) -> ValueType {
  match raw.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
    Some("numeric" | "number" | "integer" | "decimal") => ValueType::Numeric,
    Some("checkbox" | "boolean") => ValueType::Boolean,
    Some("date") => ValueType::Date,
    _ => ValueType::Text,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_csv(contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir()
      .join(format!("blizzard-concordance-{}.csv", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
  }

  #[test]
  fn reads_lower_case_headers() {
    let path = write_csv(
      "variable_name,xpath,description,data_type_simple,rdb_table,rdb_relationship\n\
       F9_01_REV_TOT_CY,/Return/ReturnData/IRS990/TotalRevenueAmt,Total revenue,numeric,filing_values,ONE\n\
       F9_04_SCHOOL,/Return/ReturnData/IRS990/OperatingSchoolInd,,checkbox,,\n\
       ,/Return/ReturnData/IRS990/Orphan,no name,text,,\n\
       NO_PATH,,no path,text,,\n",
    );
    let concordance = Concordance::from_path(&path).unwrap();

    assert_eq!(concordance.len(), 2);
    let revenue = &concordance.entries()[0];
    assert_eq!(revenue.label, "F9_01_REV_TOT_CY");
    assert_eq!(revenue.description, "Total revenue");
    assert_eq!(revenue.value_type, ValueType::Numeric);
    assert_eq!(revenue.form_types, FormType::ALL);

    let school = &concordance.entries()[1];
    assert_eq!(school.value_type, ValueType::Boolean);
    assert_eq!(
      school.description,
      "/Return/ReturnData/IRS990/OperatingSchoolInd"
    );
  }

  #[test]
  fn reads_upper_case_headers_and_form_types() {
    let path = write_csv(
      "VAR_NAME,XPATH,DESCRIPTION,DATA_TYPE_SIMPLE,FORM_TYPE\n\
       EZ_REV,/efile:Return/efile:ReturnData/IRS990EZ/TotalRevenueAmt,Revenue,,990-EZ\n\
       BAD_FORM,/Return/ReturnData/X,bad,text,1040\n\
       ATTR,/Return/@returnVersion,version,text,\n",
    );
    let concordance = Concordance::from_path(&path).unwrap();

    assert_eq!(concordance.len(), 1);
    let entry = &concordance.entries()[0];
    assert_eq!(
      entry.locator.as_str(),
      "/Return/ReturnData/IRS990EZ/TotalRevenueAmt"
    );
    assert_eq!(entry.form_types, [FormType::Form990Ez]);
    assert_eq!(entry.value_type, ValueType::Text);
  }

  #[test]
  fn missing_file_is_an_error() {
    let path = std::env::temp_dir().join("blizzard-no-such-concordance.csv");
    assert!(Concordance::from_path(&path).is_err());
  }

  #[test]
  fn simple_types_default_to_text() {
    assert_eq!(simple_type(None), ValueType::Text);
    assert_eq!(simple_type(Some(" Date ")), ValueType::Date);
    assert_eq!(simple_type(Some("currency")), ValueType::Text);
  }
}
