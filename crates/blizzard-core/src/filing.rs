//! Filing header and owning organization, read from well-known locators.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  document::{Document, Element},
  value::parse_date,
};

// ─── Form type ───────────────────────────────────────────────────────────────

/// The family of return schemas the engine understands.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FormType {
  #[serde(rename = "990")]
  Form990,
  #[serde(rename = "990EZ")]
  Form990Ez,
  #[serde(rename = "990PF")]
  Form990Pf,
  #[serde(rename = "990T")]
  Form990T,
}

impl FormType {
  pub const ALL: [FormType; 4] =
    [Self::Form990, Self::Form990Ez, Self::Form990Pf, Self::Form990T];

  /// The code stored in the database, matching `ReturnTypeCd`.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Form990 => "990",
      Self::Form990Ez => "990EZ",
      Self::Form990Pf => "990PF",
      Self::Form990T => "990T",
    }
  }

  /// Read the form type from the document's return header.
  pub fn from_document(doc: &Document) -> Result<Self> {
    let code = lookup(doc, &FORM_TYPE)
      .ok_or_else(|| Error::malformed("missing return type code"))?;
    code.parse()
  }
}

impl fmt::Display for FormType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FormType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let normalized: String = s
      .trim()
      .chars()
      .filter(|c| !matches!(c, '-' | ' '))
      .collect::<String>()
      .to_ascii_uppercase();
    Self::ALL
      .into_iter()
      .find(|ft| ft.as_str() == normalized)
      .ok_or_else(|| Error::UnknownFormType(s.to_owned()))
  }
}

// ─── Header records ──────────────────────────────────────────────────────────

/// The organization a filing belongs to, keyed by its EIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
  pub ein:      String,
  pub name:     Option<String>,
  pub locality: Option<String>,
  pub region:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingHeader {
  /// `{ein}_{tax_period}_{form_type}`.
  pub filing_id:       String,
  pub ein:             String,
  pub form_type:       FormType,
  pub tax_period:      NaiveDate,
  pub tax_year:        i32,
  /// Submission timestamp exactly as it appears in the document.
  pub submission_date: Option<String>,
  pub form_version:    Option<String>,
  pub object_id:       Option<String>,
  pub source_digest:   Option<String>,
}

impl FilingHeader {
  /// Extract the header and owning organization. Fails with
  /// [`Error::MalformedDocument`] when a required locator is missing or
  /// unparsable.
  pub fn extract(doc: &Document) -> Result<(Self, Organization)> {
    let ein = lookup(doc, &EIN)
      .ok_or_else(|| Error::malformed("missing EIN"))?
      .to_owned();

    let period_raw = lookup(doc, &TAX_PERIOD)
      .ok_or_else(|| Error::malformed("missing tax period end date"))?;
    let tax_period = parse_date(period_raw).ok_or_else(|| {
      Error::malformed(format!("unparsable tax period {period_raw:?}"))
    })?;

    let form_type = FormType::from_document(doc)?;

    let tax_year = match lookup(doc, &TAX_YEAR) {
      Some(raw) => raw.parse::<i32>().map_err(|_| {
        Error::malformed(format!("unparsable tax year {raw:?}"))
      })?,
      None => tax_period.year(),
    };

    let header = Self {
      filing_id: format!("{ein}_{tax_period}_{form_type}"),
      ein: ein.clone(),
      form_type,
      tax_period,
      tax_year,
      submission_date: lookup(doc, &SUBMITTED).map(str::to_owned),
      form_version: doc.root.attribute("returnVersion").map(str::to_owned),
      object_id: doc.object_id.clone(),
      source_digest: doc.source_digest.clone(),
    };

    let organization = Organization {
      ein,
      name:     lookup(doc, &ORG_NAME).map(str::to_owned),
      locality: lookup(doc, &LOCALITY).map(str::to_owned),
      region:   lookup(doc, &REGION).map(str::to_owned),
    };

    Ok((header, organization))
  }
}

// ─── Well-known locators ─────────────────────────────────────────────────────

/// Candidate paths below the document root, tried in order, then the first
/// element anywhere with the `fallback` name.
struct HeaderField {
  paths:    &'static [&'static str],
  fallback: &'static str,
}

const EIN: HeaderField = HeaderField {
  paths:    &["ReturnHeader/Filer/EIN"],
  fallback: "EIN",
};
const TAX_PERIOD: HeaderField = HeaderField {
  paths:    &["ReturnHeader/TaxPeriodEndDt"],
  fallback: "TaxPeriodEndDt",
};
const FORM_TYPE: HeaderField = HeaderField {
  paths:    &["ReturnHeader/ReturnTypeCd"],
  fallback: "ReturnTypeCd",
};
const TAX_YEAR: HeaderField = HeaderField {
  paths:    &["ReturnHeader/TaxYr"],
  fallback: "TaxYr",
};
const SUBMITTED: HeaderField = HeaderField {
  paths:    &["ReturnHeader/ReturnTs"],
  fallback: "ReturnTs",
};
const ORG_NAME: HeaderField = HeaderField {
  paths:    &[
    "ReturnHeader/Filer/BusinessName/BusinessNameLine1Txt",
    "ReturnHeader/Filer/Name/BusinessNameLine1Txt",
  ],
  fallback: "BusinessNameLine1Txt",
};
const LOCALITY: HeaderField = HeaderField {
  paths:    &[
    "ReturnHeader/Filer/USAddress/CityNm",
    "ReturnHeader/Filer/ForeignAddress/CityNm",
  ],
  fallback: "CityNm",
};
const REGION: HeaderField = HeaderField {
  paths:    &[
    "ReturnHeader/Filer/USAddress/StateAbbreviationCd",
    "ReturnHeader/Filer/ForeignAddress/ProvinceOrStateNm",
  ],
  fallback: "StateAbbreviationCd",
};

fn lookup<'d>(doc: &'d Document, field: &HeaderField) -> Option<&'d str> {
  field
    .paths
    .iter()
    .find_map(|p| doc.at(p).and_then(Element::text))
    .or_else(|| doc.find_by_name(field.fallback).and_then(Element::text))
}
