//! Document builders and an in-memory definition store for unit tests.

use std::{
  convert::Infallible,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use parking_lot::Mutex;

use crate::{
  document::{Document, Element},
  field::{FieldDefinition, FieldId, FieldKey, NewFieldDefinition},
  store::{DefinitionStore, StoreFailure},
  value::ValueType,
};

// ─── Documents ───────────────────────────────────────────────────────────────

fn header(ein: &str, period: &str, form: &str) -> Element {
  Element::new("ReturnHeader")
    .with_child(Element::leaf("ReturnTs", "2021-05-12T10:22:33-05:00"))
    .with_child(Element::leaf("TaxPeriodEndDt", period))
    .with_child(Element::leaf("ReturnTypeCd", form))
    .with_child(
      Element::new("Filer")
        .with_child(Element::leaf("EIN", ein))
        .with_child(
          Element::new("BusinessName")
            .with_child(Element::leaf("BusinessNameLine1Txt", "Helping Hands")),
        )
        .with_child(
          Element::new("USAddress")
            .with_child(Element::leaf("CityNm", "Springfield"))
            .with_child(Element::leaf("StateAbbreviationCd", "IL")),
        ),
    )
}

/// A return with a full header and `data` under `ReturnData`.
pub fn return_with_data(
  ein: &str,
  period: &str,
  form: &str,
  data: Vec<Element>,
) -> Document {
  let return_data = data
    .into_iter()
    .fold(Element::new("ReturnData"), Element::with_child);
  Document::new(
    Element::new("Return")
      .with_attribute("returnVersion", "2020v4.1")
      .with_child(header(ein, period, form))
      .with_child(return_data),
  )
}

/// A return with a main form section and `grants` under Schedule I.
pub fn return_doc(
  ein: &str,
  period: &str,
  form: &str,
  grants: Vec<Element>,
) -> Document {
  let main = Element::new("IRS990")
    .with_child(Element::leaf("TotalRevenueAmt", "12500"))
    .with_child(Element::leaf("MissionDesc", "Feeding families"));
  let schedule = grants
    .into_iter()
    .fold(Element::new("IRS990ScheduleI"), Element::with_child);
  return_with_data(ein, period, form, vec![main, schedule])
}

pub fn grant(name: &str, amount: &str) -> Element {
  Element::new("RecipientTable")
    .with_child(Element::leaf("RecipientBusinessName", name))
    .with_child(Element::leaf("CashGrantAmt", amount))
}

/// Two `Level` elements per parent, `levels` deep, each with an `Amt` leaf.
pub fn nested_doc(levels: usize) -> Document {
  fn level(remaining: usize, amount: usize) -> Element {
    let el = Element::new("Level")
      .with_child(Element::leaf("Amt", amount.to_string()));
    if remaining <= 1 {
      return el;
    }
    el.with_child(level(remaining - 1, amount * 10))
      .with_child(level(remaining - 1, amount * 10 + 1))
  }
  return_with_data(
    "123456789",
    "2020-12-31",
    "990",
    vec![level(levels, 1), level(levels, 2)],
  )
}

/// A header with only the given required fields present.
pub fn header_only(
  ein: Option<&str>,
  period: Option<&str>,
  form: Option<&str>,
) -> Document {
  let mut filer = Element::new("Filer");
  if let Some(ein) = ein {
    filer = filer.with_child(Element::leaf("EIN", ein));
  }
  let mut header = Element::new("ReturnHeader").with_child(filer);
  if let Some(period) = period {
    header = header.with_child(Element::leaf("TaxPeriodEndDt", period));
  }
  if let Some(form) = form {
    header = header.with_child(Element::leaf("ReturnTypeCd", form));
  }
  Document::new(Element::new("Return").with_child(header))
}

// ─── In-memory definition store ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
pub struct MemoryError(Infallible);

impl StoreFailure for MemoryError {
  fn is_transient(&self) -> bool { false }
}

/// Shared, clonable definition store counting every call.
#[derive(Debug, Clone, Default)]
pub struct MemoryDefinitions {
  definitions: Arc<Mutex<Vec<FieldDefinition>>>,
  calls:       Arc<AtomicUsize>,
}

impl MemoryDefinitions {
  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn definition_count(&self) -> usize { self.definitions.lock().len() }

  fn tick(&self) { self.calls.fetch_add(1, Ordering::SeqCst); }
}

impl DefinitionStore for MemoryDefinitions {
  type Error = MemoryError;

  async fn load_definitions(&self) -> Result<Vec<FieldDefinition>, MemoryError> {
    self.tick();
    Ok(self.definitions.lock().clone())
  }

  async fn fetch_definition<'a>(
    &'a self,
    key: &'a FieldKey,
  ) -> Result<Option<FieldDefinition>, MemoryError> {
    self.tick();
    Ok(self.definitions.lock().iter().find(|d| &d.key() == key).cloned())
  }

  async fn insert_or_fetch(
    &self,
    definition: NewFieldDefinition,
  ) -> Result<FieldDefinition, MemoryError> {
    self.tick();
    let mut definitions = self.definitions.lock();
    if let Some(existing) =
      definitions.iter().find(|d| d.key() == definition.key)
    {
      return Ok(existing.clone());
    }
    let stored = FieldDefinition {
      field_id:    FieldId(definitions.len() as i64 + 1),
      locator:     definition.key.locator,
      form_type:   definition.key.form_type,
      label:       definition.label,
      description: definition.description,
      value_type:  definition.value_type,
    };
    definitions.push(stored.clone());
    Ok(stored)
  }

  async fn widen_to_text(
    &self,
    field_id: FieldId,
  ) -> Result<FieldDefinition, MemoryError> {
    self.tick();
    let mut definitions = self.definitions.lock();
    let Some(def) = definitions.iter_mut().find(|d| d.field_id == field_id)
    else {
      panic!("widen_to_text on unknown field {field_id}");
    };
    def.value_type = ValueType::Text;
    Ok(def.clone())
  }
}
