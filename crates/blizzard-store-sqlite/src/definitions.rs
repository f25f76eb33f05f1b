//! [`DefinitionStore`] for [`SqliteStore`].
//!
//! Field definitions are shared reference data written outside filing
//! transactions. Creation is an insert-or-fetch on the `(locator, form_type)`
//! uniqueness constraint, so racing creators all read back the same row.

use blizzard_core::{
  field::{FieldDefinition, FieldId, FieldKey, NewFieldDefinition},
  store::DefinitionStore,
  value::ValueType,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;

use crate::{
  Error, Result,
  encode::{FIELD_DEFINITION_COLUMNS, RawFieldDefinition, encode_dt},
  retry::with_retry,
  store::SqliteStore,
};

impl DefinitionStore for SqliteStore {
  type Error = Error;

  async fn load_definitions(&self) -> Result<Vec<FieldDefinition>> {
    let conn = self.checkout().await?;
    let raws: Vec<RawFieldDefinition> = conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FIELD_DEFINITION_COLUMNS} FROM field_definitions
           ORDER BY field_id"
        ))?;
        let rows = stmt
          .query_map([], RawFieldDefinition::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFieldDefinition::into_definition).collect()
  }

  async fn fetch_definition<'a>(
    &'a self,
    key: &'a FieldKey,
  ) -> Result<Option<FieldDefinition>> {
    self.field_definition(key).await
  }

  async fn insert_or_fetch(
    &self,
    definition: NewFieldDefinition,
  ) -> Result<FieldDefinition> {
    let raw = with_retry(&self.retry, "insert_or_fetch", || {
      let def = definition.clone();
      async move {
        let conn = self.pool.acquire().await?;
        let raw = conn
          .call(move |conn| {
            let locator = def.key.locator.to_string();
            let form_type = def.key.form_type.as_str();
            let inserted = conn.execute(
              "INSERT INTO field_definitions
                 (locator, form_type, label, description, value_type, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT (locator, form_type) DO NOTHING",
              rusqlite::params![
                locator,
                form_type,
                def.label,
                def.description,
                def.value_type.as_str(),
                encode_dt(Utc::now()),
              ],
            )?;
            let raw = conn.query_row(
              &format!(
                "SELECT {FIELD_DEFINITION_COLUMNS} FROM field_definitions
                 WHERE locator = ?1 AND form_type = ?2"
              ),
              rusqlite::params![locator, form_type],
              RawFieldDefinition::from_row,
            )?;
            Ok((inserted > 0, raw))
          })
          .await?;
        Ok(raw)
      }
    })
    .await?;

    let (created, raw) = raw;
    let definition = raw.into_definition()?;
    if created {
      debug!(
        field_id = %definition.field_id,
        locator = %definition.locator,
        value_type = %definition.value_type,
        "registered field definition"
      );
    }
    Ok(definition)
  }

  async fn widen_to_text(&self, field_id: FieldId) -> Result<FieldDefinition> {
    let raw = with_retry(&self.retry, "widen_to_text", || async move {
      let conn = self.pool.acquire().await?;
      let raw: Option<RawFieldDefinition> = conn
        .call(move |conn| {
          conn.execute(
            "UPDATE field_definitions SET value_type = ?1 WHERE field_id = ?2",
            rusqlite::params![ValueType::Text.as_str(), field_id.0],
          )?;
          Ok(
            conn
              .query_row(
                &format!(
                  "SELECT {FIELD_DEFINITION_COLUMNS} FROM field_definitions
                   WHERE field_id = ?1"
                ),
                rusqlite::params![field_id.0],
                RawFieldDefinition::from_row,
              )
              .optional()?,
          )
        })
        .await?;
      Ok(raw)
    })
    .await?;

    raw
      .ok_or(Error::FieldNotFound(field_id))?
      .into_definition()
  }
}
