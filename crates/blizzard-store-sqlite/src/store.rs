//! [`SqliteStore`] and its read-side queries.

use blizzard_core::{
  field::{FieldDefinition, FieldId, FieldKey},
  filing::Organization,
};
use chrono::NaiveDate;
use rusqlite::OptionalExtension as _;
use serde::Serialize;

use crate::{
  Result,
  encode::{
    FIELD_DEFINITION_COLUMNS, RawFieldDefinition, RawStoredGroup,
    RawStoredValue, decode_date,
  },
  pool::{Pool, PoolConfig, PooledConnection},
  retry::{RetryPolicy, with_retry},
};

/// Upper bound on value rows per multi-row `INSERT`.
pub(crate) const MAX_BATCH_ROWS: usize = 500;

// ─── Read types ──────────────────────────────────────────────────────────────

/// One stored filing or group value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredValue {
  pub field_id: FieldId,
  pub locator:  String,
  pub text:     String,
  pub numeric:  Option<f64>,
  pub boolean:  Option<bool>,
  pub date:     Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredGroup {
  pub group_id:        i64,
  pub parent_group_id: Option<i64>,
  pub name:            String,
  pub locator:         String,
  pub ordinal:         u32,
}

/// Rows owned by one filing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilingRowCounts {
  pub filings:      usize,
  pub values:       usize,
  pub groups:       usize,
  pub group_values: usize,
}

impl FilingRowCounts {
  pub fn is_empty(&self) -> bool { *self == Self::default() }
}

/// Row counts of every relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
  pub organizations:          usize,
  pub filings:                usize,
  pub field_definitions:      usize,
  pub filing_values:          usize,
  pub repeating_groups:       usize,
  pub repeating_group_values: usize,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The Blizzard store backed by one SQLite file.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) pool:       Pool,
  pub(crate) retry:      RetryPolicy,
  pub(crate) batch_size: usize,
}

impl SqliteStore {
  /// Open (or create) a store and its connection pool.
  pub async fn open(config: PoolConfig) -> Result<Self> {
    let retry = config.retry_policy();
    let pool = Pool::open(config).await?;
    Ok(Self { pool, retry, batch_size: 100 })
  }

  /// Value rows per multi-row insert, capped at 500.
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.clamp(1, MAX_BATCH_ROWS);
    self
  }

  pub fn pool(&self) -> &Pool { &self.pool }

  pub fn close(&self) { self.pool.close() }

  /// Acquire a pooled connection, retrying transient failures.
  pub(crate) async fn checkout(&self) -> Result<PooledConnection> {
    with_retry(&self.retry, "acquire", || self.pool.acquire()).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn filing_exists(&self, filing_id: &str) -> Result<bool> {
    let filing_id = filing_id.to_owned();
    let conn = self.checkout().await?;
    Ok(
      conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT 1 FROM filings WHERE filing_id = ?1",
                rusqlite::params![filing_id],
                |_| Ok(()),
              )
              .optional()?
              .is_some(),
          )
        })
        .await?,
    )
  }

  pub async fn filing_row_counts(&self, filing_id: &str) -> Result<FilingRowCounts> {
    let filing_id = filing_id.to_owned();
    let conn = self.checkout().await?;
    let counts = conn
      .call(move |conn| {
        let count = |sql: &str| -> rusqlite::Result<usize> {
          conn.query_row(sql, rusqlite::params![filing_id], |r| r.get(0))
        };
        Ok(FilingRowCounts {
          filings:      count("SELECT COUNT(*) FROM filings WHERE filing_id = ?1")?,
          values:       count(
            "SELECT COUNT(*) FROM filing_values WHERE filing_id = ?1",
          )?,
          groups:       count(
            "SELECT COUNT(*) FROM repeating_groups WHERE filing_id = ?1",
          )?,
          group_values: count(
            "SELECT COUNT(*) FROM repeating_group_values v
             JOIN repeating_groups g ON g.group_id = v.group_id
             WHERE g.filing_id = ?1",
          )?,
        })
      })
      .await?;
    Ok(counts)
  }

  /// Root-level values of a filing, ordered by field identifier.
  pub async fn filing_values(&self, filing_id: &str) -> Result<Vec<StoredValue>> {
    let filing_id = filing_id.to_owned();
    let conn = self.checkout().await?;
    let raws: Vec<RawStoredValue> = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT v.field_id, d.locator, v.text_value, v.numeric_value,
                  v.boolean_value, v.date_value
           FROM filing_values v
           JOIN field_definitions d ON d.field_id = v.field_id
           WHERE v.filing_id = ?1
           ORDER BY v.field_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![filing_id], RawStoredValue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(decode_value).collect()
  }

  /// Group instances of a filing in document order.
  pub async fn group_instances(&self, filing_id: &str) -> Result<Vec<StoredGroup>> {
    let filing_id = filing_id.to_owned();
    let conn = self.checkout().await?;
    let raws: Vec<RawStoredGroup> = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT group_id, parent_group_id, name, locator, ordinal
           FROM repeating_groups
           WHERE filing_id = ?1
           ORDER BY ordinal",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![filing_id], RawStoredGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(
      raws
        .into_iter()
        .map(|r| StoredGroup {
          group_id:        r.group_id,
          parent_group_id: r.parent_group_id,
          name:            r.name,
          locator:         r.locator,
          ordinal:         r.ordinal,
        })
        .collect(),
    )
  }

  pub async fn group_values(&self, group_id: i64) -> Result<Vec<StoredValue>> {
    let conn = self.checkout().await?;
    let raws: Vec<RawStoredValue> = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT v.field_id, d.locator, v.text_value, v.numeric_value,
                  v.boolean_value, v.date_value
           FROM repeating_group_values v
           JOIN field_definitions d ON d.field_id = v.field_id
           WHERE v.group_id = ?1
           ORDER BY v.field_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![group_id], RawStoredValue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(decode_value).collect()
  }

  pub async fn table_counts(&self) -> Result<TableCounts> {
    let conn = self.checkout().await?;
    let counts = conn
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<usize> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| {
            r.get(0)
          })
        };
        Ok(TableCounts {
          organizations:          count("organizations")?,
          filings:                count("filings")?,
          field_definitions:      count("field_definitions")?,
          filing_values:          count("filing_values")?,
          repeating_groups:       count("repeating_groups")?,
          repeating_group_values: count("repeating_group_values")?,
        })
      })
      .await?;
    Ok(counts)
  }

  pub async fn field_definition(
    &self,
    key: &FieldKey,
  ) -> Result<Option<FieldDefinition>> {
    let locator = key.locator.to_string();
    let form_type = key.form_type.as_str();
    let conn = self.checkout().await?;
    let raw: Option<RawFieldDefinition> = conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {FIELD_DEFINITION_COLUMNS} FROM field_definitions
                 WHERE locator = ?1 AND form_type = ?2"
              ),
              rusqlite::params![locator, form_type],
              RawFieldDefinition::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawFieldDefinition::into_definition).transpose()
  }

  pub async fn organization(&self, ein: &str) -> Result<Option<Organization>> {
    let ein = ein.to_owned();
    let conn = self.checkout().await?;
    Ok(
      conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT ein, name, locality, region
                 FROM organizations WHERE ein = ?1",
                rusqlite::params![ein],
                |row| {
                  Ok(Organization {
                    ein:      row.get(0)?,
                    name:     row.get(1)?,
                    locality: row.get(2)?,
                    region:   row.get(3)?,
                  })
                },
              )
              .optional()?,
          )
        })
        .await?,
    )
  }
}

fn decode_value(raw: RawStoredValue) -> Result<StoredValue> {
  Ok(StoredValue {
    field_id: FieldId(raw.field_id),
    locator:  raw.locator,
    text:     raw.text_value,
    numeric:  raw.numeric_value,
    boolean:  raw.boolean_value,
    date:     raw.date_value.as_deref().map(decode_date).transpose()?,
  })
}
