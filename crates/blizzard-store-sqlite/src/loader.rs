//! [`FilingLoader`] for [`SqliteStore`].
//!
//! One filing, one `IMMEDIATE` transaction, in this order: organization
//! upsert, filing insert, root values, group instances (parents first), group
//! values. A filing identifier that already exists rolls the transaction back
//! and reports [`LoadOutcome::AlreadyLoaded`]; any error rolls back
//! everything, so a partial filing is never visible.

use std::collections::HashMap;

use blizzard_core::{
  detect::GroupInstanceId,
  outcome::{LoadOutcome, LoadSummary},
  record::{FieldValue, NormalizedRecordSet},
  store::FilingLoader,
};
use chrono::Utc;
use rusqlite::{Transaction, TransactionBehavior, types::Value};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{VALUE_COLUMNS, encode_date, encode_dt, value_row},
  store::SqliteStore,
};

impl FilingLoader for SqliteStore {
  type Error = Error;

  async fn load(&self, records: NormalizedRecordSet) -> Result<LoadOutcome> {
    let filing_id = records.header.filing_id.clone();
    let batch_size = self.batch_size;
    let conn = self.checkout().await?;

    let summary = conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let summary = write_filing(&tx, &records, batch_size)?;
        match summary {
          // Dropping the transaction rolls it back.
          None => Ok(None),
          Some(summary) => {
            tx.commit()?;
            Ok(Some(summary))
          }
        }
      })
      .await?;

    Ok(match summary {
      Some(summary) => {
        info!(
          filing_id = %summary.filing_id,
          values = summary.values,
          groups = summary.groups,
          group_values = summary.group_values,
          "loaded filing"
        );
        LoadOutcome::Loaded(summary)
      }
      None => {
        debug!(%filing_id, "filing already loaded");
        LoadOutcome::AlreadyLoaded { filing_id }
      }
    })
  }
}

/// Write every row of `records`. Returns `None` when the filing already
/// exists; the caller must then roll back.
fn write_filing(
  tx: &Transaction<'_>,
  records: &NormalizedRecordSet,
  batch_size: usize,
) -> tokio_rusqlite::Result<Option<LoadSummary>> {
  let header = &records.header;
  let org = &records.organization;
  let now = encode_dt(Utc::now());

  tx.execute(
    "INSERT INTO organizations (ein, name, locality, region, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
     ON CONFLICT (ein) DO UPDATE SET
       name       = COALESCE(excluded.name, organizations.name),
       locality   = COALESCE(excluded.locality, organizations.locality),
       region     = COALESCE(excluded.region, organizations.region),
       updated_at = excluded.updated_at",
    rusqlite::params![org.ein, org.name, org.locality, org.region, now],
  )?;

  let inserted = tx.execute(
    "INSERT INTO filings (
       filing_id, ein, form_type, tax_period, tax_year, submission_date,
       form_version, object_id, source_sha256, loaded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT (filing_id) DO NOTHING",
    rusqlite::params![
      header.filing_id,
      header.ein,
      header.form_type.as_str(),
      encode_date(header.tax_period),
      header.tax_year,
      header.submission_date,
      header.form_version,
      header.object_id,
      header.source_digest,
      now,
    ],
  )?;
  if inserted == 0 {
    return Ok(None);
  }

  let filing_owner = Value::Text(header.filing_id.clone());
  let values = insert_values(
    tx,
    "filing_values",
    "filing_id",
    records.values.iter().map(|v| (filing_owner.clone(), v)),
    batch_size,
  )?;

  // Arena index -> group_id. Parents precede children in `records.groups`.
  let mut group_ids: HashMap<GroupInstanceId, i64> =
    HashMap::with_capacity(records.groups.len());
  let mut group_value_rows = Vec::with_capacity(records.group_value_count());
  {
    let mut stmt = tx.prepare_cached(
      "INSERT INTO repeating_groups
         (filing_id, parent_group_id, name, locator, ordinal)
       VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for group in &records.groups {
      let parent = match group.parent {
        None => None,
        Some(parent) => Some(*group_ids.get(&parent).ok_or_else(|| {
          tokio_rusqlite::Error::Other(Box::new(Error::OrphanGroup {
            ordinal: group.ordinal,
            parent:  parent.index(),
          }))
        })?),
      };
      stmt.execute(rusqlite::params![
        header.filing_id,
        parent,
        group.name,
        group.locator.as_str(),
        group.ordinal,
      ])?;
      let group_id = tx.last_insert_rowid();
      group_ids.insert(group.id, group_id);
      group_value_rows
        .extend(group.values.iter().map(|v| (Value::Integer(group_id), v)));
    }
  }

  let group_values = insert_values(
    tx,
    "repeating_group_values",
    "group_id",
    group_value_rows.into_iter(),
    batch_size,
  )?;

  Ok(Some(LoadSummary {
    filing_id: header.filing_id.clone(),
    values,
    groups: records.groups.len(),
    group_values,
  }))
}

/// Insert value rows with multi-row `VALUES` lists of at most `batch_size`
/// rows each.
fn insert_values<'r>(
  tx: &Transaction<'_>,
  table: &str,
  owner_column: &str,
  rows: impl Iterator<Item = (Value, &'r FieldValue)>,
  batch_size: usize,
) -> rusqlite::Result<usize> {
  let rows: Vec<[Value; VALUE_COLUMNS]> =
    rows.map(|(owner, value)| value_row(owner, value)).collect();
  let mut written = 0;

  for chunk in rows.chunks(batch_size.max(1)) {
    let placeholders = vec!["(?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
    let sql = format!(
      "INSERT INTO {table} ({owner_column}, field_id, text_value,
         numeric_value, boolean_value, date_value)
       VALUES {placeholders}"
    );
    let params = chunk.iter().flat_map(|row| row.iter());
    written += tx
      .prepare_cached(&sql)?
      .execute(rusqlite::params_from_iter(params))?;
  }

  Ok(written)
}
