//! Run configuration.
//!
//! Deserialized by the caller from whatever layered sources it uses; every
//! field has a default, so a partial document is enough. Call
//! [`EtlConfig::validate`] before handing it to an [`Orchestrator`].
//!
//! [`Orchestrator`]: crate::Orchestrator

use std::{path::PathBuf, time::Duration};

use blizzard_core::detect::DetectorConfig;
use blizzard_store_sqlite::{PoolConfig, SqliteStore};
use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
  /// Value rows per multi-row insert.
  pub batch_size:          usize,
  pub worker_count:        usize,
  /// When false, the first failed document stops dispatch.
  pub continue_on_error:   bool,
  /// Failures kept in full in the run report.
  pub max_failure_details: usize,
  pub detector:            DetectorConfig,
  pub pool:                PoolSettings,
  /// CSV of curated field definitions to seed before the first document.
  pub concordance:         Option<PathBuf>,
}

impl Default for EtlConfig {
  fn default() -> Self {
    Self {
      batch_size:          100,
      worker_count:        4,
      continue_on_error:   true,
      max_failure_details: 50,
      detector:            DetectorConfig::default(),
      pool:                PoolSettings::default(),
      concordance:         None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
  pub path:               PathBuf,
  pub size:               usize,
  pub acquire_timeout_ms: u64,
  pub connect_retries:    u32,
  pub retry_backoff_ms:   u64,
}

impl Default for PoolSettings {
  fn default() -> Self {
    Self {
      path:               PathBuf::from("blizzard.db"),
      size:               8,
      acquire_timeout_ms: 5000,
      connect_retries:    3,
      retry_backoff_ms:   100,
    }
  }
}

impl EtlConfig {
  pub fn validate(&self) -> Result<()> {
    let positive = [
      ("batch_size", self.batch_size as u64),
      ("worker_count", self.worker_count as u64),
      ("pool.size", self.pool.size as u64),
      ("pool.acquire_timeout_ms", self.pool.acquire_timeout_ms),
    ];
    if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
      return Err(Error::invalid_config(format!("{name} must be positive")));
    }
    if self.detector.min_repeat < 2 {
      return Err(Error::invalid_config(format!(
        "detector.min_repeat must be at least 2, got {}",
        self.detector.min_repeat
      )));
    }
    if self.pool.path.as_os_str().is_empty() {
      return Err(Error::invalid_config("pool.path must not be empty"));
    }
    Ok(())
  }

  pub fn pool_config(&self) -> PoolConfig {
    PoolConfig {
      path:            self.pool.path.clone(),
      size:            self.pool.size,
      acquire_timeout: Duration::from_millis(self.pool.acquire_timeout_ms),
      connect_retries: self.pool.connect_retries,
      retry_backoff:   Duration::from_millis(self.pool.retry_backoff_ms),
    }
  }

  /// Open the configured store with this run's batch size.
  pub async fn open_store(&self) -> Result<SqliteStore> {
    Ok(
      SqliteStore::open(self.pool_config())
        .await?
        .with_batch_size(self.batch_size),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = EtlConfig::default();
    config.validate().unwrap();
    assert_eq!(config.worker_count, 4);
    assert!(config.continue_on_error);
    assert_eq!(config.pool_config().acquire_timeout, Duration::from_secs(5));
  }

  #[test]
  fn partial_documents_fill_defaults() {
    let config: EtlConfig = serde_json::from_str(
      r#"{ "worker_count": 2, "pool": { "path": "/tmp/x.db" } }"#,
    )
    .unwrap();
    assert_eq!(config.worker_count, 2);
    assert_eq!(config.batch_size, 100);
    assert_eq!(config.pool.size, 8);
    assert_eq!(config.pool.path, PathBuf::from("/tmp/x.db"));
    assert_eq!(config.detector.min_repeat, 2);
    assert_eq!(config.concordance, None);
  }

  #[test]
  fn zero_sizes_are_rejected() {
    let config = EtlConfig { worker_count: 0, ..EtlConfig::default() };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("worker_count"), "{err}");

    let mut config = EtlConfig::default();
    config.pool.acquire_timeout_ms = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn single_sibling_threshold_is_rejected() {
    let config = EtlConfig {
      detector: DetectorConfig { min_repeat: 1 },
      ..EtlConfig::default()
    };
    assert!(matches!(
      config.validate(),
      Err(Error::Core(blizzard_core::Error::InvalidConfig(_)))
    ));
  }
}
