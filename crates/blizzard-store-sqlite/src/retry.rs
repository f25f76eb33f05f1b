//! Operation-level retry with exponential backoff for transient failures.

use std::{future::Future, time::Duration};

use blizzard_core::store::StoreFailure;
use tracing::{info, warn};

use crate::Result;

/// Maximum delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub attempts:        u32,
  pub initial_backoff: Duration,
  pub max_backoff:     Duration,
}

impl RetryPolicy {
  /// One initial attempt plus `retries` more.
  pub fn new(retries: u32, initial_backoff: Duration) -> Self {
    Self {
      attempts: retries + 1,
      initial_backoff,
      max_backoff: MAX_BACKOFF,
    }
  }

  /// No retries at all.
  pub fn none() -> Self { Self::new(0, Duration::ZERO) }
}

impl Default for RetryPolicy {
  fn default() -> Self { Self::new(3, Duration::from_millis(100)) }
}

/// Run `f` until it succeeds, fails permanently, or `policy.attempts` is
/// spent. Only errors whose [`StoreFailure::is_transient`] is true are
/// retried; the delay doubles after each attempt up to `max_backoff`.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  operation: &'static str,
  mut f: F,
) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let mut delay = policy.initial_backoff;
  let mut attempt = 1u32;

  loop {
    match f().await {
      Err(e) if e.is_transient() && attempt < policy.attempts => {
        warn!(
          operation,
          attempt,
          next_delay_ms = delay.as_millis() as u64,
          error = %e,
          "transient store failure, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(policy.max_backoff);
        attempt += 1;
      }
      res => {
        if res.is_ok() && attempt > 1 {
          info!(operation, attempt, "store operation recovered after retry");
        }
        return res;
      }
    }
  }
}
