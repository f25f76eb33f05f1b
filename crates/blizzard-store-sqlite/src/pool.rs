//! A bounded pool of SQLite connections.
//!
//! A semaphore caps the number of checked-out connections; acquisition waits
//! at most `acquire_timeout` and then fails with [`Error::PoolTimeout`]. Idle
//! connections are health-checked on checkout and replaced when they fail.
//! A [`PooledConnection`] returns itself to the pool when dropped, on every
//! exit path.

use std::{ops::Deref, path::PathBuf, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::{
  Error, Result,
  retry::{RetryPolicy, with_retry},
  schema::{CONNECTION_PRAGMAS, SCHEMA},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  pub path:            PathBuf,
  /// Maximum simultaneously checked-out connections.
  pub size:            usize,
  pub acquire_timeout: Duration,
  /// Extra attempts when opening a connection fails.
  pub connect_retries: u32,
  /// Initial delay between connection attempts; doubles per attempt.
  pub retry_backoff:   Duration,
}

impl PoolConfig {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path:            path.into(),
      size:            8,
      acquire_timeout: Duration::from_secs(5),
      connect_retries: 3,
      retry_backoff:   Duration::from_millis(100),
    }
  }

  /// The retry policy for connecting and for single store operations.
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.connect_retries, self.retry_backoff)
  }
}

struct Inner {
  config:  PoolConfig,
  idle:    Mutex<Vec<Connection>>,
  permits: Arc<Semaphore>,
}

/// Cloning is cheap; all clones share one set of connections.
#[derive(Clone)]
pub struct Pool {
  inner: Arc<Inner>,
}

impl Pool {
  /// Open a pool at `config.path`, creating the schema if needed.
  pub async fn open(config: PoolConfig) -> Result<Self> {
    let size = config.size.max(1);
    let pool = Self {
      inner: Arc::new(Inner {
        permits: Arc::new(Semaphore::new(size)),
        idle: Mutex::new(Vec::with_capacity(size)),
        config,
      }),
    };

    let conn = pool.connect().await?;
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    pool.inner.idle.lock().push(conn);

    info!(
      path = %pool.inner.config.path.display(),
      size,
      "opened connection pool"
    );
    Ok(pool)
  }

  pub fn config(&self) -> &PoolConfig { &self.inner.config }

  /// Connections currently checked out.
  pub fn in_use(&self) -> usize {
    self.inner.config.size.max(1) - self.inner.permits.available_permits()
  }

  pub fn idle_count(&self) -> usize { self.inner.idle.lock().len() }

  /// Check out a connection, waiting at most `acquire_timeout` for a free
  /// slot.
  pub async fn acquire(&self) -> Result<PooledConnection> {
    let timeout = self.inner.config.acquire_timeout;
    let permit = tokio::time::timeout(
      timeout,
      self.inner.permits.clone().acquire_owned(),
    )
    .await
    .map_err(|_| Error::PoolTimeout(timeout))?
    .map_err(|_| Error::PoolClosed)?;

    while let Some(conn) = self.take_idle() {
      if is_healthy(&conn).await {
        return Ok(self.wrap(conn, permit));
      }
      debug!("discarding unhealthy pooled connection");
    }

    let conn = self.connect().await?;
    Ok(self.wrap(conn, permit))
  }

  /// Refuse further checkouts and drop idle connections. Checked-out
  /// connections are closed when returned.
  pub fn close(&self) {
    self.inner.permits.close();
    self.inner.idle.lock().clear();
  }

  fn take_idle(&self) -> Option<Connection> { self.inner.idle.lock().pop() }

  fn wrap(&self, conn: Connection, permit: OwnedSemaphorePermit) -> PooledConnection {
    PooledConnection {
      conn,
      inner: self.inner.clone(),
      _permit: permit,
    }
  }

  async fn connect(&self) -> Result<Connection> {
    let path = &self.inner.config.path;
    with_retry(&self.inner.config.retry_policy(), "connect", || async move {
      let conn = Connection::open(path).await.map_err(Error::Connect)?;
      conn
        .call(|conn| {
          conn.execute_batch(CONNECTION_PRAGMAS)?;
          Ok(())
        })
        .await
        .map_err(Error::Connect)?;
      Ok(conn)
    })
    .await
  }
}

async fn is_healthy(conn: &Connection) -> bool {
  conn
    .call(|conn| {
      conn.query_row("SELECT 1", [], |_| Ok(()))?;
      Ok(())
    })
    .await
    .is_ok()
}

// ─── Checked-out connection ──────────────────────────────────────────────────

/// A connection on loan from a [`Pool`]. Dereferences to the underlying
/// [`tokio_rusqlite::Connection`].
pub struct PooledConnection {
  conn:    Connection,
  inner:   Arc<Inner>,
  // Released after `drop` has returned the connection.
  _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
  type Target = Connection;

  fn deref(&self) -> &Connection { &self.conn }
}

impl Drop for PooledConnection {
  fn drop(&mut self) {
    if !self.inner.permits.is_closed() {
      self.inner.idle.lock().push(self.conn.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_config(size: usize) -> PoolConfig {
    let path = std::env::temp_dir()
      .join(format!("blizzard-pool-{}.db", uuid::Uuid::new_v4()));
    PoolConfig {
      size,
      acquire_timeout: Duration::from_millis(50),
      ..PoolConfig::new(path)
    }
  }

  #[tokio::test]
  async fn acquire_times_out_when_exhausted() {
    let pool = Pool::open(temp_config(1)).await.unwrap();
    let held = pool.acquire().await.unwrap();
    assert_eq!(pool.in_use(), 1);

    let err = pool.acquire().await.err().unwrap();
    assert!(matches!(err, Error::PoolTimeout(_)));
    drop(held);

    assert_eq!(pool.in_use(), 0);
    assert!(pool.acquire().await.is_ok());
  }

  #[tokio::test]
  async fn connections_return_on_every_exit_path() {
    let pool = Pool::open(temp_config(2)).await.unwrap();

    let result: Result<()> = async {
      let conn = pool.acquire().await?;
      conn
        .call(|conn| {
          conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
          Ok(())
        })
        .await?;
      Ok(())
    }
    .await;

    assert!(result.is_err());
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.idle_count(), 1);
  }

  #[tokio::test]
  async fn closed_pool_refuses_checkout() {
    let pool = Pool::open(temp_config(1)).await.unwrap();
    pool.close();
    assert!(matches!(pool.acquire().await.err(), Some(Error::PoolClosed)));
  }
}
