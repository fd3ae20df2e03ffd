//! [`CounterStore`]: SQLite-backed access counters with an in-memory mirror.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, SqlitePool,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::Kind;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS counter (
    type  TEXT    PRIMARY KEY NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
)";
const SEED_ROW: &str = "INSERT OR IGNORE INTO counter (type, count) VALUES (?, 0)";
const SELECT_ALL: &str = "SELECT type, count FROM counter";
const INCREMENT: &str = "UPDATE counter SET count = count + 1 WHERE type = ?";

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced by the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or its schema could not be ensured.
    #[error("counter store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A persisted count is outside the `u64` range.
    #[error("counter {kind} holds invalid value {value}")]
    Corrupt { kind: Kind, value: i64 },

    /// The increment transaction failed and was rolled back.
    #[error("failed to increment {kind} counter: {source}")]
    Write {
        kind: Kind,
        #[source]
        source: sqlx::Error,
    },

    /// The row for this kind vanished from the table.
    #[error("counter row for {0} is missing")]
    MissingCounter(Kind),

    /// The database could not be released cleanly.
    #[error("failed to close counter store: {0}")]
    Close(#[source] sqlx::Error),
}

/// Durable access counters with lock-free cached reads.
///
/// Cloning is cheap; every clone shares the same pool and mirror.
#[derive(Clone, Debug)]
pub struct CounterStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    pool: SqlitePool,
    /// Last committed value per kind, indexed by [`Kind::index`].
    counts: [AtomicU64; 3],
    /// Serializes increments so the row update and the mirror update are
    /// indivisible with respect to each other.
    writer: Mutex<()>,
}

impl CounterStore {
    /// Open the database at `dsn`, ensure the schema, and load every count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or the
    /// schema cannot be created, and [`StoreError::Corrupt`] if a stored count
    /// is negative.
    #[instrument(skip_all, fields(dsn = %dsn))]
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(StoreError::Unavailable)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StoreError::Unavailable)?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(StoreError::Unavailable)?;
        for kind in Kind::ALL {
            sqlx::query(SEED_ROW)
                .bind(kind.as_str())
                .execute(&pool)
                .await
                .map_err(StoreError::Unavailable)?;
        }

        let counts = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&pool)
            .await
            .map_err(StoreError::Unavailable)?;
        for row in rows {
            let name: String = row.try_get("type").map_err(StoreError::Unavailable)?;
            let raw: i64 = row.try_get("count").map_err(StoreError::Unavailable)?;
            let Some(kind) = Kind::from_column(&name) else {
                debug!(counter = %name, "ignoring unknown counter row");
                continue;
            };
            let value = u64::try_from(raw).map_err(|_| StoreError::Corrupt { kind, value: raw })?;
            counts[kind.index()].store(value, Ordering::Release);
        }

        let store = Self {
            inner: Arc::new(Inner {
                pool,
                counts,
                writer: Mutex::new(()),
            }),
        };
        info!(
            random = store.count(Kind::Random),
            diceware = store.count(Kind::Diceware),
            pin = store.count(Kind::Pin),
            "counter store opened"
        );
        Ok(store)
    }

    /// Last committed count for `kind`. Never performs I/O.
    pub fn count(&self, kind: Kind) -> u64 {
        self.inner.counts[kind.index()].load(Ordering::Acquire)
    }

    /// Persist one more issuance of `kind`, then advance the mirror.
    ///
    /// Either both the row and the mirror advance by exactly one, or neither
    /// changes and an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the transaction could not be started,
    /// applied, or committed, and [`StoreError::MissingCounter`] if the row for
    /// `kind` no longer exists.
    pub async fn increment(&self, kind: Kind) -> Result<(), StoreError> {
        let _writer = self.inner.writer.lock().await;

        let mut tx = self
            .inner
            .pool
            .begin()
            .await
            .map_err(|source| StoreError::Write { kind, source })?;

        let applied = sqlx::query(INCREMENT)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await;

        let failure = match applied {
            Ok(done) if done.rows_affected() == 1 => None,
            Ok(_) => Some(StoreError::MissingCounter(kind)),
            Err(source) => Some(StoreError::Write { kind, source }),
        };

        if let Some(err) = failure {
            if let Err(rollback) = tx.rollback().await {
                warn!(%kind, error = %rollback, "failed to roll back counter transaction");
            }
            return Err(err);
        }

        if let Err(source) = tx.commit().await {
            warn!(%kind, error = %source, "failed to commit counter transaction");
            return Err(StoreError::Write { kind, source });
        }

        self.inner.counts[kind.index()].fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Lightweight liveness check against the database.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if `SELECT 1` fails or the pool is closed.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.inner.pool)
            .await?;
        if one != 1 {
            return Err(sqlx::Error::Protocol(format!("liveness check returned {one}")));
        }
        Ok(())
    }

    /// Checkpoint the WAL and release every pooled connection.
    ///
    /// Call once, at teardown. The pool is closed even if the checkpoint fails.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Close`] if the checkpoint failed.
    pub async fn close(&self) -> Result<(), StoreError> {
        let checkpoint = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.inner.pool)
            .await;
        self.inner.pool.close().await;
        checkpoint.map_err(StoreError::Close)?;
        info!("counter store closed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }
}
