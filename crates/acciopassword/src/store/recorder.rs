//! Background recording of issued passwords.
//!
//! Generation handlers never wait on the database. They push the [`Kind`] onto a bounded
//! queue via [`Recorder::record`]; a single task drains the queue into
//! [`CounterStore::increment`]. A full queue drops the tally and logs it.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

use super::{CounterStore, Kind};

/// Queue capacity between request handlers and the drain task.
pub const QUEUE_CAPACITY: usize = 4096;

/// Producer half, cloned into every request handler.
#[derive(Clone, Debug)]
pub struct Recorder {
    tx: mpsc::Sender<Kind>,
}

/// Drain task handle, kept by `main` to flush the queue at shutdown.
#[derive(Debug)]
pub struct RecorderTask {
    handle: JoinHandle<u64>,
}

impl Recorder {
    /// Spawn the drain task for `store`.
    pub fn spawn(store: CounterStore) -> (Self, RecorderTask) {
        Self::with_capacity(store, QUEUE_CAPACITY)
    }

    pub(crate) fn with_capacity(store: CounterStore, capacity: usize) -> (Self, RecorderTask) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(drain(store, rx));
        (Self { tx }, RecorderTask { handle })
    }

    /// Queue one issuance of `kind`. Never blocks.
    pub fn record(&self, kind: Kind) {
        match self.tx.try_send(kind) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(kind)) => {
                warn!(%kind, "increment queue full; dropping access count");
            }
            Err(mpsc::error::TrySendError::Closed(kind)) => {
                warn!(%kind, "increment queue closed; dropping access count");
            }
        }
    }
}

impl RecorderTask {
    /// Wait for the queue to drain once every [`Recorder`] has been dropped.
    ///
    /// Returns the number of increments written, or `None` if `timeout`
    /// elapsed first or the task failed.
    pub async fn finish(self, timeout: Duration) -> Option<u64> {
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(written)) => Some(written),
            Ok(Err(e)) => {
                error!(error = %e, "increment drain task failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "increment queue not drained in time");
                None
            }
        }
    }
}

async fn drain(store: CounterStore, mut rx: mpsc::Receiver<Kind>) -> u64 {
    let mut written = 0u64;
    while let Some(kind) = rx.recv().await {
        match store.increment(kind).await {
            Ok(()) => written += 1,
            Err(e) => error!(%kind, error = %e, "failed to increment access counter"),
        }
    }
    debug!(written, "increment queue drained");
    written
}
