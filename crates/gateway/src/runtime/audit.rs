//! Audit pipeline.
//!
//! A single background worker drains a bounded queue and writes each entry
//! through the catalog. Producers never block: a full queue is reported as
//! `QueueFull` and surfaced by callers as a warning, not a user-visible
//! error. `wait_idle` lets request handlers offer a short flush so that a
//! `GET /logs` immediately after a mutation observes the new entry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use hsd_catalog::{Catalog, NewAuditEntry};

/// Per-entry catalog write budget.
const WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Best-effort flush offered by request handlers after a mutation.
pub const HANDLER_FLUSH: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuditLogError {
    #[error("audit queue is full")]
    QueueFull,
    #[error("audit pipeline is closed")]
    Closed,
}

pub struct AuditPipeline {
    tx: Mutex<Option<mpsc::Sender<NewAuditEntry>>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditPipeline {
    /// Spawn the single writer worker over a queue of `queue_size` slots.
    pub fn spawn(catalog: Catalog, queue_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<NewAuditEntry>(queue_size);
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let worker_pending = pending.clone();
        let worker_idle = idle.clone();
        let worker = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                match tokio::time::timeout(WRITE_TIMEOUT, catalog.insert_audit_entry(&entry))
                    .await
                {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(
                            operation = %entry.operation,
                            error = %e,
                            "audit write failed"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            operation = %entry.operation,
                            "audit write timed out"
                        );
                    }
                }
                if worker_pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    worker_idle.notify_waiters();
                }
            }
            tracing::debug!("audit worker exiting");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            pending,
            idle,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue one entry without blocking.
    ///
    /// Fills in defaults: blank `actor` becomes `"local"`, and the timestamp
    /// is stamped at enqueue time (UTC, microsecond precision) so queue
    /// order and timestamp order agree.
    pub fn log(&self, mut entry: NewAuditEntry) -> Result<(), AuditLogError> {
        if entry.actor.trim().is_empty() {
            entry.actor = "local".to_owned();
        }
        entry.ts = Utc::now().trunc_subsecs(6);

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(AuditLogError::Closed);
        };

        // Count before sending so wait_idle never observes a dropped-to-zero
        // window while an entry is in flight.
        self.pending.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.settle_failed_enqueue();
                Err(AuditLogError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.settle_failed_enqueue();
                Err(AuditLogError::Closed)
            }
        }
    }

    fn settle_failed_enqueue(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Outstanding (enqueued but not yet written) entries.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Block until the pipeline drains or `timeout` elapses. Returns whether
    /// the pipeline was idle on return.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before re-checking, so a notify between the
            // check and the await is not lost.
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return true;
            }
            tokio::pin!(notified);
            if tokio::time::timeout_at(deadline, &mut notified).await.is_err() {
                return self.pending.load(Ordering::SeqCst) == 0;
            }
        }
    }

    /// Seal the queue (subsequent `log` fails `Closed`), drain outstanding
    /// work, and join the worker. Returns whether the worker exited within
    /// `timeout`.
    pub async fn close(&self, timeout: Duration) -> bool {
        // Dropping the sender ends the worker's recv loop after the queue
        // drains.
        let tx = self.tx.lock().take();
        drop(tx);

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => tokio::time::timeout(timeout, handle).await.is_ok(),
            None => true,
        }
    }
}
