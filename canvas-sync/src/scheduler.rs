//! Debounced, single-flight background saves.
//!
//! ```text
//! schedule(doc) ──► mpsc ──► worker ──(quiet window)──► spawn_blocking(reconcile)
//!                              │                               │
//!                              ├── watch<SaveStatus>  ◄────────┤
//!                              └── watch<Option<Document>> ◄───┘
//! ```
//!
//! One worker task owns the [`Reconciler`]. It only suspends on its command
//! channel, its debounce timer and the blocking-pool reconciliation, so at
//! most one save is ever in flight. Commands that arrive while a save runs
//! wait in the channel and coalesce into a single follow-up save.

use std::future;
use std::time::Duration;

use canvas_core::Document;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::SyncError;
use crate::reconcile::{Reconciled, Reconciler};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiet window after the last `schedule` call (default: 1s)
    pub debounce: Duration,
    /// Retries after a storage failure before giving up (default: 5)
    pub max_retries: u32,
    /// Backoff multiplier per retry (default: 2)
    pub backoff_factor: u32,
    /// Upper bound for a single backoff (default: 30s)
    pub max_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            max_retries: 5,
            backoff_factor: 2,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Short windows for tests.
    pub fn for_testing() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            max_retries: 3,
            backoff_factor: 2,
            max_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1).saturating_pow(attempt);
        self.debounce
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Observable save state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveStatus {
    /// A reconciliation is running right now.
    pub in_progress: bool,
    /// A snapshot is waiting for its quiet window (or a retry).
    pub pending: bool,
    pub completed: u64,
    pub failed: u64,
    /// Error of the most recent save, cleared by the next success.
    pub last_error: Option<String>,
}

enum Command {
    Save {
        document: Document,
        requested_at: Instant,
    },
    Flush(oneshot::Sender<Result<bool, SyncError>>),
    Cancel(oneshot::Sender<bool>),
}

struct Pending {
    document: Document,
    deadline: Instant,
    attempt: u32,
}

/// Handle to the background save worker.
///
/// Must be created inside a Tokio runtime.
pub struct SaveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveStatus>,
    reconciled: watch::Receiver<Option<Document>>,
    worker: JoinHandle<()>,
}

impl SaveScheduler {
    pub fn spawn(reconciler: Reconciler, config: SchedulerConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SaveStatus::default());
        let (reconciled_tx, reconciled) = watch::channel(None);

        let worker = Worker {
            reconciler,
            config,
            status: status_tx,
            reconciled: reconciled_tx,
        };
        let worker = tokio::spawn(worker.run(rx));

        Self {
            commands,
            status,
            reconciled,
            worker,
        }
    }

    /// Queue `document` for saving. Replaces any snapshot still waiting for
    /// its quiet window.
    pub fn schedule(&self, document: Document) -> Result<(), SyncError> {
        self.commands
            .send(Command::Save {
                document,
                requested_at: Instant::now(),
            })
            .map_err(|_| SyncError::SchedulerClosed)
    }

    /// Save the pending snapshot now. `Ok(false)` when nothing was pending.
    pub async fn flush(&self) -> Result<bool, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| SyncError::SchedulerClosed)?;
        rx.await.map_err(|_| SyncError::SchedulerClosed)?
    }

    /// Drop the pending snapshot, if any. Once this returns no save is in
    /// flight either.
    pub async fn cancel(&self) -> Result<bool, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Cancel(tx))
            .map_err(|_| SyncError::SchedulerClosed)?;
        rx.await.map_err(|_| SyncError::SchedulerClosed)
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn is_saving(&self) -> bool {
        self.status.borrow().in_progress
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Latest snapshot written to storage (merged with whatever was there).
    pub fn reconciled(&self) -> watch::Receiver<Option<Document>> {
        self.reconciled.clone()
    }

    /// Save whatever is pending, then stop the worker.
    pub async fn shutdown(self) -> Result<(), SyncError> {
        let Self {
            commands, worker, ..
        } = self;
        drop(commands);
        worker.await.map_err(|e| SyncError::Worker(e.to_string()))
    }
}

struct Worker {
    reconciler: Reconciler,
    config: SchedulerConfig,
    status: watch::Sender<SaveStatus>,
    reconciled: watch::Sender<Option<Document>>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        log::debug!("Save worker started for slot '{}'", self.reconciler.slot());
        let mut pending: Option<Pending> = None;

        loop {
            let deadline = pending.as_ref().map(|p| p.deadline);
            let timer = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => future::pending::<()>().await,
                }
            };

            tokio::select! {
                // Queued commands before the timer.
                biased;

                cmd = rx.recv() => match cmd {
                    Some(Command::Save { document, requested_at }) => {
                        if pending.is_some() {
                            log::trace!("Superseding pending save");
                        }
                        pending = Some(Pending {
                            document,
                            deadline: requested_at + self.config.debounce,
                            attempt: 0,
                        });
                    }
                    Some(Command::Flush(reply)) => {
                        let result = match pending.take() {
                            Some(p) => {
                                let result = self.save(&p.document).await;
                                pending = self.after_failure(p, result.as_ref().err());
                                result.map(|_| true)
                            }
                            None => Ok(false),
                        };
                        let _ = reply.send(result);
                    }
                    Some(Command::Cancel(reply)) => {
                        let dropped = pending.take().is_some();
                        if dropped {
                            log::debug!("Pending save cancelled");
                        }
                        let _ = reply.send(dropped);
                    }
                    None => {
                        if let Some(p) = pending.take() {
                            log::info!("Saving pending snapshot before shutdown");
                            if let Err(e) = self.save(&p.document).await {
                                log::error!("Final save failed: {e}");
                            }
                        }
                        self.set_pending(false);
                        break;
                    }
                },
                _ = timer => {
                    if let Some(p) = pending.take() {
                        let result = self.save(&p.document).await;
                        pending = self.after_failure(p, result.as_ref().err());
                    }
                }
            }

            self.set_pending(pending.is_some());
        }

        log::debug!("Save worker stopped for slot '{}'", self.reconciler.slot());
    }

    /// Re-arm `p` with backoff when the failure is transient and attempts
    /// remain.
    fn after_failure(&self, p: Pending, error: Option<&SyncError>) -> Option<Pending> {
        let error = error?;
        if !error.is_retryable() {
            log::error!("Save failed, not retrying: {error}");
            return None;
        }
        if p.attempt >= self.config.max_retries {
            log::error!(
                "Save failed after {} retries, keeping local state: {error}",
                p.attempt
            );
            return None;
        }
        let attempt = p.attempt + 1;
        let delay = self.config.backoff(attempt);
        log::warn!("Save failed ({error}); retry {attempt} in {delay:?}");
        Some(Pending {
            document: p.document,
            deadline: Instant::now() + delay,
            attempt,
        })
    }

    async fn save(&self, document: &Document) -> Result<Reconciled, SyncError> {
        self.status.send_modify(|s| {
            s.in_progress = true;
            s.pending = false;
        });

        let reconciler = self.reconciler.clone();
        let document = document.clone();
        let result = run_blocking(move || reconciler.reconcile(&document)).await;

        match &result {
            Ok(reconciled) => {
                self.reconciled.send_replace(Some(reconciled.document.clone()));
                self.status.send_modify(|s| {
                    s.in_progress = false;
                    s.completed += 1;
                    s.last_error = None;
                });
            }
            Err(e) => {
                self.status.send_modify(|s| {
                    s.in_progress = false;
                    s.failed += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }
        result
    }

    fn set_pending(&self, pending: bool) {
        self.status.send_if_modified(|s| {
            if s.pending == pending {
                return false;
            }
            s.pending = pending;
            true
        });
    }
}

/// Run blocking storage work on Tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))?
}
