//! Background autosave with debounce, periodic ticks and bounded retries.
//!
//! The session publishes snapshots into a watch channel, so the task always
//! sees only the latest state. Writes are spaced at least `debounce` apart;
//! a periodic tick also flushes anything still pending. Failed writes are
//! retried with exponential backoff until the policy gives up, at which point
//! the status turns [`SaveStatus::Unavailable`].

use crate::config::{AutoSaveConfig, RetryConfig};
use crate::retry::RetryPolicy;
use lifequest_core::{OverlayRequest, PlayerInfo};
use persistence::{KeyValueStore, PersistError, SaveKey, SaveManager, SaveReceipt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// State handed to the saver. `revision` increases with every mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub player: PlayerInfo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing written yet.
    Idle,
    Saved { version: u64, timestamp: i64 },
    Retrying { attempt: u32, reason: String },
    /// Retries exhausted for the last snapshot.
    Unavailable { reason: String },
}

/// Save manager shared between the saver task and other readers.
pub type SharedSaves<S> = Arc<Mutex<SaveManager<S>>>;

/// Handle to a running autosave task.
pub struct AutoSave {
    snapshots: watch::Sender<Option<Snapshot>>,
    status: watch::Receiver<SaveStatus>,
    notices: mpsc::UnboundedReceiver<OverlayRequest>,
    task: JoinHandle<()>,
}

struct Saver<S: KeyValueStore + 'static> {
    saves: SharedSaves<S>,
    key: SaveKey,
    /// Version stored before this task started; revisions are offset by it.
    base_version: u64,
    retry: RetryPolicy,
    status: watch::Sender<SaveStatus>,
    notices: mpsc::UnboundedSender<OverlayRequest>,
}

impl AutoSave {
    /// Start the saver for `key`. Must be called inside a tokio runtime.
    pub fn spawn<S: KeyValueStore + 'static>(
        saves: SharedSaves<S>,
        key: SaveKey,
        cfg: &AutoSaveConfig,
        retry: &RetryConfig,
    ) -> Self {
        let base_version = match saves.lock() {
            Ok(m) => m.current_version(&key).unwrap_or_else(|e| {
                warn!(%key, error = %e, "could not read stored version, starting at 0");
                0
            }),
            Err(_) => 0,
        };
        let (snap_tx, snap_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let saver = Saver {
            saves,
            key,
            base_version,
            retry: RetryPolicy::new(retry),
            status: status_tx,
            notices: notice_tx,
        };
        let task = tokio::spawn(saver.run(snap_rx, cfg.debounce(), cfg.interval()));
        Self {
            snapshots: snap_tx,
            status: status_rx,
            notices: notice_rx,
            task,
        }
    }

    /// Queue a snapshot; replaces any snapshot not yet written.
    pub fn publish(&self, snapshot: Snapshot) {
        // The receiver only goes away once the task has ended.
        let _ = self.snapshots.send(Some(snapshot));
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Notifications produced since the last call.
    pub fn drain_notices(&mut self) -> Vec<OverlayRequest> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }

    /// Flush the pending snapshot, stop the task and return the final status
    /// with any undelivered notifications.
    pub async fn shutdown(self) -> (SaveStatus, Vec<OverlayRequest>) {
        let AutoSave {
            snapshots,
            status,
            mut notices,
            task,
        } = self;
        drop(snapshots);
        if let Err(e) = task.await {
            error!(error = %e, "autosave task failed");
        }
        let mut rest = Vec::new();
        while let Ok(n) = notices.try_recv() {
            rest.push(n);
        }
        let last = status.borrow().clone();
        (last, rest)
    }
}

impl<S: KeyValueStore + 'static> Saver<S> {
    async fn run(mut self, mut rx: watch::Receiver<Option<Snapshot>>, debounce: Duration, interval: Duration) {
        let mut saved_revision = 0u64;
        let mut last_write: Option<Instant> = None;
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let mut closed = tokio::select! {
                changed = rx.changed() => changed.is_err(),
                _ = ticker.tick() => false,
            };
            if !closed {
                if let Some(at) = last_write {
                    closed = wait_until(&mut rx, at + debounce).await;
                }
            }

            let pending = rx.borrow_and_update().clone();
            if let Some(snap) = pending.filter(|s| s.revision > saved_revision) {
                self.persist(&snap).await;
                saved_revision = snap.revision;
                last_write = Some(Instant::now());
            }
            if closed {
                debug!("autosave stopped");
                break;
            }
        }
    }

    async fn persist(&mut self, snap: &Snapshot) -> Option<SaveReceipt> {
        let version = self.base_version + snap.revision;
        let mut last_reason = String::new();
        for attempt in 1..=self.retry.max_attempts() {
            match self.write(snap.player.clone(), version).await {
                Ok(receipt) => {
                    let _ = self.status.send(SaveStatus::Saved {
                        version: receipt.version,
                        timestamp: receipt.timestamp,
                    });
                    return Some(receipt);
                }
                Err(PersistError::StaleWrite { stored, attempted, .. }) => {
                    info!(stored, attempted, "newer save already present, skipping snapshot");
                    return None;
                }
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(attempt, error = %e, "autosave failed");
                    let _ = self.notices.send(OverlayRequest::SaveFailed {
                        attempt,
                        reason: last_reason.clone(),
                    });
                    if !e.is_transient() {
                        break;
                    }
                    let _ = self.status.send(SaveStatus::Retrying {
                        attempt,
                        reason: last_reason.clone(),
                    });
                    if attempt < self.retry.max_attempts() {
                        time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        error!(key = %self.key, reason = %last_reason, "giving up on save");
        let _ = self.status.send(SaveStatus::Unavailable {
            reason: last_reason.clone(),
        });
        let _ = self
            .notices
            .send(OverlayRequest::PersistentSaveUnavailable { reason: last_reason });
        None
    }

    async fn write(&self, player: PlayerInfo, version: u64) -> Result<SaveReceipt, PersistError> {
        let saves = Arc::clone(&self.saves);
        let key = self.key.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut m = saves.lock().map_err(|_| {
                PersistError::Io(std::io::Error::new(std::io::ErrorKind::Other, "save store lock poisoned"))
            })?;
            m.save_versioned(&key, &player, version)
        })
        .await;
        match joined {
            Ok(res) => res,
            Err(e) => Err(PersistError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
        }
    }
}

/// Sleep until `deadline`, returning early with `true` if the sender closes.
async fn wait_until(rx: &mut watch::Receiver<Option<Snapshot>>, deadline: Instant) -> bool {
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return false,
            changed = rx.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
        }
    }
}
