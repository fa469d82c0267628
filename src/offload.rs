//! Upload worker and retention sweep.
//!
//! The coordinator owns the remote store and runs on a single background
//! thread, fed finished clips through an unbounded channel so the frame loop
//! never blocks on upload pace. Responsibilities:
//!
//! - **Upload worker**: drains the clip queue FIFO. Transient failures retry
//!   with bounded exponential backoff plus jitter; after the attempt budget
//!   is spent the failure is logged as permanent and the file stays on disk.
//!   On confirmed upload the local file is optionally deleted.
//! - **Auth pause**: a missing/rejected credential is not retried like a
//!   network error. Uploads pause with clips still queued, and the worker
//!   re-checks `authenticate` on an interval until the operator has
//!   provisioned the credential. Frame capture is unaffected.
//! - **Retention sweep**: on a fixed interval, lists remote files older than
//!   the configured age and deletes them. Operates purely on remote state,
//!   so files uploaded by earlier process instances are swept too. Sweep
//!   failures are logged and retried on the next interval.
//!
//! Shutdown: when the sending side closes, the worker drains what it can,
//! logs anything still pending, and exits; pending clips are recovered from
//! the recordings directory on the next start.

use anyhow::{Context, Result};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::clip::{Clip, UploadState};
use crate::store::{RemoteStore, StoreError};

/// How long one intake wait lasts before the worker re-checks its timers.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct OffloadConfig {
    /// Delete the local file after a confirmed upload.
    pub delete_local_after_upload: bool,
    /// Remote files older than this are swept. `None` disables the sweep.
    pub remote_max_age: Option<Duration>,
    /// Interval between retention sweeps.
    pub sweep_interval: Duration,
    /// Total upload attempts per clip before giving up.
    pub max_upload_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// How often to re-check authentication while uploads are paused.
    pub auth_recheck: Duration,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            delete_local_after_upload: false,
            remote_max_age: None,
            sweep_interval: Duration::from_secs(3600),
            max_upload_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(60),
            auth_recheck: Duration::from_secs(30),
        }
    }
}

/// Counters published by the worker thread.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    upload_attempts: AtomicU64,
    clips_uploaded: AtomicU64,
    clips_failed: AtomicU64,
    locals_deleted: AtomicU64,
    remote_deleted: AtomicU64,
    sweeps: AtomicU64,
}

impl CoordinatorStats {
    pub fn upload_attempts(&self) -> u64 {
        self.upload_attempts.load(Ordering::Relaxed)
    }
    pub fn clips_uploaded(&self) -> u64 {
        self.clips_uploaded.load(Ordering::Relaxed)
    }
    pub fn clips_failed(&self) -> u64 {
        self.clips_failed.load(Ordering::Relaxed)
    }
    pub fn locals_deleted(&self) -> u64 {
        self.locals_deleted.load(Ordering::Relaxed)
    }
    pub fn remote_deleted(&self) -> u64 {
        self.remote_deleted.load(Ordering::Relaxed)
    }
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

/// Handle to the running worker.
pub struct CoordinatorHandle {
    stats: Arc<CoordinatorStats>,
    join: thread::JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn stats(&self) -> Arc<CoordinatorStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish draining. Call after dropping the
    /// clip sender.
    pub fn join(self) {
        if self.join.join().is_err() {
            log::error!("offload worker panicked");
        }
    }
}

/// Upload/retention coordinator.
pub struct Coordinator {
    cfg: OffloadConfig,
}

impl Coordinator {
    pub fn new(cfg: OffloadConfig) -> Self {
        Self { cfg }
    }

    /// Spawn the worker thread. Returns the clip sender (the producer side
    /// of the queue) and a handle for stats and joining.
    pub fn spawn<S: RemoteStore + 'static>(
        self,
        store: S,
    ) -> Result<(Sender<Clip>, CoordinatorHandle)> {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(CoordinatorStats::default());
        let worker_stats = Arc::clone(&stats);
        let join = thread::Builder::new()
            .name("offload".to_string())
            .spawn(move || {
                Worker {
                    cfg: self.cfg,
                    store,
                    stats: worker_stats,
                }
                .run(rx);
            })
            .context("spawn offload worker")?;
        Ok((tx, CoordinatorHandle { stats, join }))
    }
}

struct PendingUpload {
    clip: Clip,
    attempts: u32,
    not_before: Instant,
}

struct Worker<S: RemoteStore> {
    cfg: OffloadConfig,
    store: S,
    stats: Arc<CoordinatorStats>,
}

impl<S: RemoteStore> Worker<S> {
    fn run(mut self, rx: Receiver<Clip>) {
        let mut queue: VecDeque<PendingUpload> = VecDeque::new();
        let mut next_sweep = Instant::now();
        let mut auth_recheck_at: Option<Instant> = None;
        let mut disconnected = false;

        loop {
            if !disconnected {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(clip) => queue.push_back(self.accept(clip)),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => disconnected = true,
                }
                while let Ok(clip) = rx.try_recv() {
                    queue.push_back(self.accept(clip));
                }
            } else {
                thread::sleep(Duration::from_millis(10));
            }

            self.check_auth(&mut auth_recheck_at);
            if auth_recheck_at.is_none() {
                self.process_queue(&mut queue, &mut auth_recheck_at);
            }

            if let Some(max_age) = self.cfg.remote_max_age {
                if Instant::now() >= next_sweep {
                    self.sweep(max_age);
                    next_sweep = Instant::now() + self.cfg.sweep_interval;
                }
            }

            if disconnected {
                if queue.is_empty() {
                    break;
                }
                if auth_recheck_at.is_some() {
                    log::warn!(
                        "shutting down with {} clip(s) awaiting authentication; \
                         they will resume on next start",
                        queue.len()
                    );
                    break;
                }
            }
        }
        log::info!("offload worker stopped");
    }

    fn accept(&self, clip: Clip) -> PendingUpload {
        log::info!(
            "queued clip {} ({:.1}s) for upload",
            clip.path.display(),
            clip.duration_secs
        );
        PendingUpload {
            clip,
            attempts: 0,
            not_before: Instant::now(),
        }
    }

    /// While paused, probe `authenticate` on the recheck interval.
    fn check_auth(&mut self, auth_recheck_at: &mut Option<Instant>) {
        let Some(recheck_at) = *auth_recheck_at else {
            return;
        };
        if Instant::now() < recheck_at {
            return;
        }
        match self.store.authenticate() {
            Ok(()) => {
                log::info!("credential available, resuming uploads");
                *auth_recheck_at = None;
            }
            Err(StoreError::AuthRequired(_)) => {
                *auth_recheck_at = Some(Instant::now() + self.cfg.auth_recheck);
            }
            Err(e) => {
                log::warn!("authentication check failed: {}", e);
                *auth_recheck_at = Some(Instant::now() + self.cfg.auth_recheck);
            }
        }
    }

    /// Attempt due uploads, strictly FIFO: a backing-off head blocks the
    /// queue so clips land on the remote in recording order.
    fn process_queue(
        &mut self,
        queue: &mut VecDeque<PendingUpload>,
        auth_recheck_at: &mut Option<Instant>,
    ) {
        while let Some(front) = queue.front_mut() {
            if front.not_before > Instant::now() {
                return;
            }

            front.attempts += 1;
            self.stats.upload_attempts.fetch_add(1, Ordering::Relaxed);
            let name = front.clip.file_name();
            match self.store.upload(&front.clip.path, &name) {
                Ok(id) => {
                    front.clip.state = UploadState::Uploaded;
                    self.stats.clips_uploaded.fetch_add(1, Ordering::Relaxed);
                    log::info!("uploaded {} as {}", front.clip.path.display(), id);
                    if self.cfg.delete_local_after_upload {
                        self.delete_local(front);
                    } else {
                        self.mark_uploaded(front);
                    }
                    queue.pop_front();
                }
                Err(StoreError::AuthRequired(msg)) => {
                    // Not counted against the attempt budget: nothing was
                    // wrong with the clip or the network.
                    front.attempts -= 1;
                    self.stats.upload_attempts.fetch_sub(1, Ordering::Relaxed);
                    log::warn!(
                        "uploads paused, operator action needed: {} \
                         (capture and recording continue)",
                        msg
                    );
                    *auth_recheck_at = Some(Instant::now() + self.cfg.auth_recheck);
                    return;
                }
                Err(e) if e.is_retryable() && front.attempts < self.cfg.max_upload_attempts => {
                    front.clip.state = UploadState::Failed;
                    let delay = self.backoff_delay(front.attempts);
                    log::warn!(
                        "upload attempt {}/{} for {} failed: {}; retrying in {:.1}s",
                        front.attempts,
                        self.cfg.max_upload_attempts,
                        front.clip.path.display(),
                        e,
                        delay.as_secs_f64()
                    );
                    front.not_before = Instant::now() + delay;
                    return;
                }
                Err(e) => {
                    self.stats.clips_failed.fetch_add(1, Ordering::Relaxed);
                    log::error!(
                        "giving up on {} after {} attempt(s): {} (file kept on disk)",
                        front.clip.path.display(),
                        front.attempts,
                        e
                    );
                    queue.pop_front();
                }
            }
        }
    }

    fn delete_local(&self, pending: &mut PendingUpload) {
        match std::fs::remove_file(&pending.clip.path) {
            Ok(()) => {
                pending.clip.state = UploadState::DeletedLocal;
                self.stats.locals_deleted.fetch_add(1, Ordering::Relaxed);
                log::info!("deleted local recording {}", pending.clip.path.display());
            }
            Err(e) => log::warn!(
                "failed to delete local recording {}: {}",
                pending.clip.path.display(),
                e
            ),
        }
    }

    /// The clip stays on disk; mark it so the startup rescan does not
    /// upload it a second time.
    fn mark_uploaded(&self, pending: &PendingUpload) {
        let marker = crate::clip::uploaded_marker_path(&pending.clip.path);
        if let Err(e) = std::fs::write(&marker, b"") {
            log::warn!("failed to write upload marker {}: {}", marker.display(), e);
        }
    }

    fn sweep(&mut self, max_age: Duration) {
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        let files = match self.store.list_older_than(max_age) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("retention sweep listing failed: {}; retrying next interval", e);
                return;
            }
        };
        for file in files {
            match self.store.delete(&file.id) {
                Ok(()) => {
                    self.stats.remote_deleted.fetch_add(1, Ordering::Relaxed);
                    log::info!(
                        "retention sweep deleted {} (age {}s)",
                        file.name,
                        file.age.as_secs()
                    );
                }
                Err(e) => log::warn!("retention sweep failed to delete {}: {}", file.name, e),
            }
        }
    }

    /// Exponential backoff with a cap and up to 25% jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .cfg
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.cfg.backoff_cap);
        capped + capped.mul_f64(rand::thread_rng().gen_range(0.0..0.25))
    }
}
