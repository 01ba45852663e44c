//! Reaper - 解放待ちハンドルを別スレッドで解放する
//!
//! # フロー
//! 1. 任意のスレッドが `mark(handle)` で行列に積む（ロックなし・ブロックなし）
//! 2. worker が起きて行列を丸ごと空の行列と swap する
//! 3. 取り出した batch を全部 release する（ここだけが外部ライブラリのロックを取りうる）
//! 4. `idle_interval` だけ眠る（mark / terminate で早めに起こされる）
//!
//! # 状態遷移
//! `Running → Terminating → Terminated`。戻ることはない。
//! 止まった reaper への `mark` はログを出すだけの no-op。

mod builder;
mod worker;

pub use self::builder::ReaperBuilder;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, Thread};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use self::worker::Worker;
use crate::atomic::AtomicSwap;
use crate::clock::{Clock, SystemClock};
use crate::config::ReaperConfig;
use crate::error::ReaperError;
use crate::handle::{Handle, Release};
use crate::observability::{Counters, ReaperStats, WorkerFailure};
use crate::pending::Pending;

/// State shared by the reaper and its worker thread.
struct Shared {
    pending: AtomicSwap<Pending<Handle>>,
    running: AtomicBool,
    /// Cleared by the worker as the last thing it does.
    alive: AtomicBool,
    counters: Counters,
    failure: OnceLock<WorkerFailure>,
    idle_interval: Duration,
    clock: Arc<dyn Clock>,
}

/// Releases marked handles on a single background thread.
///
/// `mark` is safe to call from any thread, including one that currently holds
/// the lock the handles' `release` needs: it only touches a lock-free queue and
/// never waits for the worker.
pub struct Reaper {
    shared: Arc<Shared>,
    config: ReaperConfig,
    /// None if the worker could not be started.
    thread: Option<Thread>,
    /// Taken once the worker has been joined.
    worker: Mutex<Option<Worker>>,
}

impl Reaper {
    /// Reaper with the default config (one second idle interval).
    pub fn new() -> Result<Self, ReaperError> {
        Self::builder().spawn()
    }

    pub fn with_config(config: ReaperConfig) -> Result<Self, ReaperError> {
        Self::builder().config(config).spawn()
    }

    pub fn builder() -> ReaperBuilder {
        ReaperBuilder::new()
    }

    fn start(config: ReaperConfig, clock: Arc<dyn Clock>) -> Result<Self, ReaperError> {
        let shared = Arc::new(Shared::new(&config, clock));
        let (thread, worker) = worker::spawn(Arc::clone(&shared), &config.thread_name)?;

        Ok(Self {
            shared,
            config,
            thread: Some(thread),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// A reaper whose worker never ran.
    ///
    /// Used when the process-wide instance cannot start its thread: marking
    /// on it degrades to a logged no-op instead of failing the caller.
    pub(crate) fn retired(config: ReaperConfig, cause: &ReaperError) -> Self {
        let shared = Shared::new(&config, Arc::new(SystemClock));
        shared.running.store(false, Ordering::Release);
        shared.alive.store(false, Ordering::Release);
        let _ = shared.failure.set(WorkerFailure {
            at: shared.clock.now(),
            message: cause.to_string(),
        });
        error!(error = %cause, "reaper worker could not be started");

        Self {
            shared: Arc::new(shared),
            config,
            thread: None,
            worker: Mutex::new(None),
        }
    }

    /// Queue `handle` for release on the worker thread.
    ///
    /// Never blocks and never fails. If the reaper is terminating or its worker
    /// is gone, the handle is dropped unreleased and the event is logged.
    pub fn mark<H: Release + 'static>(&self, handle: H) {
        self.mark_shared(Arc::new(handle));
    }

    /// [`mark`](Self::mark) for an already type-erased handle.
    pub fn mark_shared(&self, handle: Handle) {
        // the worker may exit right after this check; such a handle is lost
        if !self.accepting() {
            Counters::bump(&self.shared.counters.rejected);
            warn!(?handle, "reaper is dead, cannot mark handle");
            return;
        }

        debug!(?handle, "marking handle for release");
        self.shared
            .pending
            .update(|queue| queue.push(Arc::clone(&handle)));
        // before waking, so the worker ends up holding the last reference
        drop(handle);
        Counters::bump(&self.shared.counters.marked);
        self.wake();
    }

    /// Cut the worker's current idle sleep short.
    pub fn wake(&self) {
        if let Some(thread) = &self.thread {
            thread.unpark();
        }
    }

    /// Stop the worker, waiting up to one idle interval for it to finish.
    pub fn terminate(&self) -> bool {
        self.terminate_within(self.shared.idle_interval)
    }

    /// Stop the worker, waiting up to `wait` for it to finish its current pass.
    ///
    /// Returns `true` once the worker has exited (immediately, if it already
    /// had) and `false` if it was still busy when `wait` ran out. A timeout is
    /// logged and otherwise ignored; calling again keeps waiting.
    pub fn terminate_within(&self, wait: Duration) -> bool {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = slot.take() else {
            return true;
        };

        if self.alive() {
            info!(?wait, "reaper terminating");
        }
        self.shared.running.store(false, Ordering::Release);
        self.wake();

        // a handle dropped on the worker can end up here; it cannot join itself
        if worker.join.thread().id() == thread::current().id() {
            *slot = Some(worker);
            return false;
        }

        match worker.done.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(?wait, "reaper did not terminate in time");
                *slot = Some(worker);
                false
            }
            // only ever disconnects
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                // panics are caught inside the thread body
                let _ = worker.join.join();
                true
            }
        }
    }

    /// True until the worker thread exits, whatever the reason.
    pub fn alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Number of handles waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.shared.pending.load().len()
    }

    pub fn stats(&self) -> ReaperStats {
        self.shared.counters.snapshot(self.pending())
    }

    /// Why the worker died, if it did not stop through `terminate`.
    pub fn failure(&self) -> Option<WorkerFailure> {
        self.shared.failure.get().cloned()
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    fn accepting(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) && self.alive()
    }
}

impl Shared {
    fn new(config: &ReaperConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: AtomicSwap::new(Pending::new()),
            running: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            counters: Counters::default(),
            failure: OnceLock::new(),
            idle_interval: config.idle_interval(),
            clock,
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Reaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaper")
            .field("alive", &self.alive())
            .field("running", &self.shared.running.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .field("idle_interval", &self.shared.idle_interval)
            .finish()
    }
}
