//! Reaper worker thread.
//!
//! The worker is the only place handles are released. Marking threads never
//! wait for it, so it is free to block on the owning library's lock.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};

use tracing::{debug, error, trace, warn};

use super::Shared;
use crate::error::ReaperError;
use crate::handle::Handle;
use crate::observability::{Counters, WorkerFailure};
use crate::pending::Pending;

/// Owned side of the worker thread, kept by the reaper until joined.
pub(super) struct Worker {
    pub(super) join: JoinHandle<()>,
    /// Disconnects when the thread body returns (or unwinds).
    pub(super) done: mpsc::Receiver<()>,
}

pub(super) fn spawn(shared: Arc<Shared>, name: &str) -> Result<(Thread, Worker), ReaperError> {
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _done = done_tx;
            run(&shared);
        })
        .map_err(ReaperError::Spawn)?;

    let thread = join.thread().clone();
    Ok((
        thread,
        Worker {
            join,
            done: done_rx,
        },
    ))
}

fn run(shared: &Shared) {
    debug!("reaper worker started");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reap_loop(shared))) {
        let failure = WorkerFailure {
            at: shared.clock.now(),
            message: panic_message(payload.as_ref()),
        };
        error!(at = %failure.at, failure = %failure.message, "reaper worker was killed");
        let _ = shared.failure.set(failure);
    }

    shared.alive.store(false, Ordering::Release);
    debug!("reaper worker terminated");
}

fn reap_loop(shared: &Shared) {
    while shared.running.load(Ordering::Acquire) {
        reap_batch(shared);
        // unpark() from mark/terminate cuts this short
        thread::park_timeout(shared.idle_interval);
    }

    // best effort: whatever was marked before `running` flipped
    reap_batch(shared);
}

/// Drain the queue once and release everything captured. Returns the batch size.
fn reap_batch(shared: &Shared) -> usize {
    let batch = shared.pending.swap(Pending::new());
    if batch.is_empty() {
        return 0;
    }

    let handles = batch.to_vec_in_push_order();
    drop(batch);

    trace!(size = handles.len(), "reaping batch");
    for handle in &handles {
        release_one(shared, handle);
    }
    Counters::bump(&shared.counters.batches);

    handles.len()
}

fn release_one(shared: &Shared, handle: &Handle) {
    match panic::catch_unwind(AssertUnwindSafe(|| handle.release())) {
        Ok(Ok(())) => {
            Counters::bump(&shared.counters.released);
            trace!(?handle, "released");
        }
        Ok(Err(err)) => {
            Counters::bump(&shared.counters.failed);
            warn!(?handle, error = %err, "release failed");
        }
        Err(payload) => {
            Counters::bump(&shared.counters.failed);
            warn!(?handle, panic = %panic_message(payload.as_ref()), "release panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
