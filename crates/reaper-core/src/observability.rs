use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time counters of a reaper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperStats {
    /// Handles accepted by `mark`.
    pub marked: u64,
    /// Handles refused because the worker was gone.
    pub rejected: u64,
    pub released: u64,
    pub failed: u64,
    /// Non-empty batches drained by the worker.
    pub batches: u64,
    /// Handles waiting for the next pass.
    pub pending: usize,
}

/// Why the worker stopped, if it did not stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Counters shared between markers and the worker.
///
/// Relaxed ordering is enough: these are only ever read for reporting.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) marked: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) batches: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending: usize) -> ReaperStats {
        ReaperStats {
            marked: self.marked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reads_every_counter() {
        let counters = Counters::default();
        Counters::bump(&counters.marked);
        Counters::bump(&counters.marked);
        Counters::bump(&counters.released);
        Counters::bump(&counters.batches);

        let stats = counters.snapshot(1);
        assert_eq!(
            stats,
            ReaperStats {
                marked: 2,
                rejected: 0,
                released: 1,
                failed: 0,
                batches: 1,
                pending: 1,
            }
        );
    }

    #[test]
    fn stats_serialize_as_flat_json() {
        let stats = ReaperStats {
            marked: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["marked"], 3);
        assert_eq!(json["pending"], 0);
    }
}
