//! Global - プロセス全体で共有する reaper
//!
//! # 設計
//! - インスタンスは初回アクセス時に作る（default config）
//! - 差し替えは「古い worker を join してから atomic pointer swap」
//!   （テストごとに新しいインスタンスを入れる用途）
//! - プロセス終了時の terminate は `main` が [`ExitGuard`] を持って行う。
//!   reaper 自身は終了処理を登録しない。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::config::ReaperConfig;
use crate::error::ReaperError;
use crate::handle::Release;
use crate::reaper::Reaper;

static INSTANCE: LazyLock<ArcSwap<Reaper>> = LazyLock::new(|| {
    let config = ReaperConfig::default();
    let reaper = Reaper::with_config(config.clone())
        .unwrap_or_else(|err| Reaper::retired(config, &err));
    ArcSwap::from_pointee(reaper)
});

static TERMINATE_AT_EXIT: AtomicBool = AtomicBool::new(true);

/// The current process-wide reaper.
pub fn instance() -> Arc<Reaper> {
    INSTANCE.load_full()
}

/// Mark `handle` on the current process-wide reaper.
pub fn mark<H: Release + 'static>(handle: H) {
    INSTANCE.load().mark(handle);
}

/// Install `reaper` as the process-wide instance.
///
/// The current instance is terminated (and its worker joined, within its idle
/// interval) before the pointer is swapped. Returns the retired instance.
pub fn replace(reaper: Reaper) -> Arc<Reaper> {
    INSTANCE.load_full().terminate();
    let old = INSTANCE.swap(Arc::new(reaper));
    // another replace may have slipped in between; no-op otherwise
    old.terminate();
    debug!("process-wide reaper replaced");
    old
}

/// Start a reaper from `config`, install it, and adopt its exit setting.
pub fn init(config: ReaperConfig) -> Result<Arc<Reaper>, ReaperError> {
    let terminate_at_exit = config.terminate_at_exit;
    let reaper = Reaper::with_config(config)?;
    replace(reaper);
    set_terminate_at_exit(terminate_at_exit);
    Ok(instance())
}

pub fn terminate_at_exit() -> bool {
    TERMINATE_AT_EXIT.load(Ordering::Acquire)
}

pub fn set_terminate_at_exit(enabled: bool) {
    TERMINATE_AT_EXIT.store(enabled, Ordering::Release);
}

/// Run the exit step now: terminate the current instance if
/// [`terminate_at_exit`] is enabled.
///
/// Returns whether the worker was stopped (always `false` when disabled).
pub fn shutdown() -> bool {
    if !terminate_at_exit() {
        debug!("terminate_at_exit disabled, leaving reaper running");
        return false;
    }
    instance().terminate()
}

/// Calls [`shutdown`] when dropped.
///
/// Hold it for the lifetime of `main`:
///
/// ```ignore
/// fn main() {
///     let _reaper = reaper_core::global::exit_guard();
///     // ...
/// } // terminated here, bounded by the idle interval
/// ```
#[must_use = "the reaper is terminated when the guard is dropped"]
#[derive(Debug)]
pub struct ExitGuard {
    _private: (),
}

pub fn exit_guard() -> ExitGuard {
    ExitGuard { _private: () }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Debug)]
    struct Counted(Arc<AtomicUsize>);

    impl Release for Counted {
        fn release(&self) -> Result<(), ReaperError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fresh() -> Reaper {
        Reaper::builder()
            .idle_interval(Duration::from_millis(50))
            .spawn()
            .unwrap()
    }

    fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    // One test: everything here shares the process-wide state.
    #[test]
    fn process_wide_lifecycle() {
        // replace joins the old worker first
        let first = instance();
        let old = replace(fresh());
        assert!(Arc::ptr_eq(&first, &old));
        assert!(!old.alive());
        assert!(instance().alive());

        // global mark and the Reaped wrapper go to the current instance
        let released = Arc::new(AtomicUsize::new(0));
        mark(Counted(Arc::clone(&released)));
        drop(crate::Reaped::global(Counted(Arc::clone(&released))));
        assert!(wait_for(&released, 2));

        // disabled: the exit step leaves the worker running
        set_terminate_at_exit(false);
        drop(exit_guard());
        assert!(instance().alive());

        // enabled: the exit step terminates it
        set_terminate_at_exit(true);
        drop(exit_guard());
        assert!(!instance().alive());

        // a terminated singleton refuses marks until replaced
        mark(Counted(Arc::clone(&released)));
        assert_eq!(instance().stats().rejected, 1);

        // init installs a configured instance and adopts its exit flag
        let config = ReaperConfig {
            terminate_at_exit: false,
            ..ReaperConfig::default()
        }
        .with_idle_interval(Duration::from_millis(20));
        let current = init(config).unwrap();
        assert!(current.alive());
        assert!(!terminate_at_exit());
        assert_eq!(current.config().idle_interval(), Duration::from_millis(20));

        mark(Counted(Arc::clone(&released)));
        assert!(wait_for(&released, 3));

        assert!(!shutdown());
        set_terminate_at_exit(true);
        assert!(shutdown());
    }
}
