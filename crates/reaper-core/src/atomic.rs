//! AtomicSwap - ロックを使わない置き換え可能なセル
//!
//! 中身は常に immutable な snapshot (`Arc<T>`) で、書き込みは
//! 「新しい snapshot を作って compare-and-swap」だけで行う。
//! 読み手・書き手ともに mutex を取らない。

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// A cell holding an immutable snapshot that can be replaced atomically.
///
/// Two writes are supported:
/// - [`swap`](Self::swap) replaces the value unconditionally and hands back the
///   previous snapshot in one step.
/// - [`update`](Self::update) derives the next value from the current one with
///   a compare-and-swap retry loop.
///
/// Neither operation can fail or block.
pub struct AtomicSwap<T> {
    inner: ArcSwap<T>,
}

impl<T> AtomicSwap<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ArcSwap::from_pointee(value),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Store `value` and return what was stored before.
    ///
    /// The returned snapshot is exactly the value that was replaced: no
    /// concurrent `update` can land in between.
    pub fn swap(&self, value: T) -> Arc<T> {
        self.inner.swap(Arc::new(value))
    }

    /// Replace the stored value with `f(current)`.
    ///
    /// # Contract: `f` must be pure
    ///
    /// When another writer gets in between reading the current value and
    /// storing the result, the result is thrown away and `f` runs again on the
    /// newer value. `f` can therefore be called any number of times for one
    /// logical update, and every call except the last is discarded. Anything
    /// `f` does besides computing its return value happens once per attempt.
    ///
    /// Returns the snapshot that was replaced.
    pub fn update<F>(&self, mut f: F) -> Arc<T>
    where
        F: FnMut(&T) -> T,
    {
        self.inner.rcu(|current| f(&**current))
    }
}

impl<T: Default> Default for AtomicSwap<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicSwap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicSwap").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn swap_returns_previous_value() {
        let cell = AtomicSwap::new(vec![1, 2]);
        let old = cell.swap(Vec::new());
        assert_eq!(*old, vec![1, 2]);
        assert!(cell.load().is_empty());
    }

    #[test]
    fn update_applies_function() {
        let cell = AtomicSwap::new(10u32);
        let old = cell.update(|n| n + 5);
        assert_eq!(*old, 10);
        assert_eq!(*cell.load(), 15);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let cell = Arc::new(AtomicSwap::new(0usize));
        let barrier = Arc::new(Barrier::new(THREADS));
        let calls = Arc::new(AtomicUsize::new(0));

        let joins: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        cell.update(|n| {
                            calls.fetch_add(1, Ordering::Relaxed);
                            n + 1
                        });
                    }
                })
            })
            .collect();
        for j in joins {
            j.join().unwrap();
        }

        assert_eq!(*cell.load(), THREADS * PER_THREAD);
        // retries may call the function more than once per update
        assert!(calls.load(Ordering::Relaxed) >= THREADS * PER_THREAD);
    }
}
