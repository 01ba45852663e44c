//! Handle - 解放できるリソースの抽象化
//!
//! # 学習ポイント
//! - Object-safe trait (`dyn Release`) で異なるハンドル型を同じ行列に入れる
//! - RAII (`Drop`) を finalizer として使う: [`Reaped`] が drop されると
//!   ハンドルは reaper に mark される（その場では解放しない）

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::ReaperError;
use crate::global;
use crate::reaper::Reaper;

/// A foreign-owned resource that can be released.
///
/// `release` runs on the reaper's worker thread, never on the thread that
/// marked the handle, and the reaper calls it at most once per mark. It may
/// block on whatever lock the owning library requires.
pub trait Release: fmt::Debug + Send + Sync {
    fn release(&self) -> Result<(), ReaperError>;
}

/// Type-erased handle as stored in the pending queue.
pub type Handle = Arc<dyn Release>;

/// Owns a handle and marks it for release when dropped.
///
/// ```ignore
/// let track = Reaped::new(TrackPtr::from_raw(ptr), Arc::clone(&reaper));
/// // ... use `track` through Deref ...
/// drop(track); // queued, not released here
/// ```
pub struct Reaped<H: Release + 'static> {
    handle: Option<H>,
    // None: the process-wide reaper current at drop time
    reaper: Option<Arc<Reaper>>,
}

impl<H: Release + 'static> Reaped<H> {
    pub fn new(handle: H, reaper: Arc<Reaper>) -> Self {
        Self {
            handle: Some(handle),
            reaper: Some(reaper),
        }
    }

    /// Like [`new`](Self::new), but marks on [`global::instance`] when dropped.
    pub fn global(handle: H) -> Self {
        Self {
            handle: Some(handle),
            reaper: None,
        }
    }

    /// Take the handle back without marking it.
    pub fn into_inner(mut self) -> H {
        // handle is only None after drop
        self.handle
            .take()
            .unwrap_or_else(|| unreachable!("Reaped handle taken twice"))
    }
}

impl<H: Release + 'static> Deref for Reaped<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("Reaped handle used after drop"))
    }
}

impl<H: Release + 'static> DerefMut for Reaped<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handle
            .as_mut()
            .unwrap_or_else(|| unreachable!("Reaped handle used after drop"))
    }
}

impl<H: Release + 'static> Drop for Reaped<H> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match &self.reaper {
            Some(reaper) => reaper.mark(handle),
            None => global::mark(handle),
        }
    }
}

impl<H: Release + 'static> fmt::Debug for Reaped<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaped")
            .field("handle", &self.handle)
            .field("global", &self.reaper.is_none())
            .finish()
    }
}
