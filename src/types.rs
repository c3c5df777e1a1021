use crate::sync::UnsafeCell;
use derive_more::{Deref, DerefMut};
use indexmap::IndexSet as _IndexSet;
use rustc_hash::FxBuildHasher;

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Sync`.
///
/// Used internally to enable interior mutability across threads while
/// correctness is ensured by scheduling: a node's job slot is only borrowed
/// mutably while its activation count is zero and exactly one worker owns
/// it, and the pool only borrows the interpreter mutably while every helper
/// thread is parked.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }

    /// Runs `f` with a raw pointer to the contents.
    ///
    /// The caller is responsible for exclusivity; routing the access through
    /// a closure keeps the loom build able to track it.
    #[cfg(feature = "loom")]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        self.0.with_mut(f)
    }

    /// Runs `f` with a raw pointer to the contents.
    ///
    /// The caller is responsible for exclusivity.
    #[cfg(not(feature = "loom"))]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}

/// Index of a worker thread within one tick.
///
/// The master thread (conventionally the audio driver's callback thread) is
/// worker `0`; helper threads use `1..=used_helper_threads`. The `u8` width
/// bounds the usable thread count.
pub type WorkerIndex = u8;

/// Index of a node within its graph's arena.
///
/// Nodes refer to their successors by `NodeIndex` rather than by pointer, so
/// a reference handed out during a tick is trivially bounded by the graph's
/// lifetime.
pub type NodeIndex = u16;

pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;
