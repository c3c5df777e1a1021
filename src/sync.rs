#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::cell::UnsafeCell;
    pub(crate) use loom::sync::atomic::{AtomicU16, Ordering};
    // Loom needs an explicit yield point wherever the real code spins.
    pub(crate) use loom::thread::yield_now as spin_loop;
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use core::cell::UnsafeCell;
    pub(crate) use core::hint::spin_loop;
    pub(crate) use core::sync::atomic::{AtomicU16, Ordering};
}

pub(crate) use imp::*;
