//! # Kernel synchronization primitives
//!
//! None of the memory subsystem's allocators synchronize internally. Sharing
//! one across cores means wrapping it in a [`SpinMutex`]; sharing it with an
//! interrupt handler on the same core additionally means taking the lock via
//! [`Mutex::lock_irq`], so the handler cannot preempt a holder and spin on a
//! lock that will never be released.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;

#[cfg(feature = "machine")]
pub use irq::CpuStatus;
pub use irq::{InterruptControl, InterruptLevel, IrqGuard, IrqMutex};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;

/// A [`Mutex`] backed by a [`RawSpin`] lock.
pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must hold the lock.
    unsafe fn raw_unlock(&self);
}
