//! # Interrupt masking
//!
//! On the machine only core 0 takes interrupts, and a handler running there
//! may call into the allocator. A lock alone does not help: the handler would
//! spin on a lock held by the code it interrupted. [`Mutex::lock_irq`] masks
//! interrupts first and restores the previous state after unlocking.

use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// The interrupt state saved by [`InterruptControl::disable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use = "pass the level back to InterruptControl::restore"]
pub struct InterruptLevel {
    enabled: bool,
}

impl InterruptLevel {
    pub const ENABLED: Self = Self { enabled: true };
    pub const DISABLED: Self = Self { enabled: false };

    #[inline]
    #[must_use]
    pub const fn were_enabled(self) -> bool {
        self.enabled
    }
}

/// Masking and unmasking of interrupts on the calling core.
pub trait InterruptControl {
    /// Disable interrupts, returning whether they were enabled before.
    fn disable(&self) -> InterruptLevel;

    /// Re-enable interrupts if `level` says they were enabled; otherwise do nothing.
    fn restore(&self, level: InterruptLevel);
}

impl<T: InterruptControl + ?Sized> InterruptControl for &T {
    #[inline]
    fn disable(&self) -> InterruptLevel {
        (**self).disable()
    }

    #[inline]
    fn restore(&self, level: InterruptLevel) {
        (**self).restore(level);
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct IrqGuard<'c, C: InterruptControl + ?Sized> {
    ctl: &'c C,
    saved: InterruptLevel,
}

impl<'c, C: InterruptControl + ?Sized> IrqGuard<'c, C> {
    #[inline]
    pub fn new(ctl: &'c C) -> Self {
        let saved = ctl.disable();
        Self { ctl, saved }
    }

    #[inline]
    pub const fn saved(&self) -> InterruptLevel {
        self.saved
    }
}

impl<C: InterruptControl + ?Sized> Drop for IrqGuard<'_, C> {
    fn drop(&mut self) {
        self.ctl.restore(self.saved);
    }
}

/// A mutex guard that also keeps interrupts disabled while held.
///
/// Fields drop in order: the lock is released before interrupts come back.
pub struct IrqMutex<'a, 'c, T, R: RawLock + RawUnlock, C: InterruptControl + ?Sized> {
    guard: MutexGuard<'a, T, R>,
    _irq: IrqGuard<'c, C>,
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Disable interrupts through `ctl`, then acquire the mutex.
    #[inline]
    pub fn lock_irq<'a, 'c, C: InterruptControl + ?Sized>(
        &'a self,
        ctl: &'c C,
    ) -> IrqMutex<'a, 'c, T, R, C> {
        let irq = IrqGuard::new(ctl);
        let guard = self.lock();
        IrqMutex { guard, _irq: irq }
    }
}

impl<T, R: RawLock + RawUnlock, C: InterruptControl + ?Sized> Deref for IrqMutex<'_, '_, T, R, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawLock + RawUnlock, C: InterruptControl + ?Sized> DerefMut
    for IrqMutex<'_, '_, T, R, C>
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(feature = "machine")]
mod machine {
    use super::{InterruptControl, InterruptLevel};

    unsafe extern "C" {
        /// Coprocessor 0 status register accessors (provided by `machine.s`).
        fn current_cpu_status() -> u32;
        fn set_cpu_status(status: u32);
    }

    /// Interrupt enable bit (IE) of the status register.
    const STATUS_IE: u32 = 1;

    /// The calling core's status register.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct CpuStatus;

    impl InterruptControl for CpuStatus {
        fn disable(&self) -> InterruptLevel {
            // SAFETY: reading the status register has no side effects.
            let status = unsafe { current_cpu_status() };
            // SAFETY: writes back the status just read with only IE cleared.
            unsafe { set_cpu_status(status & !STATUS_IE) };
            if status & STATUS_IE != 0 {
                InterruptLevel::ENABLED
            } else {
                InterruptLevel::DISABLED
            }
        }

        fn restore(&self, level: InterruptLevel) {
            if level.were_enabled() {
                // SAFETY: re-enables what `disable` masked.
                unsafe { set_cpu_status(current_cpu_status() | STATUS_IE) };
            }
        }
    }
}

#[cfg(feature = "machine")]
pub use machine::CpuStatus;
