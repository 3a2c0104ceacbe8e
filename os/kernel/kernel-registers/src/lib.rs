//! # Typed Coprocessor 0 Registers

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod context;

pub use context::Context;
#[cfg(feature = "machine")]
pub use context::Coprocessor0;

/// Anything that can report the current value of the [`Context`] register.
///
/// On the machine this is the executing core's coprocessor 0
/// (`Coprocessor0`, feature `machine`); simulators and tests hand out a fixed
/// [`Context`] value instead.
///
/// The value may be stale as soon as it is read if someone else rewrites the
/// page tables or switches address spaces concurrently.
pub trait ContextSource {
    fn load_context(&self) -> Context;
}

impl<T: ContextSource + ?Sized> ContextSource for &T {
    #[inline]
    fn load_context(&self) -> Context {
        (**self).load_context()
    }
}
