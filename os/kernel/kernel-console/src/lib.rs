//! # Console Output
//!
//! The machine's console is a write-only device: every byte stored to its
//! data register appears on screen immediately. There is no buffering, no
//! input and no interrupt. This crate is the kernel's only diagnostic
//! channel and must work before any allocator is up.
//!
//! ```text
//! log::info!(..)  ─► ConsoleLogger ─┐
//!                                   ├─► ConsoleWriter (fmt::Write) ─► ConsoleDevice::put_byte
//! console_trace!(dev, ..) ──────────┘
//! ```
//!
//! ## Logging
//! ```rust
//! use kernel_console::{ConsoleDevice, ConsoleLogger};
//! use log::LevelFilter;
//!
//! struct Discard;
//!
//! impl ConsoleDevice for Discard {
//!     fn put_byte(&self, _byte: u8) {}
//! }
//!
//! static LOGGER: ConsoleLogger<Discard> = ConsoleLogger::new(Discard, LevelFilter::Debug);
//!
//! LOGGER.install().expect("no other logger installed");
//! log::info!("memory manager ready");
//! ```
//!
//! On the machine the device is an [`MmioConsole`] (feature `machine`) found
//! through the boot device table.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
#[cfg(feature = "machine")]
mod mmio;

pub use logger::ConsoleLogger;
#[cfg(feature = "machine")]
pub use mmio::MmioConsole;

use core::fmt;

/// A sink that accepts one byte at a time.
///
/// Output is best effort: a device that cannot take the byte drops it.
pub trait ConsoleDevice {
    fn put_byte(&self, byte: u8);

    /// Write `s` followed by a newline.
    fn put_line(&self, s: &str) {
        for b in s.bytes() {
            self.put_byte(b);
        }
        self.put_byte(b'\n');
    }
}

impl<D: ConsoleDevice + ?Sized> ConsoleDevice for &D {
    #[inline]
    fn put_byte(&self, byte: u8) {
        (**self).put_byte(byte);
    }
}

/// [`fmt::Write`] adapter over a [`ConsoleDevice`].
pub struct ConsoleWriter<'d, D: ConsoleDevice + ?Sized> {
    device: &'d D,
}

impl<'d, D: ConsoleDevice + ?Sized> ConsoleWriter<'d, D> {
    #[must_use]
    pub const fn new(device: &'d D) -> Self {
        Self { device }
    }
}

impl<D: ConsoleDevice + ?Sized> fmt::Write for ConsoleWriter<'_, D> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.device.put_byte(b);
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn write_args<D: ConsoleDevice + ?Sized>(device: &D, args: fmt::Arguments<'_>) {
    // Nothing to report a failure to.
    let _ = fmt::write(&mut ConsoleWriter::new(device), args);
}

/// Formatted output straight to a console device, bypassing `log`.
///
/// ```rust
/// # use kernel_console::{ConsoleDevice, console_trace};
/// # struct Discard;
/// # impl ConsoleDevice for Discard { fn put_byte(&self, _: u8) {} }
/// console_trace!(Discard, "ppn {:#07x}\n", 0x42);
/// ```
#[macro_export]
macro_rules! console_trace {
    ($device:expr, $($arg:tt)*) => {{
        $crate::write_args(&$device, ::core::format_args!($($arg)*));
    }};
}
