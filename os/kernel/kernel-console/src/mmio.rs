use crate::ConsoleDevice;
use kernel_info::boot::{BootParams, DeviceType};
use kernel_info::memory::DIRECT_MAP_BASE;

/// The console's memory-mapped data register, reached through the direct map.
#[derive(Debug)]
pub struct MmioConsole {
    data: *mut u8,
}

// SAFETY: single-byte volatile stores to a device register; concurrent
// writers interleave bytes but never tear them.
unsafe impl Send for MmioConsole {}
unsafe impl Sync for MmioConsole {}

impl MmioConsole {
    /// # Safety
    /// `data` must be the mapped data register of a console device.
    #[must_use]
    pub const unsafe fn new(data: *mut u8) -> Self {
        Self { data }
    }

    /// The first console in the boot device table, or `None` if there is none.
    #[must_use]
    pub fn from_boot_params(params: &BootParams) -> Option<Self> {
        let device = params.device(DeviceType::Console)?;
        let va = device.start.wrapping_add(DIRECT_MAP_BASE) as usize;
        // SAFETY: the device table names the register's physical address,
        // which the direct map covers.
        Some(unsafe { Self::new(va as *mut u8) })
    }
}

impl ConsoleDevice for MmioConsole {
    #[inline]
    fn put_byte(&self, byte: u8) {
        // SAFETY: see `new`.
        unsafe { self.data.write_volatile(byte) }
    }
}
