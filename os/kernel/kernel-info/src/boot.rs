//! # Kernel Boot Information
//!
//! The first page of physical memory (the boot ROM) holds a parameter block
//! written by the simulator: a device table describing the physical address
//! space, the number of RAM pages the bootloader consumed, and the command line
//! arguments.

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, PhysicalPageRange};

/// Number of entries in the boot device table.
pub const DEVICE_TABLE_ENTRIES: usize = 16;

/// Number of boot argument slots.
pub const BOOT_ARGS: usize = 16;

/// Length of a single boot argument slot, including the terminating NUL.
pub const BOOT_ARG_LEN: usize = 128;

/// Device kinds found in the boot device table.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceType {
    Empty = 0x0000,
    Rom = 0x0001,
    Ram = 0x0003,
    Keyboard = 0x2210,
    Console = 0x1610,
    Network = 0x3410,
}

impl DeviceType {
    /// Decode a raw device type tag; unknown tags yield `None`.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x0000 => Some(Self::Empty),
            0x0001 => Some(Self::Rom),
            0x0003 => Some(Self::Ram),
            0x2210 => Some(Self::Keyboard),
            0x1610 => Some(Self::Console),
            0x3410 => Some(Self::Network),
            _ => None,
        }
    }
}

/// One entry of the boot device table.
///
/// Keep this `#[repr(C)]`; the layout is written by the simulator.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceTableEntry {
    /// Raw device type tag, see [`DeviceType`].
    pub kind: u32,
    /// Device model code.
    pub model: u32,
    /// First physical address of the device (inclusive).
    pub start: u32,
    /// End of the device's physical range (exclusive).
    pub end: u32,
}

impl DeviceTableEntry {
    #[must_use]
    pub const fn device_type(&self) -> Option<DeviceType> {
        DeviceType::from_raw(self.kind)
    }

    #[must_use]
    pub const fn start_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start)
    }

    /// The pages fully or partially covered by this device.
    #[must_use]
    pub const fn pages(&self) -> PhysicalPageRange {
        PhysicalPageRange::new(
            PhysicalPage::from_number(self.start / PAGE_SIZE),
            PhysicalPage::from_number(self.end / PAGE_SIZE),
        )
    }
}

/// The boot parameter block at physical address 0.
#[repr(C)]
#[derive(Clone)]
pub struct BootParams {
    /// Up to 16 device table entries; unused entries are [`DeviceType::Empty`].
    pub devtable: [DeviceTableEntry; DEVICE_TABLE_ENTRIES],

    /// Count of RAM pages used by the bootloader, taken sequentially from the
    /// start of RAM.
    pub bootpages: u32,

    /// Up to 16 NUL-terminated arguments, 127 characters each.
    pub argdata: [[u8; BOOT_ARG_LEN]; BOOT_ARGS],
}

impl BootParams {
    /// An empty parameter block with no devices.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            devtable: [DeviceTableEntry {
                kind: 0,
                model: 0,
                start: 0,
                end: 0,
            }; DEVICE_TABLE_ENTRIES],
            bootpages: 0,
            argdata: [[0; BOOT_ARG_LEN]; BOOT_ARGS],
        }
    }

    /// The first device table entry of the given type.
    #[must_use]
    pub fn device(&self, kind: DeviceType) -> Option<&DeviceTableEntry> {
        self.devtable
            .iter()
            .find(|entry| entry.device_type() == Some(kind))
    }

    /// The RAM layout described by the first RAM device.
    #[must_use]
    pub fn ram_layout(&self) -> Option<RamLayout> {
        self.device(DeviceType::Ram)
            .map(|ram| RamLayout::new(ram.pages(), self.bootpages))
    }
}

/// RAM extent plus the number of pages already consumed by the bootloader.
///
/// These are the already-extracted integers the memory subsystem is
/// initialized from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RamLayout {
    /// All RAM pages, `[ram_start_page, ram_end_page)`.
    pub ram: PhysicalPageRange,
    /// Pages at the start of RAM taken by the bootloader (code, data, stack,
    /// initial page tables).
    pub bootloader_pages: u32,
}

impl RamLayout {
    #[must_use]
    pub const fn new(ram: PhysicalPageRange, bootloader_pages: u32) -> Self {
        Self {
            ram,
            bootloader_pages,
        }
    }

    /// Build a layout from raw page numbers.
    #[must_use]
    pub const fn from_page_numbers(start_page: u32, end_page: u32, bootloader_pages: u32) -> Self {
        Self::new(
            PhysicalPageRange::new(
                PhysicalPage::from_number(start_page),
                PhysicalPage::from_number(end_page),
            ),
            bootloader_pages,
        )
    }

    /// Total number of RAM pages.
    #[must_use]
    pub const fn ram_pages(&self) -> u32 {
        self.ram.len()
    }
}
