//! # Memory Layout

pub use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE};

/// Base of the default kernel mapping.
///
/// The machine maps every physical page `pa` at virtual address
/// [`DIRECT_MAP_BASE`] `+ pa` before the kernel starts. Addresses at or above
/// this base can be translated without walking the page tables.
pub const DIRECT_MAP_BASE: u32 = 0xC000_0000;

/// Upper bound of physically addressable memory (1 GiB).
///
/// All of it fits between [`DIRECT_MAP_BASE`] and the top of the address space.
pub const MAX_PHYSICAL_MEMORY: u32 = 0x4000_0000;

/// The "null" physical address.
///
/// Physical addresses go from 0 to at most 1 GiB, so this value never names a
/// real byte.
pub const NOPAGE: u32 = 0xFFFF_FFFF;

/// Number of entries in a page directory or page table (4-byte entries).
pub const ENTRIES_PER_TABLE: u32 = PAGE_SIZE / 4;

const _: () = {
    assert!(DIRECT_MAP_BASE.is_multiple_of(PAGE_SIZE));
    assert!(DIRECT_MAP_BASE as u64 + MAX_PHYSICAL_MEMORY as u64 == 1 << 32);
    assert!(NOPAGE >= MAX_PHYSICAL_MEMORY);
    assert!(ENTRIES_PER_TABLE == 1024);
};
