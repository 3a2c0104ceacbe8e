//! # Virtual Memory Support
//!
//! Paging helpers for the MIPS-like machine: no TLB, a fixed 4 KiB page size,
//! and a two-level hardware page table walked on every access below the
//! direct map.
//!
//! ## What you get
//! - [`physical_to_virtual`] and [`AddressTranslator`] for the two directions of
//!   address conversion, with [`TranslationError`] for unmapped addresses.
//! - [`PageEntryBits`], the shared PDE/PTE bit layout, and typed
//!   [page directory and page table](page_table) views.
//! - An [`AddressSpace`] handle that installs single 4 KiB mappings.
//! - The [`PhysMemory`] access trait and the [`SimulatedRam`] host backend.
//!
//! ## Virtual Address Layout
//!
//! ```text
//! 0xFFFF_FFFF ┌──────────────────────────────┐
//!             │ direct map: va = 0xC000_0000 + pa
//! 0xC000_0000 ├──────────────────────────────┤
//!             │ page-table translated        │
//! 0x0000_0000 └──────────────────────────────┘
//! ```
//!
//! Below the direct map each address is split into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! | Level | Table | Entry | Description |
//! |:------|:------|:------|:------------|
//! | 1 | **PD** (Page Directory) | **PDE** | One per address space, named by the coprocessor 0 context register. Each valid entry points to a PT. |
//! | 2 | **PT** (Page Table) | **PTE** | Each valid entry maps a 4 KiB physical page (always a leaf). |
//!
//! Both levels hold 1024 entries of 4 bytes and fill exactly one page.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod address_space;
mod page_entry_bits;
pub mod page_table;
mod phys_memory;
mod sim_ram;
mod translate;

pub use crate::address_space::{AddressSpace, FrameAlloc, MapError};
pub use crate::page_entry_bits::PageEntryBits;
#[cfg(feature = "machine")]
pub use crate::phys_memory::DirectMap;
pub use crate::phys_memory::PhysMemory;
pub use crate::sim_ram::SimulatedRam;
pub use crate::translate::{
    AddressTranslator, TranslationError, direct_map_to_physical, physical_to_virtual,
};

/// Re-export of the address types.
pub use kernel_memory_addresses as addresses;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Align `x` down to the nearest multiple of `a`.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use kernel_vmem::align_down;
/// assert_eq!(align_down(0,    4096), 0);
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// assert_eq!(align_down(0x12345, 16), 0x12340);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`, or `None` if that would
/// overflow `u32`.
///
/// ### Preconditions
/// - `a` must be **non-zero** and a **power of two**.
///
/// ### Examples
/// ```rust
/// # use kernel_vmem::checked_align_up;
/// assert_eq!(checked_align_up(0,    4096), Some(0));
/// assert_eq!(checked_align_up(1,    4096), Some(4096));
/// assert_eq!(checked_align_up(4096, 4096), Some(4096));
/// assert_eq!(checked_align_up(13, 4), Some(16));
/// assert_eq!(checked_align_up(u32::MAX, 4), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn checked_align_up(x: u32, a: u32) -> Option<u32> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
