//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw 32-bit addresses and page numbers used
//! by the memory subsystem of the MIPS-like machine.
//!
//! ## Overview
//!
//! The machine has a single page size of 4 KiB and at most 1 GiB of physical
//! memory, so every physical address, virtual address and page number fits in
//! a `u32`. This crate keeps the two address kinds apart at compile time while
//! remaining zero-cost wrappers around those `u32` values.
//!
//! | Concept | Description |
//! |----------|-------------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`PageOffset`] | The byte offset inside a 4 KiB page (bits 11..0). |
//!
//! These are then wrapped to distinguish between virtual and physical spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Refer to physical RAM or memory-mapped devices. |
//! | [`PhysicalPageRange`] | A half-open run of physical pages, e.g. the RAM extent. |
//!
//! Pages are identified by their **page number** (`address >> 12`), which is
//! what page table entries, the context register and the allocator bitmaps
//! store.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC000_5123);
//! let (page, off) = va.split();
//! assert_eq!(page.number(), 0xC0005);
//! assert_eq!(off.as_u32(), 0x123);
//! assert_eq!(page.join(off), va);
//!
//! let pa = PhysicalAddress::new(0x0000_4042);
//! assert_eq!(pa.page(), PhysicalPage::from_number(4));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod page_offset;
mod page_range;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::MemoryAddress;
pub use page_offset::PageOffset;
pub use page_range::PhysicalPageRange;
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Page size in bytes. The machine knows no other page size.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of low bits used for the in-page offset.
pub const PAGE_SHIFT: u32 = 12;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);
