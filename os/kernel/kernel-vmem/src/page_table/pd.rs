//! # Page Directory (PD)
//!
//! - [`DirectoryIndex`]: index type for VA bits `[31:22]`.
//! - [`PdEntry`]: a page directory entry (PDE). Only the valid bit and the page
//!   number are interpreted by the hardware.
//! - [`PageDirectory`]: a view of a 4 KiB page of 1024 PDEs in physical memory.

use crate::PageEntryBits;
use crate::PhysMemory;
use crate::addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Index into the page directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// A single page directory entry (PDE).
///
/// A valid PDE names the physical page holding the next-level page table.
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The page directory: 1024 entries occupying one physical page.
#[doc(alias = "PD")]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageDirectory {
    page: PhysicalPage,
}

impl DirectoryIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl PdEntry {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.valid()
    }

    /// If valid, the physical page holding the next-level page table.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage> {
        if self.is_valid() {
            Some(self.0.page())
        } else {
            None
        }
    }

    /// A valid PDE pointing at the page table in `table`.
    #[inline]
    #[must_use]
    pub const fn make(table: PhysicalPage) -> Self {
        Self(PageEntryBits::new().with_valid(true).with_page(table))
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    /// No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageDirectory {
    #[inline]
    #[must_use]
    pub const fn new(page: PhysicalPage) -> Self {
        Self { page }
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        self.page
    }

    /// Physical address of entry `i`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn entry_address(self, i: DirectoryIndex) -> PhysicalAddress {
        PhysicalAddress::new(self.page.base().as_u32() + 4 * i.as_usize() as u32)
    }

    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub fn get<M: PhysMemory + ?Sized>(self, mem: &M, i: DirectoryIndex) -> PdEntry {
        PdEntry::from_raw(mem.read_u32(self.entry_address(i)))
    }

    /// Write the entry at `i`.
    #[inline]
    pub fn set<M: PhysMemory + ?Sized>(self, mem: &mut M, i: DirectoryIndex, e: PdEntry) {
        mem.write_u32(self.entry_address(i), e.raw());
    }
}
