//! # Page Table (PT)
//!
//! - [`TableIndex`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a page table entry (PTE). Every valid entry maps one 4 KiB page.
//! - [`PageTable`]: a view of a 4 KiB page of 1024 PTEs in physical memory.

use crate::PageEntryBits;
use crate::PhysMemory;
use crate::addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

/// Index into a page table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A single page table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// A page table: 1024 entries occupying one physical page.
#[doc(alias = "PT")]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageTable {
    page: PhysicalPage,
}

impl TableIndex {
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
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

impl PtEntry {
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

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// If valid, the mapped physical page and its flags.
    #[inline]
    #[must_use]
    pub const fn page(self) -> Option<(PhysicalPage, PageEntryBits)> {
        if self.is_valid() {
            Some((self.0.page(), self.0))
        } else {
            None
        }
    }

    /// A valid PTE mapping `page` with `flags`; forces the valid bit.
    #[inline]
    #[must_use]
    pub const fn make(page: PhysicalPage, flags: PageEntryBits) -> Self {
        Self(flags.with_valid(true).with_page(page))
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

impl PageTable {
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

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn entry_address(self, i: TableIndex) -> PhysicalAddress {
        PhysicalAddress::new(self.page.base().as_u32() + 4 * i.as_usize() as u32)
    }

    #[inline]
    #[must_use]
    pub fn get<M: PhysMemory + ?Sized>(self, mem: &M, i: TableIndex) -> PtEntry {
        PtEntry::from_raw(mem.read_u32(self.entry_address(i)))
    }

    #[inline]
    pub fn set<M: PhysMemory + ?Sized>(self, mem: &mut M, i: TableIndex, e: PtEntry) {
        mem.write_u32(self.entry_address(i), e.raw());
    }
}
