//! # Address Translation
//!
//! The machine maps every physical address `pa` at virtual address
//! `0xC000_0000 + pa`. Anything below that window is translated by walking the
//! two-level page table named by the context register.
//!
//! ```text
//!  context.ppn ─► PD[va.31‒22] ─► PT[va.21‒12] ─► page | va.11‒0
//! ```
//!
//! A failed walk is an ordinary [`TranslationError`]; whether it matters is up
//! to the caller.

use crate::PhysMemory;
use crate::addresses::{PhysicalAddress, PhysicalPage, PhysicalPageRange, VirtualAddress};
use crate::info::{DIRECT_MAP_BASE, NOPAGE};
use crate::page_table::pd::PageDirectory;
use crate::page_table::pt::PageTable;
use crate::page_table::split_indices;
use kernel_registers::ContextSource;
use log::debug;

/// The direct-mapped virtual address of `pa`.
///
/// Total: addresses at or above 1 GiB simply wrap, as they do on the machine.
#[inline]
#[must_use]
pub const fn physical_to_virtual(pa: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(pa.as_u32().wrapping_add(DIRECT_MAP_BASE))
}

/// The physical address behind `va` if it lies in the direct map.
#[inline]
#[must_use]
pub const fn direct_map_to_physical(va: VirtualAddress) -> Option<PhysicalAddress> {
    match va.as_u32().checked_sub(DIRECT_MAP_BASE) {
        Some(pa) => Some(PhysicalAddress::new(pa)),
        None => None,
    }
}

/// Why a virtual address has no physical backing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("context register {context:#010x} points to non-RAM {directory}")]
    RootOutsideRam { context: u32, directory: PhysicalPage },
    #[error("PDE is invalid for virtual address {va}")]
    DirectoryEntryInvalid { va: VirtualAddress },
    #[error("PDE for virtual address {va} points to non-RAM {table}")]
    TableOutsideRam { va: VirtualAddress, table: PhysicalPage },
    #[error("PTE is invalid for virtual address {va}")]
    TableEntryInvalid { va: VirtualAddress },
}

/// Virtual to physical translation over the RAM extent it was built for.
///
/// Page tables outside that extent are never dereferenced.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AddressTranslator {
    ram: PhysicalPageRange,
}

impl AddressTranslator {
    #[inline]
    #[must_use]
    pub const fn new(ram: PhysicalPageRange) -> Self {
        Self { ram }
    }

    #[inline]
    #[must_use]
    pub const fn ram(&self) -> PhysicalPageRange {
        self.ram
    }

    #[inline]
    #[must_use]
    pub const fn physical_to_virtual(&self, pa: PhysicalAddress) -> VirtualAddress {
        physical_to_virtual(pa)
    }

    /// Resolve `va` to its physical address.
    ///
    /// Addresses in the direct map take the fast path and never touch memory.
    /// Everything else walks the page tables rooted at the context reported by
    /// `ctx`.
    ///
    /// # Errors
    /// A [`TranslationError`] naming the level at which the walk failed.
    pub fn virtual_to_physical<M, C>(
        &self,
        mem: &M,
        ctx: &C,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, TranslationError>
    where
        M: PhysMemory + ?Sized,
        C: ContextSource + ?Sized,
    {
        if let Some(pa) = direct_map_to_physical(va) {
            return Ok(pa);
        }
        self.walk(mem, ctx, va).inspect_err(|e| debug!("{e}"))
    }

    /// Like [`virtual_to_physical`](Self::virtual_to_physical), reporting a
    /// miss as the raw `NOPAGE` value.
    #[must_use]
    pub fn virtual_to_physical_raw<M, C>(&self, mem: &M, ctx: &C, va: VirtualAddress) -> u32
    where
        M: PhysMemory + ?Sized,
        C: ContextSource + ?Sized,
    {
        self.virtual_to_physical(mem, ctx, va)
            .map_or(NOPAGE, PhysicalAddress::as_u32)
    }

    fn walk<M, C>(
        &self,
        mem: &M,
        ctx: &C,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, TranslationError>
    where
        M: PhysMemory + ?Sized,
        C: ContextSource + ?Sized,
    {
        let context = ctx.load_context();
        let directory = context.page_directory();
        if !self.ram.contains(directory) {
            return Err(TranslationError::RootOutsideRam {
                context: context.into_bits(),
                directory,
            });
        }

        let (di, ti) = split_indices(va);
        let table = PageDirectory::new(directory)
            .get(mem, di)
            .next_table()
            .ok_or(TranslationError::DirectoryEntryInvalid { va })?;
        if !self.ram.contains(table) {
            return Err(TranslationError::TableOutsideRam { va, table });
        }

        let (page, _flags) = PageTable::new(table)
            .get(mem, ti)
            .page()
            .ok_or(TranslationError::TableEntryInvalid { va })?;
        Ok(page.join(va.offset()))
    }
}
