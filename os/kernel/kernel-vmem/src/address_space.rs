//! # Address Space
//!
//! A handle to one two-level page table tree, rooted at a page directory.
//! Only mechanism lives here: installing and removing single 4 KiB mappings
//! below the direct map. Which mappings exist is the caller's business.
//!
//! Mutating the active address space needs no TLB maintenance on this machine
//! (there is no TLB), but the change is visible to every core sharing the
//! directory immediately.

use crate::addresses::{PhysicalPage, VirtualAddress};
use crate::info::DIRECT_MAP_BASE;
use crate::page_table::pd::{PageDirectory, PdEntry};
use crate::page_table::pt::{PageTable, PtEntry};
use crate::page_table::split_indices;
use crate::{PageEntryBits, PhysMemory};
use kernel_registers::{Context, ContextSource};

/// Source of **zeroed** physical pages for new page tables.
///
/// The memory backend is passed in rather than owned so that an allocator
/// which itself keeps its bookkeeping in physical memory can serve requests.
pub trait FrameAlloc<M: PhysMemory + ?Sized> {
    /// One zero-filled page, or `None` when memory is exhausted.
    fn alloc_zeroed_page(&mut self, mem: &mut M) -> Option<PhysicalPage>;
}

/// Why a mapping could not be installed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("{va} lies in the direct map and cannot be remapped")]
    DirectMapWindow { va: VirtualAddress },
    #[error("no page left for a page table covering {va}")]
    OutOfMemory { va: VirtualAddress },
}

/// Handle to a single address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddressSpace {
    directory: PageDirectory,
}

impl AddressSpace {
    /// Use the page directory in `directory`; the page must already hold a
    /// valid (e.g. zeroed) directory.
    #[inline]
    #[must_use]
    pub const fn new(directory: PhysicalPage) -> Self {
        Self {
            directory: PageDirectory::new(directory),
        }
    }

    /// The address space named by the current context register.
    #[inline]
    pub fn from_context<C: ContextSource + ?Sized>(ctx: &C) -> Self {
        Self::new(ctx.load_context().page_directory())
    }

    /// Allocate and zero a fresh page directory.
    pub fn create<M, F>(mem: &mut M, frames: &mut F) -> Option<Self>
    where
        M: PhysMemory + ?Sized,
        F: FrameAlloc<M> + ?Sized,
    {
        frames.alloc_zeroed_page(mem).map(Self::new)
    }

    #[inline]
    #[must_use]
    pub const fn directory(&self) -> PhysicalPage {
        self.directory.page()
    }

    /// The context register value that activates this address space.
    #[inline]
    #[must_use]
    pub const fn context(&self) -> Context {
        Context::from_page_directory(self.directory.page())
    }

    /// Map the 4 KiB page containing `va` to `page` with `flags`.
    ///
    /// A missing page table is taken from `frames`. An existing mapping for the
    /// same page is replaced.
    ///
    /// # Errors
    /// - [`MapError::DirectMapWindow`] if `va` is at or above `0xC000_0000`.
    /// - [`MapError::OutOfMemory`] if a page table was needed and `frames` had none.
    pub fn map_page<M, F>(
        &self,
        mem: &mut M,
        frames: &mut F,
        va: VirtualAddress,
        page: PhysicalPage,
        flags: PageEntryBits,
    ) -> Result<(), MapError>
    where
        M: PhysMemory + ?Sized,
        F: FrameAlloc<M> + ?Sized,
    {
        if va.as_u32() >= DIRECT_MAP_BASE {
            return Err(MapError::DirectMapWindow { va });
        }

        let (di, ti) = split_indices(va);
        let table = match self.directory.get(mem, di).next_table() {
            Some(table) => table,
            None => {
                let table = frames
                    .alloc_zeroed_page(mem)
                    .ok_or(MapError::OutOfMemory { va })?;
                self.directory.set(mem, di, PdEntry::make(table));
                log::trace!("new page table {table} for {va}");
                table
            }
        };

        PageTable::new(table).set(mem, ti, PtEntry::make(page, flags));
        Ok(())
    }

    /// Remove the mapping of the page containing `va`, returning what it mapped.
    ///
    /// Page tables are left in place even if they become empty.
    pub fn unmap_page<M: PhysMemory + ?Sized>(
        &self,
        mem: &mut M,
        va: VirtualAddress,
    ) -> Option<PhysicalPage> {
        let (di, ti) = split_indices(va);
        let table = PageTable::new(self.directory.get(mem, di).next_table()?);
        let (page, _) = table.get(mem, ti).page()?;
        table.set(mem, ti, PtEntry::zero());
        Some(page)
    }
}
