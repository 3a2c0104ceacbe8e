//! Physical page allocator
//!
//! Hands out runs of pages that are contiguous both physically and in the
//! direct map. One bit per allocatable page lives in RAM right after the
//! bootloader's pages:
//!
//! ```text
//! ram_start                                                    ram_end
//! | bootloader pages | bitmap pages | allocatable pages ...         |
//! |<------- pages_reserved ------->|<- bit 0, bit 1, ...          ->|
//! ```
//!
//! The reserved prefix is not tracked by the bitmap and can never be freed.
//! Searches resume at a hint just past the previous run, scanning circularly.

use crate::bitmap::Bitmap;
use crate::error::{MemoryError, PageOperation};
use kernel_info::boot::RamLayout;
use kernel_vmem::addresses::{PAGE_SIZE, PhysicalPage, PhysicalPageRange, VirtualAddress};
use kernel_vmem::info::DIRECT_MAP_BASE;
use kernel_vmem::{FrameAlloc, PhysMemory, direct_map_to_physical, physical_to_virtual};
use log::{info, trace, warn};

/// Bits held by one page of bitmap.
const BITS_PER_PAGE: u32 = 8 * PAGE_SIZE;

/// Bitmap-tracked allocator over one RAM extent.
#[derive(Debug)]
pub struct PageAllocator {
    layout: RamLayout,
    bitmap: Bitmap,
    bitmap_pages: u32,
    pages_reserved: u32,
    hint: u32,
}

impl PageAllocator {
    /// Place and clear the bitmap, reserving the bootloader's and the
    /// bitmap's own pages.
    ///
    /// # Errors
    /// [`MemoryError::RamTooSmall`] if no allocatable page would remain.
    pub fn new<M: PhysMemory + ?Sized>(mem: &mut M, layout: RamLayout) -> Result<Self, MemoryError> {
        let ram_pages = layout.ram_pages();
        let bitmap_pages = ram_pages.div_ceil(BITS_PER_PAGE);
        let pages_reserved = layout.bootloader_pages.saturating_add(bitmap_pages);
        if pages_reserved >= ram_pages {
            return Err(MemoryError::RamTooSmall {
                ram_pages,
                reserved: pages_reserved,
            });
        }

        let bitmap_start = layout.ram.start() + layout.bootloader_pages;
        mem.fill(bitmap_start.base(), bitmap_pages * PAGE_SIZE, 0);

        let this = Self {
            layout,
            bitmap: Bitmap::new(bitmap_start.base(), ram_pages - pages_reserved),
            bitmap_pages,
            pages_reserved,
            hint: 0,
        };
        info!(
            "RAM {:?}: {} pages, {} reserved ({} bitmap), {} allocatable",
            layout.ram,
            ram_pages,
            pages_reserved,
            bitmap_pages,
            this.allocatable_pages()
        );
        Ok(this)
    }

    #[must_use]
    pub const fn layout(&self) -> RamLayout {
        self.layout
    }

    /// Bootloader pages plus bitmap pages.
    #[must_use]
    pub const fn pages_reserved(&self) -> u32 {
        self.pages_reserved
    }

    #[must_use]
    pub const fn bitmap_pages(&self) -> u32 {
        self.bitmap_pages
    }

    #[must_use]
    pub const fn allocatable_pages(&self) -> u32 {
        self.bitmap.len()
    }

    /// The pages tracked by the bitmap.
    #[must_use]
    pub const fn allocatable_range(&self) -> PhysicalPageRange {
        PhysicalPageRange::new(self.first_allocatable(), self.layout.ram.end())
    }

    /// Where the next search starts, as a bitmap index.
    #[must_use]
    pub const fn hint(&self) -> u32 {
        self.hint
    }

    const fn first_allocatable(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.layout.ram.start().number() + self.pages_reserved)
    }

    #[must_use]
    pub fn free_page_count<M: PhysMemory + ?Sized>(&self, mem: &M) -> u32 {
        self.allocatable_pages() - self.bitmap.count_ones(mem)
    }

    /// Whether `page` is currently handed out. Pages outside the bitmap never are.
    #[must_use]
    pub fn is_allocated<M: PhysMemory + ?Sized>(&self, mem: &M, page: PhysicalPage) -> bool {
        self.allocatable_range().contains(page)
            && self
                .bitmap
                .get(mem, page.number() - self.first_allocatable().number())
    }

    /// Allocate `count` contiguous pages and return the first one's direct-map address.
    ///
    /// # Errors
    /// - [`MemoryError::InvalidPageCount`] for zero or more than the allocatable total.
    /// - [`MemoryError::OutOfPages`] if no free run of that length exists.
    pub fn alloc_pages<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        count: u32,
    ) -> Result<VirtualAddress, MemoryError> {
        self.alloc_run(mem, count)
            .map(|first| physical_to_virtual(first.base()))
    }

    /// [`alloc_pages`](Self::alloc_pages), then zero the whole run.
    ///
    /// # Errors
    /// As [`alloc_pages`](Self::alloc_pages).
    pub fn calloc_pages<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        count: u32,
    ) -> Result<VirtualAddress, MemoryError> {
        let first = self.alloc_run(mem, count)?;
        mem.fill(first.base(), count * PAGE_SIZE, 0);
        Ok(physical_to_virtual(first.base()))
    }

    /// Find, mark and return a run of `count` free pages.
    ///
    /// # Errors
    /// As [`alloc_pages`](Self::alloc_pages).
    pub fn alloc_run<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        count: u32,
    ) -> Result<PhysicalPage, MemoryError> {
        let n = self.allocatable_pages();
        if count == 0 || count > n {
            return Err(MemoryError::InvalidPageCount {
                op: PageOperation::Alloc,
                count,
                available: n,
            });
        }

        // `count - 1` extra steps catch a run that straddles the hint.
        let mut seen = 0;
        for i in 0..n + count - 1 {
            let end = (self.hint + i) % n;
            if end == 0 {
                seen = 0;
            }
            if self.bitmap.get(mem, end) {
                seen = 0;
                continue;
            }
            seen += 1;
            if seen == count {
                let start = end + 1 - count;
                self.bitmap.set_run(mem, start, count, true);
                self.hint = (end + 1) % n;
                let first = self.first_allocatable() + start;
                trace!("alloc_pages({count}) = {first}");
                return Ok(first);
            }
        }
        Err(MemoryError::OutOfPages { count })
    }

    /// Return `count` pages starting at the direct-map address `address`.
    ///
    /// Checks, in order: the count, that the whole run is in the direct map,
    /// page alignment, that the run lies in RAM, that it avoids the reserved
    /// prefix, and that every page is allocated. Nothing is changed unless
    /// all checks pass.
    ///
    /// # Errors
    /// The [`MemoryError`] variant of the first failing check.
    pub fn free_pages<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        address: VirtualAddress,
        count: u32,
    ) -> Result<(), MemoryError> {
        let n = self.allocatable_pages();
        if count == 0 || count > n {
            return Err(MemoryError::InvalidPageCount {
                op: PageOperation::Free,
                count,
                available: n,
            });
        }

        let end = VirtualAddress::new(address.as_u32().wrapping_add(count * PAGE_SIZE - 1));
        let (Some(pa), true) = (
            direct_map_to_physical(address),
            end.as_u32() >= DIRECT_MAP_BASE,
        ) else {
            return Err(MemoryError::FreeBelowDirectMap {
                start: address,
                end,
            });
        };
        if !pa.is_page_aligned() {
            return Err(MemoryError::FreeMisaligned { address });
        }
        let first = pa.page();
        if !self.layout.ram.contains_run(first, count) {
            return Err(MemoryError::FreeNotRam { address, count });
        }
        if first.number() < self.first_allocatable().number() {
            return Err(MemoryError::FreeReserved { address });
        }

        let start = first.number() - self.first_allocatable().number();
        if let Some(i) = (0..count).find(|&i| !self.bitmap.get(mem, start + i)) {
            return Err(MemoryError::AlreadyFree {
                address,
                page: address + i * PAGE_SIZE,
            });
        }
        self.bitmap.set_run(mem, start, count, false);
        trace!("free_pages({address}, {count})");
        Ok(())
    }
}

impl<M: PhysMemory + ?Sized> FrameAlloc<M> for PageAllocator {
    fn alloc_zeroed_page(&mut self, mem: &mut M) -> Option<PhysicalPage> {
        match self.alloc_run(mem, 1) {
            Ok(page) => {
                mem.fill(page.base(), PAGE_SIZE, 0);
                Some(page)
            }
            Err(e) => {
                warn!("no page for a page table: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::SimulatedRam;

    /// RAM pages 4..20 with 2 bootloader pages: 1 bitmap page, 13 allocatable.
    fn setup() -> (SimulatedRam, PageAllocator) {
        let layout = RamLayout::from_page_numbers(4, 20, 2);
        let mut ram = SimulatedRam::new(layout.ram);
        let pages = PageAllocator::new(&mut ram, layout).unwrap();
        (ram, pages)
    }

    fn page_of(va: VirtualAddress) -> u32 {
        direct_map_to_physical(va).unwrap().page().number()
    }

    #[test]
    fn init_places_bitmap_after_bootloader() {
        let (ram, pages) = setup();
        assert_eq!(pages.bitmap_pages(), 1);
        assert_eq!(pages.pages_reserved(), 3);
        assert_eq!(pages.allocatable_pages(), 13);
        assert_eq!(pages.free_page_count(&ram), 13);
        assert!(
            ram.page_bytes(PhysicalPage::from_number(6))
                .iter()
                .all(|&b| b == 0)
        );
        // Bootloader pages are untouched.
        assert_eq!(
            ram.page_bytes(PhysicalPage::from_number(5))[0],
            SimulatedRam::POISON
        );
    }

    #[test]
    fn bitmap_size_rounds_up() {
        let layout = RamLayout::from_page_numbers(0, BITS_PER_PAGE + 1, 1);
        let mut ram = SimulatedRam::new(layout.ram);
        let pages = PageAllocator::new(&mut ram, layout).unwrap();
        assert_eq!(pages.bitmap_pages(), 2);
        assert_eq!(pages.allocatable_pages(), BITS_PER_PAGE - 2);
    }

    #[test]
    fn ram_too_small() {
        let layout = RamLayout::from_page_numbers(4, 7, 2);
        let mut ram = SimulatedRam::new(layout.ram);
        assert_eq!(
            PageAllocator::new(&mut ram, layout).unwrap_err(),
            MemoryError::RamTooSmall {
                ram_pages: 3,
                reserved: 3
            }
        );
    }

    #[test]
    fn first_allocation_follows_reserved_prefix() {
        let (mut ram, mut pages) = setup();
        let va = pages.alloc_pages(&mut ram, 2).unwrap();
        assert_eq!(va, VirtualAddress::new(0xC000_7000));
        assert_eq!(pages.hint(), 2);
        assert!(pages.is_allocated(&ram, PhysicalPage::from_number(7)));
        assert!(pages.is_allocated(&ram, PhysicalPage::from_number(8)));
        assert!(!pages.is_allocated(&ram, PhysicalPage::from_number(9)));
        assert!(!pages.is_allocated(&ram, PhysicalPage::from_number(4)));
    }

    #[test]
    fn invalid_counts() {
        let (mut ram, mut pages) = setup();
        assert_eq!(
            pages.alloc_pages(&mut ram, 0),
            Err(MemoryError::InvalidPageCount {
                op: PageOperation::Alloc,
                count: 0,
                available: 13
            })
        );
        assert!(matches!(
            pages.alloc_pages(&mut ram, 14),
            Err(MemoryError::InvalidPageCount { count: 14, .. })
        ));
        assert!(matches!(
            pages.free_pages(&mut ram, VirtualAddress::new(0xC000_7000), 0),
            Err(MemoryError::InvalidPageCount {
                op: PageOperation::Free,
                ..
            })
        ));
    }

    #[test]
    fn busy_page_breaks_a_run() {
        let (mut ram, mut pages) = setup();
        // Occupy bitmap index 1 only.
        let a = pages.alloc_pages(&mut ram, 2).unwrap();
        pages.free_pages(&mut ram, a, 1).unwrap();
        pages.hint = 0;

        // Indices 0 and 2 are free but not contiguous.
        let b = pages.alloc_pages(&mut ram, 2).unwrap();
        assert_eq!(page_of(b), 7 + 2);
    }

    #[test]
    fn wrap_resets_the_streak() {
        let (mut ram, mut pages) = setup();
        let all = pages.alloc_pages(&mut ram, 13).unwrap();
        // Free the last and the first page: free at both ends, never contiguous.
        pages.free_pages(&mut ram, all + 12 * PAGE_SIZE, 1).unwrap();
        pages.free_pages(&mut ram, all, 1).unwrap();
        pages.hint = 12;
        assert_eq!(
            pages.alloc_pages(&mut ram, 2),
            Err(MemoryError::OutOfPages { count: 2 })
        );
        // Singles still fit.
        assert_eq!(page_of(pages.alloc_pages(&mut ram, 1).unwrap()), 7 + 12);
        assert_eq!(page_of(pages.alloc_pages(&mut ram, 1).unwrap()), 7);
    }

    #[test]
    fn finds_run_straddling_the_hint() {
        let (mut ram, mut pages) = setup();
        let all = pages.alloc_pages(&mut ram, 13).unwrap();
        // Free indices 4..8 and put the hint in the middle of that run.
        pages.free_pages(&mut ram, all + 4 * PAGE_SIZE, 4).unwrap();
        pages.hint = 6;
        let run = pages.alloc_pages(&mut ram, 4).unwrap();
        assert_eq!(page_of(run), 7 + 4);
        assert_eq!(pages.hint(), 8);
    }

    #[test]
    fn exhaustion_scenario() {
        let (mut ram, mut pages) = setup();
        let k = pages.allocatable_pages();
        pages.alloc_pages(&mut ram, k).unwrap();
        assert_eq!(pages.free_page_count(&ram), 0);
        assert_eq!(
            pages.alloc_pages(&mut ram, 1),
            Err(MemoryError::OutOfPages { count: 1 })
        );
    }

    #[test]
    fn calloc_pages_zeroes_the_run() {
        let (mut ram, mut pages) = setup();
        let va = pages.calloc_pages(&mut ram, 3).unwrap();
        let first = page_of(va);
        for p in first..first + 3 {
            assert!(
                ram.page_bytes(PhysicalPage::from_number(p))
                    .iter()
                    .all(|&b| b == 0)
            );
        }
    }

    #[test]
    fn free_pages_check_order() {
        let (mut ram, mut pages) = setup();
        let va = pages.alloc_pages(&mut ram, 2).unwrap();

        let low = VirtualAddress::new(0x0000_7000);
        assert_eq!(
            pages.free_pages(&mut ram, low, 1),
            Err(MemoryError::FreeBelowDirectMap {
                start: low,
                end: VirtualAddress::new(0x0000_7FFF)
            })
        );
        assert!(matches!(
            pages.free_pages(&mut ram, VirtualAddress::new(0xFFFF_F000), 2),
            Err(MemoryError::FreeBelowDirectMap { .. })
        ));
        assert_eq!(
            pages.free_pages(&mut ram, va + 4, 1),
            Err(MemoryError::FreeMisaligned { address: va + 4 })
        );
        let outside = VirtualAddress::new(0xC010_0000);
        assert_eq!(
            pages.free_pages(&mut ram, outside, 1),
            Err(MemoryError::FreeNotRam {
                address: outside,
                count: 1
            })
        );
        // Overruns the end of RAM.
        let last = VirtualAddress::new(0xC001_3000);
        assert!(matches!(
            pages.free_pages(&mut ram, last, 2),
            Err(MemoryError::FreeNotRam { .. })
        ));
        let reserved = VirtualAddress::new(0xC000_6000);
        assert_eq!(
            pages.free_pages(&mut ram, reserved, 1),
            Err(MemoryError::FreeReserved { address: reserved })
        );
        assert_eq!(
            pages.free_pages(&mut ram, va, 3),
            Err(MemoryError::AlreadyFree {
                address: va,
                page: va + 2 * PAGE_SIZE
            })
        );
        // The failed free changed nothing.
        assert!(pages.is_allocated(&ram, PhysicalPage::from_number(7)));
        assert!(pages.is_allocated(&ram, PhysicalPage::from_number(8)));

        pages.free_pages(&mut ram, va, 2).unwrap();
        assert_eq!(
            pages.free_pages(&mut ram, va, 2),
            Err(MemoryError::AlreadyFree { address: va, page: va })
        );
    }

    #[test]
    fn reserved_pages_are_protected_regardless_of_bitmap() {
        let (mut ram, mut pages) = setup();
        pages.alloc_pages(&mut ram, 13).unwrap();
        for ppn in 4..7 {
            let va = physical_to_virtual(PhysicalPage::from_number(ppn).base());
            assert_eq!(
                pages.free_pages(&mut ram, va, 1),
                Err(MemoryError::FreeReserved { address: va })
            );
        }
    }

    #[test]
    fn frame_alloc_hands_out_zeroed_pages() {
        let (mut ram, mut pages) = setup();
        let page = pages.alloc_zeroed_page(&mut ram).unwrap();
        assert!(ram.page_bytes(page).iter().all(|&b| b == 0));
        pages.alloc_pages(&mut ram, 12).unwrap();
        assert_eq!(pages.alloc_zeroed_page(&mut ram), None);
    }
}
