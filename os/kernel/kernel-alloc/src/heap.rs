//! Byte-granularity allocator
//!
//! Small requests (up to 2048 bytes) are rounded up to a [`SizeClass`] and
//! carved out of bucket pages; each class keeps its pages on a ring linked
//! through the page headers by page number. Larger requests become big blocks:
//! a whole run of pages with an 8-byte header in front of the payload.
//!
//! Bucket pages are never handed back to the page allocator, even when all of
//! their blocks are free. Capacity only moves between size classes by way of
//! big blocks.

use crate::error::MemoryError;
use crate::header::{BIG_BLOCK_HEADER_SIZE, BUCKET_MAGIC, BucketPage, PageHeader};
use crate::page_alloc::PageAllocator;
use crate::size_class::{CLASS_COUNT, SizeClass};
use kernel_vmem::addresses::{PAGE_SIZE, PhysicalPage, VirtualAddress};
use kernel_vmem::info::DIRECT_MAP_BASE;
use kernel_vmem::{PhysMemory, align_down, checked_align_up, direct_map_to_physical, physical_to_virtual};
use log::{debug, trace};

/// The bucket pages of one size class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BucketRing {
    head: Option<PhysicalPage>,
    len: u32,
}

impl BucketRing {
    /// Link `bucket` in just before the head, i.e. at the tail.
    fn push_back<M: PhysMemory + ?Sized>(&mut self, mem: &mut M, bucket: BucketPage) {
        match self.head {
            None => {
                bucket.set_prev(mem, bucket.page());
                bucket.set_next(mem, bucket.page());
                self.head = Some(bucket.page());
            }
            Some(head) => {
                let head = BucketPage::new(head);
                let tail = BucketPage::new(head.prev(mem));
                bucket.set_prev(mem, tail.page());
                bucket.set_next(mem, head.page());
                tail.set_next(mem, bucket.page());
                head.set_prev(mem, bucket.page());
            }
        }
        self.len += 1;
    }
}

/// `malloc`/`calloc`/`free` over a [`PageAllocator`].
#[derive(Debug, Default)]
pub struct HeapAllocator {
    rings: [BucketRing; CLASS_COUNT],
}

impl HeapAllocator {
    /// One empty ring per size class.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket pages currently owned by `class`.
    #[must_use]
    pub const fn bucket_pages(&self, class: SizeClass) -> u32 {
        self.rings[class.index()].len
    }

    /// Allocate at least `size` bytes.
    ///
    /// # Errors
    /// - [`MemoryError::SizeOverflow`] if a big block of that size cannot be expressed.
    /// - [`MemoryError::BucketCorrupted`] if a bucket page on the ring lost its header or
    ///   links outside allocatable RAM.
    /// - Any error of [`PageAllocator::alloc_pages`].
    pub fn malloc<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        pages: &mut PageAllocator,
        size: u32,
    ) -> Result<VirtualAddress, MemoryError> {
        let pointer = match SizeClass::for_size(size) {
            Some(class) => self.malloc_small(mem, pages, class)?,
            None => Self::malloc_big(mem, pages, size)?,
        };
        trace!("malloc({size}) = {pointer}");
        Ok(pointer)
    }

    fn malloc_small<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        pages: &mut PageAllocator,
        class: SizeClass,
    ) -> Result<VirtualAddress, MemoryError> {
        let ring = &mut self.rings[class.index()];

        let mut cursor = ring.head;
        for _ in 0..ring.len {
            let Some(page) = cursor else { break };
            let bucket = BucketPage::new(page);
            check_bucket(mem, bucket, class)?;
            if let Some(j) = bucket.first_free(mem, class) {
                bucket.busy().set(mem, j, true);
                return Ok(block_address(page, class, j));
            }
            let next = bucket.next(mem);
            if !pages.allocatable_range().contains(next) {
                return Err(MemoryError::BucketCorrupted {
                    page: physical_to_virtual(page.base()),
                    magic: bucket.magic(mem),
                    block_size: bucket.block_size(mem),
                });
            }
            cursor = Some(next);
        }

        let page = pages.alloc_run(mem, 1)?;
        let bucket = BucketPage::new(page);
        bucket.init(mem, class);
        ring.push_back(mem, bucket);
        bucket.busy().set(mem, 1, true);
        debug!(
            "new {}-byte bucket page {page} ({} in class)",
            class.block_size(),
            ring.len
        );
        Ok(block_address(page, class, 1))
    }

    fn malloc_big<M: PhysMemory + ?Sized>(
        mem: &mut M,
        pages: &mut PageAllocator,
        size: u32,
    ) -> Result<VirtualAddress, MemoryError> {
        let page_count = size
            .checked_add(BIG_BLOCK_HEADER_SIZE)
            .and_then(|total| checked_align_up(total, PAGE_SIZE))
            .ok_or(MemoryError::SizeOverflow { size, count: 1 })?
            / PAGE_SIZE;
        let first = pages.alloc_run(mem, page_count)?;
        PageHeader::write_big_block(mem, first, page_count);
        Ok(physical_to_virtual(first.base()) + BIG_BLOCK_HEADER_SIZE)
    }

    /// Allocate `count` elements of `size` bytes (rounded up to a multiple of
    /// 4) and zero them.
    ///
    /// # Errors
    /// - [`MemoryError::SizeOverflow`] if the total does not fit in 32 bits.
    /// - Any error of [`malloc`](Self::malloc).
    pub fn calloc<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        pages: &mut PageAllocator,
        size: u32,
        count: u32,
    ) -> Result<VirtualAddress, MemoryError> {
        let total = checked_align_up(size, 4)
            .and_then(|size| size.checked_mul(count))
            .ok_or(MemoryError::SizeOverflow { size, count })?;
        let pointer = self.malloc(mem, pages, total)?;
        let pa = direct_map_to_physical(pointer).ok_or(MemoryError::OutsideRam {
            address: pointer,
            len: total,
        })?;
        mem.fill(pa, total, 0);
        Ok(pointer)
    }

    /// Release a block obtained from [`malloc`](Self::malloc) or [`calloc`](Self::calloc).
    ///
    /// # Errors
    /// - [`MemoryError::HeapAddressTooLow`] below the direct map.
    /// - [`MemoryError::HeapMisaligned`] if `pointer` is not the start of a block.
    /// - [`MemoryError::NotHeapMemory`] if the page is not allocatable RAM.
    /// - [`MemoryError::DoubleFree`] if the bucket block is not allocated.
    /// - [`MemoryError::BadMagic`] if the page carries neither header tag.
    /// - [`MemoryError::BucketCorrupted`] if a bucket header has an impossible block size.
    /// - Any error of [`PageAllocator::free_pages`] for big blocks.
    pub fn free<M: PhysMemory + ?Sized>(
        &mut self,
        mem: &mut M,
        pages: &mut PageAllocator,
        pointer: VirtualAddress,
    ) -> Result<(), MemoryError> {
        let page_va = VirtualAddress::new(align_down(pointer.as_u32(), PAGE_SIZE));
        if page_va.as_u32() < DIRECT_MAP_BASE {
            return Err(MemoryError::HeapAddressTooLow { address: pointer });
        }
        let offset = pointer.as_u32() - page_va.as_u32();
        if offset < BIG_BLOCK_HEADER_SIZE {
            return Err(MemoryError::HeapMisaligned { address: pointer });
        }
        let page = direct_map_to_physical(page_va)
            .map(|pa| pa.page())
            .filter(|&page| pages.allocatable_range().contains(page))
            .ok_or(MemoryError::NotHeapMemory { address: pointer })?;

        match PageHeader::read(mem, page) {
            PageHeader::Bucket { block_size } => {
                let class = SizeClass::from_block_size(block_size).ok_or(
                    MemoryError::BucketCorrupted {
                        page: page_va,
                        magic: BUCKET_MAGIC,
                        block_size,
                    },
                )?;
                let j = offset / block_size;
                if j < 1 || offset != j * block_size {
                    return Err(MemoryError::HeapMisaligned { address: pointer });
                }
                let busy = BucketPage::new(page).busy();
                if !busy.get(mem, j) {
                    return Err(MemoryError::DoubleFree { address: pointer });
                }
                busy.set(mem, j, false);
                trace!("free({pointer}): {}-byte block {j}", class.block_size());
            }
            PageHeader::BigBlock { page_count } => {
                if offset != BIG_BLOCK_HEADER_SIZE {
                    return Err(MemoryError::HeapMisaligned { address: pointer });
                }
                pages.free_pages(mem, page_va, page_count)?;
                PageHeader::retire_big_block(mem, page);
                trace!("free({pointer}): {page_count} pages");
            }
            PageHeader::Unrecognized { tag } => {
                return Err(MemoryError::BadMagic {
                    address: pointer,
                    magic: tag,
                });
            }
        }
        Ok(())
    }
}

/// A ring member must still carry the bucket tag and its class's block size.
fn check_bucket<M: PhysMemory + ?Sized>(
    mem: &M,
    bucket: BucketPage,
    class: SizeClass,
) -> Result<(), MemoryError> {
    let magic = bucket.magic(mem);
    let block_size = bucket.block_size(mem);
    if magic == BUCKET_MAGIC && block_size == class.block_size() {
        Ok(())
    } else {
        Err(MemoryError::BucketCorrupted {
            page: physical_to_virtual(bucket.page().base()),
            magic,
            block_size,
        })
    }
}

fn block_address(page: PhysicalPage, class: SizeClass, j: u32) -> VirtualAddress {
    physical_to_virtual(page.base()) + j * class.block_size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FREED_BIG_BLOCK_MAGIC;
    use kernel_info::boot::RamLayout;
    use kernel_vmem::SimulatedRam;
    use kernel_vmem::addresses::PhysicalAddress;

    /// 1 MiB of RAM at page 4 with one bootloader page.
    fn setup() -> (SimulatedRam, PageAllocator, HeapAllocator) {
        let layout = RamLayout::from_page_numbers(4, 4 + 256, 1);
        let mut ram = SimulatedRam::new(layout.ram);
        let pages = PageAllocator::new(&mut ram, layout).unwrap();
        (ram, pages, HeapAllocator::new())
    }

    fn pa(va: VirtualAddress) -> PhysicalAddress {
        direct_map_to_physical(va).unwrap()
    }

    #[test]
    fn first_small_block_is_block_one() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 1).unwrap();
        // Page 6 is the first allocatable page (4 boot, 5 bitmap).
        assert_eq!(p, VirtualAddress::new(0xC000_6020));
        assert_eq!(heap.bucket_pages(SizeClass::SMALLEST), 1);

        let q = heap.malloc(&mut ram, &mut pages, 32).unwrap();
        assert_eq!(q, p + 32);
    }

    #[test]
    fn bucket_fills_then_spills_to_new_page() {
        let (mut ram, mut pages, mut heap) = setup();
        let class = SizeClass::LARGEST;
        let a = heap.malloc(&mut ram, &mut pages, 2048).unwrap();
        let b = heap.malloc(&mut ram, &mut pages, 2000).unwrap();
        assert_eq!(a.as_u32() & 0xFFF, 0x800);
        assert_eq!(b.as_u32() & 0xFFF, 0x800);
        assert_ne!(a.as_u32() >> 12, b.as_u32() >> 12);
        assert_eq!(heap.bucket_pages(class), 2);

        // Ring order: the freed slot on the first page is found first.
        heap.free(&mut ram, &mut pages, b).unwrap();
        heap.free(&mut ram, &mut pages, a).unwrap();
        assert_eq!(heap.malloc(&mut ram, &mut pages, 1500).unwrap(), a);
        assert_eq!(heap.malloc(&mut ram, &mut pages, 1500).unwrap(), b);
        assert_eq!(heap.bucket_pages(class), 2);
    }

    #[test]
    fn ring_links_by_page_number() {
        let (mut ram, mut pages, mut heap) = setup();
        let class = SizeClass::LARGEST;
        let firsts: Vec<_> = (0..3)
            .map(|_| heap.malloc(&mut ram, &mut pages, 2048).unwrap())
            .map(|p| pa(p).page())
            .collect();
        let ring = heap.rings[class.index()];
        assert_eq!(ring.head, Some(firsts[0]));
        assert_eq!(ring.len, 3);
        for (i, &page) in firsts.iter().enumerate() {
            let bucket = BucketPage::new(page);
            assert_eq!(bucket.next(&ram), firsts[(i + 1) % 3]);
            assert_eq!(bucket.prev(&ram), firsts[(i + 2) % 3]);
        }
    }

    #[test]
    fn big_block_threshold() {
        let (mut ram, mut pages, mut heap) = setup();
        let small = heap.malloc(&mut ram, &mut pages, 2048).unwrap();
        assert!(matches!(
            PageHeader::read(&ram, pa(small).page()),
            PageHeader::Bucket { block_size: 2048 }
        ));

        let big = heap.malloc(&mut ram, &mut pages, 2049).unwrap();
        assert_eq!(big.as_u32() & 0xFFF, 8);
        assert_eq!(
            PageHeader::read(&ram, pa(big).page()),
            PageHeader::BigBlock { page_count: 1 }
        );
    }

    #[test]
    fn big_block_page_count_includes_header() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 4088).unwrap();
        assert_eq!(
            PageHeader::read(&ram, pa(p).page()),
            PageHeader::BigBlock { page_count: 1 }
        );
        let q = heap.malloc(&mut ram, &mut pages, 4089).unwrap();
        assert_eq!(
            PageHeader::read(&ram, pa(q).page()),
            PageHeader::BigBlock { page_count: 2 }
        );
    }

    #[test]
    fn big_block_free_returns_pages_and_retires_tag() {
        let (mut ram, mut pages, mut heap) = setup();
        let before = pages.free_page_count(&ram);
        let p = heap.malloc(&mut ram, &mut pages, 65536).unwrap();
        assert_eq!(pages.free_page_count(&ram), before - 17);

        heap.free(&mut ram, &mut pages, p).unwrap();
        assert_eq!(pages.free_page_count(&ram), before);
        assert_eq!(
            ram.read_u32(pa(p).page().base()),
            FREED_BIG_BLOCK_MAGIC
        );
        assert_eq!(
            heap.free(&mut ram, &mut pages, p),
            Err(MemoryError::BadMagic {
                address: p,
                magic: FREED_BIG_BLOCK_MAGIC
            })
        );
    }

    #[test]
    fn big_block_interior_pointer_is_rejected() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 10_000).unwrap();
        assert_eq!(
            heap.free(&mut ram, &mut pages, p + 8),
            Err(MemoryError::HeapMisaligned { address: p + 8 })
        );
        heap.free(&mut ram, &mut pages, p).unwrap();
    }

    #[test]
    fn small_double_free_is_detected() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 33).unwrap();
        heap.free(&mut ram, &mut pages, p).unwrap();
        assert_eq!(
            heap.free(&mut ram, &mut pages, p),
            Err(MemoryError::DoubleFree { address: p })
        );
    }

    #[test]
    fn free_rejects_bad_pointers() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 64).unwrap();

        let low = VirtualAddress::new(0x1000_0040);
        assert_eq!(
            heap.free(&mut ram, &mut pages, low),
            Err(MemoryError::HeapAddressTooLow { address: low })
        );
        let header = VirtualAddress::new(p.as_u32() & !0xFFF) + 4;
        assert_eq!(
            heap.free(&mut ram, &mut pages, header),
            Err(MemoryError::HeapMisaligned { address: header })
        );
        // Inside block 0 but past the first 8 bytes.
        let block0 = header + 28;
        assert_eq!(
            heap.free(&mut ram, &mut pages, block0),
            Err(MemoryError::HeapMisaligned { address: block0 })
        );
        assert_eq!(
            heap.free(&mut ram, &mut pages, p + 1),
            Err(MemoryError::HeapMisaligned { address: p + 1 })
        );
        let bitmap = VirtualAddress::new(0xC000_5010);
        assert_eq!(
            heap.free(&mut ram, &mut pages, bitmap),
            Err(MemoryError::NotHeapMemory { address: bitmap })
        );
        let beyond = VirtualAddress::new(0xC100_0010);
        assert_eq!(
            heap.free(&mut ram, &mut pages, beyond),
            Err(MemoryError::NotHeapMemory { address: beyond })
        );
    }

    #[test]
    fn free_of_foreign_page_reports_bad_magic() {
        let (mut ram, mut pages, mut heap) = setup();
        let run = pages.alloc_pages(&mut ram, 1).unwrap();
        assert_eq!(
            heap.free(&mut ram, &mut pages, run + 16),
            Err(MemoryError::BadMagic {
                address: run + 16,
                magic: 0xA5A5_A5A5
            })
        );
    }

    #[test]
    fn corrupted_bucket_is_detected_by_malloc() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 100).unwrap();
        let page = pa(p).page();
        ram.write_u32(page.base(), 0x1234_5678);
        assert_eq!(
            heap.malloc(&mut ram, &mut pages, 100),
            Err(MemoryError::BucketCorrupted {
                page: physical_to_virtual(page.base()),
                magic: 0x1234_5678,
                block_size: 128
            })
        );
    }

    #[test]
    fn ring_link_out_of_ram_is_corruption() {
        let (mut ram, mut pages, mut heap) = setup();
        let first = pa(heap.malloc(&mut ram, &mut pages, 2048).unwrap()).page();
        heap.malloc(&mut ram, &mut pages, 2048).unwrap();
        // Both bucket pages are full; the walk has to follow the link.
        ram.write_u32(first.base() + 12, 0x000F_FFFF);
        assert_eq!(
            heap.malloc(&mut ram, &mut pages, 2048),
            Err(MemoryError::BucketCorrupted {
                page: physical_to_virtual(first.base()),
                magic: BUCKET_MAGIC,
                block_size: 2048
            })
        );
    }

    #[test]
    fn impossible_block_size_is_corruption() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 100).unwrap();
        let page = pa(p).page();
        ram.write_u32(page.base() + 4, 48);
        assert!(matches!(
            heap.free(&mut ram, &mut pages, p),
            Err(MemoryError::BucketCorrupted { block_size: 48, .. })
        ));
    }

    #[test]
    fn calloc_rounds_and_zeroes() {
        let (mut ram, mut pages, mut heap) = setup();
        // Dirty a 32-byte block, free it, and get it back through calloc.
        let p = heap.malloc(&mut ram, &mut pages, 30).unwrap();
        ram.fill(pa(p), 32, 0xEE);
        heap.free(&mut ram, &mut pages, p).unwrap();

        let q = heap.calloc(&mut ram, &mut pages, 3, 7).unwrap();
        assert_eq!(q, p);
        // 3 rounds to 4: 28 bytes zeroed.
        for i in 0..28 {
            assert_eq!(ram.read_u8(pa(q) + i), 0);
        }
        assert_eq!(ram.read_u8(pa(q) + 28), 0xEE);
    }

    #[test]
    fn calloc_overflow() {
        let (mut ram, mut pages, mut heap) = setup();
        assert_eq!(
            heap.calloc(&mut ram, &mut pages, u32::MAX, 1),
            Err(MemoryError::SizeOverflow {
                size: u32::MAX,
                count: 1
            })
        );
        assert_eq!(
            heap.calloc(&mut ram, &mut pages, 0x1_0000, 0x1_0000),
            Err(MemoryError::SizeOverflow {
                size: 0x1_0000,
                count: 0x1_0000
            })
        );
    }

    #[test]
    fn huge_malloc() {
        let (mut ram, mut pages, mut heap) = setup();
        assert_eq!(
            heap.malloc(&mut ram, &mut pages, u32::MAX - 4),
            Err(MemoryError::SizeOverflow {
                size: u32::MAX - 4,
                count: 1
            })
        );
        assert!(matches!(
            heap.malloc(&mut ram, &mut pages, 0x8000_0000),
            Err(MemoryError::InvalidPageCount { count: 0x8_0001, .. })
        ));
    }

    #[test]
    fn empty_bucket_pages_are_kept() {
        let (mut ram, mut pages, mut heap) = setup();
        let p = heap.malloc(&mut ram, &mut pages, 512).unwrap();
        let free_after_malloc = pages.free_page_count(&ram);
        heap.free(&mut ram, &mut pages, p).unwrap();
        assert_eq!(pages.free_page_count(&ram), free_after_malloc);
        assert!(pages.is_allocated(&ram, pa(p).page()));
        assert_eq!(heap.bucket_pages(SizeClass::for_size(512).unwrap()), 1);
    }
}
