use kernel_alloc::{MemoryError, MemoryManager, PageOperation};
use kernel_info::boot::RamLayout;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_vmem::{SimulatedRam, direct_map_to_physical};
use std::collections::BTreeSet;

const PAGE: u32 = 4096;

fn manager(ram_pages: u32, bootloader_pages: u32) -> MemoryManager<SimulatedRam> {
    let layout = RamLayout::from_page_numbers(4, 4 + ram_pages, bootloader_pages);
    MemoryManager::new(SimulatedRam::new(layout.ram), layout).unwrap()
}

fn first_page(va: VirtualAddress) -> PhysicalPage {
    direct_map_to_physical(va).unwrap().page()
}

/// Small deterministic generator for operation sequences.
struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

/// Every allocatable page is marked exactly when a live run covers it.
fn assert_bitmap_matches(mm: &MemoryManager<SimulatedRam>, live: &BTreeSet<u32>) {
    let pages = mm.pages();
    for page in pages.allocatable_range().iter() {
        assert_eq!(
            pages.is_allocated(mm.memory(), page),
            live.contains(&page.number()),
            "{page}"
        );
    }
    assert_eq!(
        pages.free_page_count(mm.memory()) as usize,
        pages.allocatable_pages() as usize - live.len()
    );
}

#[test]
fn random_alloc_free_keeps_bitmap_exact() {
    let mut mm = manager(96, 3);
    let mut rng = XorShift(0x2545_F491);
    let mut runs: Vec<(VirtualAddress, u32)> = Vec::new();
    let mut live = BTreeSet::new();

    for _ in 0..400 {
        if runs.is_empty() || rng.next() % 3 != 0 {
            let count = 1 + rng.next() % 6;
            match mm.alloc_pages(count) {
                Ok(va) => {
                    assert_eq!(va.as_u32() % PAGE, 0);
                    let first = first_page(va);
                    for i in 0..count {
                        let page = first + i;
                        assert!(mm.pages().allocatable_range().contains(page));
                        assert!(live.insert(page.number()), "{page} handed out twice");
                    }
                    runs.push((va, count));
                }
                Err(MemoryError::OutOfPages { count: c }) => assert_eq!(c, count),
                Err(e) => panic!("unexpected {e}"),
            }
        } else {
            let (va, count) = runs.swap_remove(rng.next() as usize % runs.len());
            mm.free_pages(va, count).unwrap();
            let first = first_page(va);
            for i in 0..count {
                live.remove(&(first + i).number());
            }
        }
        assert_bitmap_matches(&mm, &live);
    }
}

#[test]
fn round_trip_restores_free_count() {
    let mut mm = manager(64, 2);
    let total = mm.pages().allocatable_pages();
    let runs: Vec<_> = [1, 7, 3, 12, 1]
        .into_iter()
        .map(|count| (mm.alloc_pages(count).unwrap(), count))
        .collect();
    assert_eq!(mm.pages().free_page_count(mm.memory()), total - 24);
    for (va, count) in runs.into_iter().rev() {
        mm.free_pages(va, count).unwrap();
    }
    assert_eq!(mm.pages().free_page_count(mm.memory()), total);
}

#[test]
fn whole_ram_in_one_run() {
    let mut mm = manager(32, 1);
    let total = mm.pages().allocatable_pages();
    let va = mm.alloc_pages(total).unwrap();
    assert_eq!(first_page(va), mm.pages().allocatable_range().start());
    assert_eq!(
        mm.alloc_pages(1),
        Err(MemoryError::OutOfPages { count: 1 })
    );
    mm.free_pages(va, total).unwrap();
    assert_eq!(mm.alloc_pages(total).unwrap(), va);
}

#[test]
fn exhaustion_is_reported_not_wrapped() {
    let mut mm = manager(24, 2);
    let total = mm.pages().allocatable_pages();
    let mut seen = BTreeSet::new();
    for _ in 0..total {
        assert!(seen.insert(mm.alloc_pages(1).unwrap()));
    }
    assert_eq!(
        mm.alloc_pages(1),
        Err(MemoryError::OutOfPages { count: 1 })
    );
    assert_eq!(
        mm.alloc_pages(total + 1),
        Err(MemoryError::InvalidPageCount {
            op: PageOperation::Alloc,
            count: total + 1,
            available: total
        })
    );
}

#[test]
fn fragmented_ram_cannot_serve_long_runs() {
    let mut mm = manager(24, 2);
    let total = mm.pages().allocatable_pages();
    let singles: Vec<_> = (0..total).map(|_| mm.alloc_pages(1).unwrap()).collect();
    // Free every other page: plenty free, no two adjacent.
    for va in singles.iter().step_by(2) {
        mm.free_pages(*va, 1).unwrap();
    }
    assert!(mm.pages().free_page_count(mm.memory()) >= 2);
    assert_eq!(
        mm.alloc_pages(2),
        Err(MemoryError::OutOfPages { count: 2 })
    );
    assert!(mm.alloc_pages(1).is_ok());
}

#[test]
fn reserved_prefix_is_never_handed_out_or_freed() {
    let mut mm = manager(40, 3);
    let ram = mm.layout().ram;
    let reserved = mm.pages().pages_reserved();
    assert_eq!(reserved, 3 + mm.pages().bitmap_pages());

    let total = mm.pages().allocatable_pages();
    let va = mm.alloc_pages(total).unwrap();
    assert_eq!(first_page(va), ram.start() + reserved);

    for i in 0..reserved {
        let address = kernel_vmem::physical_to_virtual((ram.start() + i).base());
        assert_eq!(
            mm.free_pages(address, 1),
            Err(MemoryError::FreeReserved { address })
        );
    }
}

#[test]
fn calloc_pages_zeroes_poisoned_ram() {
    let mut mm = manager(16, 1);
    let va = mm.calloc_pages(3).unwrap();
    let mut buf = vec![0xFFu8; 3 * PAGE as usize];
    mm.read_bytes(va, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));

    // Plain alloc_pages leaves contents alone.
    let raw = mm.alloc_pages(1).unwrap();
    let mut byte = [0u8];
    mm.read_bytes(raw, &mut byte).unwrap();
    assert_eq!(byte[0], SimulatedRam::POISON);
}

#[test]
fn failed_free_changes_nothing() {
    let mut mm = manager(32, 1);
    let a = mm.alloc_pages(2).unwrap();
    let before = mm.pages().free_page_count(mm.memory());

    // The second page of the three was never allocated.
    assert_eq!(
        mm.free_pages(a, 3),
        Err(MemoryError::AlreadyFree {
            address: a,
            page: a + 2 * PAGE
        })
    );
    assert_eq!(mm.pages().free_page_count(mm.memory()), before);
    mm.free_pages(a, 2).unwrap();
}

#[test]
fn free_checks_run_in_order() {
    let mut mm = manager(32, 1);
    let total = mm.pages().allocatable_pages();
    let a = mm.alloc_pages(1).unwrap();

    assert_eq!(
        mm.free_pages(a, 0),
        Err(MemoryError::InvalidPageCount {
            op: PageOperation::Free,
            count: 0,
            available: total
        })
    );
    // Misaligned and below the window: the window check wins.
    let low = VirtualAddress::new(0x0000_1001);
    assert!(matches!(
        mm.free_pages(low, 1),
        Err(MemoryError::FreeBelowDirectMap { start, .. }) if start == low
    ));
    assert_eq!(
        mm.free_pages(a + 1, 1),
        Err(MemoryError::FreeMisaligned { address: a + 1 })
    );
    let past_ram = kernel_vmem::physical_to_virtual(mm.layout().ram.end().base());
    assert_eq!(
        mm.free_pages(past_ram, 1),
        Err(MemoryError::FreeNotRam {
            address: past_ram,
            count: 1
        })
    );
}
