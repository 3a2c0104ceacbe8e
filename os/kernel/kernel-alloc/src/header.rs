//! Headers at the start of heap-owned pages
//!
//! `free` receives nothing but a pointer, so every heap page describes itself:
//!
//! ```text
//! bucket page (block 0, 32 bytes)        big block (first page, 8 bytes)
//! +0   magic  0xFEEDFACE                  +0  magic  0xF00DFACE
//! +4   block size                         +4  page count
//! +8   prev bucket page number            +8  payload ...
//! +12  next bucket page number
//! +16  busy bitmap (128 bits)
//! ```
//!
//! All words are native-endian `u32`. A freed big block has its magic
//! overwritten with `0xDEADF00D` so a second `free` is caught as bad magic.

use crate::bitmap::Bitmap;
use crate::size_class::SizeClass;
use kernel_vmem::PhysMemory;
use kernel_vmem::addresses::{PhysicalAddress, PhysicalPage};

pub const BUCKET_MAGIC: u32 = 0xFEED_FACE;
pub const BIG_BLOCK_MAGIC: u32 = 0xF00D_FACE;
pub const FREED_BIG_BLOCK_MAGIC: u32 = 0xDEAD_F00D;

/// Bytes in front of a big block's payload.
pub const BIG_BLOCK_HEADER_SIZE: u32 = 8;

const MAGIC: u32 = 0;
const BLOCK_SIZE: u32 = 4;
const PAGE_COUNT: u32 = 4;
const PREV: u32 = 8;
const NEXT: u32 = 12;
const BUSY_BITMAP: u32 = 16;
const BUSY_BITS: u32 = 128;

/// What the first words of a heap page say about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageHeader {
    /// A bucket page; `block_size` is as stored and may itself be corrupt.
    Bucket { block_size: u32 },
    /// The first page of a big block run.
    BigBlock { page_count: u32 },
    /// Neither tag: not heap memory, freed, or corrupted.
    Unrecognized { tag: u32 },
}

impl PageHeader {
    #[must_use]
    pub fn read<M: PhysMemory + ?Sized>(mem: &M, page: PhysicalPage) -> Self {
        let base = page.base();
        match mem.read_u32(base + MAGIC) {
            BUCKET_MAGIC => Self::Bucket {
                block_size: mem.read_u32(base + BLOCK_SIZE),
            },
            BIG_BLOCK_MAGIC => Self::BigBlock {
                page_count: mem.read_u32(base + PAGE_COUNT),
            },
            tag => Self::Unrecognized { tag },
        }
    }

    /// Write a big-block header at the start of `page`.
    pub fn write_big_block<M: PhysMemory + ?Sized>(mem: &mut M, page: PhysicalPage, page_count: u32) {
        mem.write_u32(page.base() + MAGIC, BIG_BLOCK_MAGIC);
        mem.write_u32(page.base() + PAGE_COUNT, page_count);
    }

    /// Mark the big block at `page` as returned.
    pub fn retire_big_block<M: PhysMemory + ?Sized>(mem: &mut M, page: PhysicalPage) {
        mem.write_u32(page.base() + MAGIC, FREED_BIG_BLOCK_MAGIC);
    }
}

/// View of the header in block 0 of a bucket page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPage {
    page: PhysicalPage,
}

impl BucketPage {
    #[must_use]
    pub const fn new(page: PhysicalPage) -> Self {
        Self { page }
    }

    #[must_use]
    pub const fn page(self) -> PhysicalPage {
        self.page
    }

    const fn word(self, offset: u32) -> PhysicalAddress {
        PhysicalAddress::new(self.page.base().as_u32() + offset)
    }

    /// Write a fresh header for `class`: no busy blocks, linked to itself.
    pub fn init<M: PhysMemory + ?Sized>(self, mem: &mut M, class: SizeClass) {
        mem.write_u32(self.word(MAGIC), BUCKET_MAGIC);
        mem.write_u32(self.word(BLOCK_SIZE), class.block_size());
        self.set_prev(mem, self.page);
        self.set_next(mem, self.page);
        self.busy().clear(mem);
    }

    #[must_use]
    pub fn magic<M: PhysMemory + ?Sized>(self, mem: &M) -> u32 {
        mem.read_u32(self.word(MAGIC))
    }

    #[must_use]
    pub fn block_size<M: PhysMemory + ?Sized>(self, mem: &M) -> u32 {
        mem.read_u32(self.word(BLOCK_SIZE))
    }

    #[must_use]
    pub fn prev<M: PhysMemory + ?Sized>(self, mem: &M) -> PhysicalPage {
        PhysicalPage::from_number(mem.read_u32(self.word(PREV)))
    }

    #[must_use]
    pub fn next<M: PhysMemory + ?Sized>(self, mem: &M) -> PhysicalPage {
        PhysicalPage::from_number(mem.read_u32(self.word(NEXT)))
    }

    pub fn set_prev<M: PhysMemory + ?Sized>(self, mem: &mut M, page: PhysicalPage) {
        mem.write_u32(self.word(PREV), page.number());
    }

    pub fn set_next<M: PhysMemory + ?Sized>(self, mem: &mut M, page: PhysicalPage) {
        mem.write_u32(self.word(NEXT), page.number());
    }

    /// One bit per block; bit 0 (the header block) is never set.
    #[must_use]
    pub const fn busy(self) -> Bitmap {
        Bitmap::new(self.word(BUSY_BITMAP), BUSY_BITS)
    }

    /// Index of the first free block (never 0), if any.
    #[must_use]
    pub fn first_free<M: PhysMemory + ?Sized>(self, mem: &M, class: SizeClass) -> Option<u32> {
        let busy = self.busy();
        (1..class.blocks_per_page()).find(|&j| !busy.get(mem, j))
    }
}
