//! Bit arrays stored in physical memory.

use kernel_vmem::PhysMemory;
use kernel_vmem::addresses::PhysicalAddress;

/// A view of `len` bits starting at `base`.
///
/// Bit `i` is bit `i % 8` (LSB first) of byte `i / 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    base: PhysicalAddress,
    len: u32,
}

impl Bitmap {
    #[must_use]
    pub const fn new(base: PhysicalAddress, len: u32) -> Self {
        Self { base, len }
    }

    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes needed to hold the bits.
    #[must_use]
    pub const fn byte_len(&self) -> u32 {
        self.len.div_ceil(8)
    }

    /// Clear every bit.
    pub fn clear<M: PhysMemory + ?Sized>(&self, mem: &mut M) {
        mem.fill(self.base, self.byte_len(), 0);
    }

    fn locate(&self, i: u32) -> (PhysicalAddress, u8) {
        debug_assert!(i < self.len, "bit {i} out of range {}", self.len);
        (self.base + i / 8, 1 << (i % 8))
    }

    #[must_use]
    pub fn get<M: PhysMemory + ?Sized>(&self, mem: &M, i: u32) -> bool {
        let (at, mask) = self.locate(i);
        mem.read_u8(at) & mask != 0
    }

    pub fn set<M: PhysMemory + ?Sized>(&self, mem: &mut M, i: u32, value: bool) {
        let (at, mask) = self.locate(i);
        let byte = mem.read_u8(at);
        mem.write_u8(at, if value { byte | mask } else { byte & !mask });
    }

    /// Set bits `[first, first + count)` to `value`.
    pub fn set_run<M: PhysMemory + ?Sized>(&self, mem: &mut M, first: u32, count: u32, value: bool) {
        for i in first..first + count {
            self.set(mem, i, value);
        }
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones<M: PhysMemory + ?Sized>(&self, mem: &M) -> u32 {
        (0..self.len).filter(|&i| self.get(mem, i)).map(|_| 1).sum()
    }
}
