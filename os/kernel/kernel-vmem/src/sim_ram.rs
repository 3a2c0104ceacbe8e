use crate::PhysMemory;
use crate::addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, PhysicalPageRange};
use alloc::vec;
use alloc::vec::Vec;

/// A heap-backed image of the machine's RAM, indexed by physical page number.
///
/// Only the pages of the configured range exist. Fresh memory is filled with
/// [`SimulatedRam::POISON`] so that code relying on zeroed pages without
/// zeroing them shows up in tests.
pub struct SimulatedRam {
    range: PhysicalPageRange,
    bytes: Vec<u8>,
}

impl SimulatedRam {
    /// Initial content of every byte.
    pub const POISON: u8 = 0xA5;

    #[must_use]
    pub fn new(range: PhysicalPageRange) -> Self {
        let len = range.len() as usize * PAGE_SIZE as usize;
        Self {
            range,
            bytes: vec![Self::POISON; len],
        }
    }

    /// Pages `[start, end)`.
    #[must_use]
    pub fn from_page_numbers(start: u32, end: u32) -> Self {
        Self::new(PhysicalPageRange::new(
            PhysicalPage::from_number(start),
            PhysicalPage::from_number(end),
        ))
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> PhysicalPageRange {
        self.range
    }

    /// The 4096 bytes of `page`.
    ///
    /// # Panics
    /// If `page` is outside the simulated range.
    #[must_use]
    pub fn page_bytes(&self, page: PhysicalPage) -> &[u8] {
        let at = self.index(page.base(), PAGE_SIZE as usize);
        &self.bytes[at..at + PAGE_SIZE as usize]
    }

    fn index(&self, pa: PhysicalAddress, len: usize) -> usize {
        let start = self.range.start().base().as_u32();
        let offset = pa
            .as_u32()
            .checked_sub(start)
            .map(|o| o as usize)
            .filter(|&o| o.checked_add(len).is_some_and(|end| end <= self.bytes.len()));
        match offset {
            Some(o) => o,
            None => panic!(
                "physical access {pa:?}+{len} outside simulated RAM {:?}",
                self.range
            ),
        }
    }
}

impl PhysMemory for SimulatedRam {
    /// # Panics
    /// If any byte lies outside the simulated range.
    fn read_bytes(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        let at = self.index(pa, buf.len());
        buf.copy_from_slice(&self.bytes[at..at + buf.len()]);
    }

    /// # Panics
    /// If any byte lies outside the simulated range.
    fn write_bytes(&mut self, pa: PhysicalAddress, data: &[u8]) {
        let at = self.index(pa, data.len());
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    fn fill(&mut self, pa: PhysicalAddress, len: u32, byte: u8) {
        let at = self.index(pa, len as usize);
        self.bytes[at..at + len as usize].fill(byte);
    }
}

impl core::fmt::Debug for SimulatedRam {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedRam")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}
