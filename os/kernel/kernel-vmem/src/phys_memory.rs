//! # Physical Memory Access
//!
//! Everything that lives in physical RAM (page tables, the page allocator's
//! bitmap, heap page headers) is reached through [`PhysMemory`]. The trait
//! plays the role of a physical mapper: on the machine it goes through the
//! direct map at `0xC000_0000` ([`DirectMap`], feature `machine`); on the host
//! it indexes a [`SimulatedRam`](crate::SimulatedRam) arena.
//!
//! Multi-byte words are read and written in native byte order, as the machine
//! would see them through a `u32` load or store.

use crate::addresses::PhysicalAddress;

/// Byte-addressed access to physical RAM.
///
/// Implementations may panic when asked to touch an address they do not back;
/// callers are expected to stay inside the RAM extent they were given.
pub trait PhysMemory {
    /// Copy `buf.len()` bytes starting at `pa` into `buf`.
    fn read_bytes(&self, pa: PhysicalAddress, buf: &mut [u8]);

    /// Copy `data` to physical memory starting at `pa`.
    fn write_bytes(&mut self, pa: PhysicalAddress, data: &[u8]);

    /// Set `len` bytes starting at `pa` to `byte`.
    fn fill(&mut self, pa: PhysicalAddress, len: u32, byte: u8) {
        const CHUNK: u32 = 64;
        let pattern = [byte; CHUNK as usize];
        let mut done = 0;
        while done < len {
            let n = CHUNK.min(len - done);
            self.write_bytes(pa + done, &pattern[..n as usize]);
            done += n;
        }
    }

    #[inline]
    fn read_u8(&self, pa: PhysicalAddress) -> u8 {
        let mut b = [0u8; 1];
        self.read_bytes(pa, &mut b);
        b[0]
    }

    #[inline]
    fn write_u8(&mut self, pa: PhysicalAddress, value: u8) {
        self.write_bytes(pa, &[value]);
    }

    #[inline]
    fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        let mut b = [0u8; 4];
        self.read_bytes(pa, &mut b);
        u32::from_ne_bytes(b)
    }

    #[inline]
    fn write_u32(&mut self, pa: PhysicalAddress, value: u32) {
        self.write_bytes(pa, &value.to_ne_bytes());
    }
}

impl<T: PhysMemory + ?Sized> PhysMemory for &mut T {
    #[inline]
    fn read_bytes(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        (**self).read_bytes(pa, buf);
    }

    #[inline]
    fn write_bytes(&mut self, pa: PhysicalAddress, data: &[u8]) {
        (**self).write_bytes(pa, data);
    }

    #[inline]
    fn fill(&mut self, pa: PhysicalAddress, len: u32, byte: u8) {
        (**self).fill(pa, len, byte);
    }
}

/// Physical memory as seen through the machine's direct map.
///
/// Every access to physical address `pa` is a volatile access to virtual
/// address `0xC000_0000 + pa`.
#[cfg(feature = "machine")]
#[derive(Debug)]
pub struct DirectMap {
    _private: (),
}

#[cfg(feature = "machine")]
impl DirectMap {
    /// # Safety
    /// The direct map must be installed and cover every physical address
    /// later handed to this accessor. There must be exactly one `DirectMap`
    /// in use per memory manager; accesses are not synchronized.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    #[inline]
    fn ptr(pa: PhysicalAddress) -> *mut u8 {
        crate::physical_to_virtual(pa).as_u32() as usize as *mut u8
    }
}

#[cfg(feature = "machine")]
impl PhysMemory for DirectMap {
    fn read_bytes(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        let base = Self::ptr(pa);
        for (i, b) in buf.iter_mut().enumerate() {
            // SAFETY: `new` requires the direct map to cover `pa`.
            *b = unsafe { base.add(i).read_volatile() };
        }
    }

    fn write_bytes(&mut self, pa: PhysicalAddress, data: &[u8]) {
        let base = Self::ptr(pa);
        for (i, b) in data.iter().enumerate() {
            // SAFETY: `new` requires the direct map to cover `pa`.
            unsafe { base.add(i).write_volatile(*b) };
        }
    }
}
