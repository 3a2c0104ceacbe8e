use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalPage;

/// A single 32-bit page directory or page table entry in its raw bitfield form.
///
/// This structure models the **common superset** of the two entry kinds the
/// machine knows about. Page directory entries only use the `valid` bit and the
/// page number; page table entries additionally carry the permission and cache
/// bits.
///
/// ### Bit layout
///
/// | Bits   | Name               | Meaning |
/// |--------|--------------------|---------|
/// | 0      | `V` (valid)        | Valid entry if set |
/// | 1      | `W` (writable)     | Writable if set (PTE only) |
/// | 2      | `X` (executable)   | Instruction fetch allowed (PTE only) |
/// | 3      | `C` (cache-disable)| Bypass caches, for device pages (PTE only) |
/// | 4–11   | unused             | Ignored by hardware, free for OS use |
/// | 12–31  | page number        | Physical page of the next table or the data page |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_vmem::addresses::PhysicalPage;
/// let e = PageEntryBits::new_kernel_rw().with_page(PhysicalPage::from_number(0x12345));
/// assert!(e.valid());
/// assert_eq!(e.into_bits(), 0x1234_5003);
/// ```
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageEntryBits {
    /// Valid (V, bit 0).
    ///
    /// Clear means the walk stops here and the address is not mapped.
    pub valid: bool,

    /// Writable (W, bit 1).
    ///
    /// Writes through a mapping without it raise a `MOD` exception.
    pub writable: bool,

    /// Executable (X, bit 2).
    ///
    /// Instruction fetches through a mapping without it raise a `NOEX` exception.
    pub executable: bool,

    /// Cache-Disable (C, bit 3).
    ///
    /// Set for pages used for memory-mapped device I/O.
    pub cache_disabled: bool,

    /// Bits 4–11, ignored by the hardware.
    #[bits(8)]
    pub os_available: u8,

    /// Physical page number (bits 12–31).
    #[bits(20)]
    page_number: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.page_number())
    }

    #[inline]
    pub const fn set_page(&mut self, page: PhysicalPage) {
        self.set_page_number(page.number());
    }

    #[inline]
    #[must_use]
    pub const fn with_page(self, page: PhysicalPage) -> Self {
        self.with_page_number(page.number())
    }

    /// Flags the machine uses for the direct map: valid, writable, not executable.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new()
            .with_valid(true)
            .with_writable(true)
            .with_executable(false)
            .with_cache_disabled(false)
    }

    /// Flags for kernel code: valid, read-only, executable.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rx() -> Self {
        Self::new()
            .with_valid(true)
            .with_writable(false)
            .with_executable(true)
            .with_cache_disabled(false)
    }

    /// Flags for memory-mapped device registers.
    #[inline]
    #[must_use]
    pub const fn new_device() -> Self {
        Self::new()
            .with_valid(true)
            .with_writable(true)
            .with_executable(false)
            .with_cache_disabled(true)
    }
}
