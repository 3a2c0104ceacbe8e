//! Error types for the allocators
//!
//! Every variant except those of [`TranslationError`](kernel_vmem::TranslationError)
//! describes a condition the kernel cannot recover from: the allocator's
//! invariants can no longer be trusted. Callers propagate the error to the
//! top level and [`halt`](MemoryError::halt) there.

use core::fmt;
use kernel_vmem::addresses::VirtualAddress;

/// Which page-level entry point rejected a page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOperation {
    Alloc,
    Free,
}

impl fmt::Display for PageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alloc => "alloc_pages",
            Self::Free => "free_pages",
        })
    }
}

/// Fatal allocator conditions.
///
/// The `Display` text names the failing call, the offending address or count,
/// and the check that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("{op}: can't handle {count} pages (only {available} RAM pages available)")]
    InvalidPageCount {
        op: PageOperation,
        count: u32,
        available: u32,
    },
    #[error("alloc_pages: no run of {count} free pages left")]
    OutOfPages { count: u32 },
    #[error(
        "free_pages: virtual address {start} through {end} is too low to have come from alloc_pages"
    )]
    FreeBelowDirectMap {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    #[error("free_pages: virtual address {address} is not aligned properly")]
    FreeMisaligned { address: VirtualAddress },
    #[error("free_pages: virtual address {address} (+{count} pages) is not mapped to RAM")]
    FreeNotRam { address: VirtualAddress, count: u32 },
    #[error("free_pages: virtual address {address} is reserved and should never be freed")]
    FreeReserved { address: VirtualAddress },
    #[error("free_pages: virtual address {page} (in run at {address}) is already free")]
    AlreadyFree {
        address: VirtualAddress,
        page: VirtualAddress,
    },
    #[error("free: virtual address {address} is too low to have come from malloc")]
    HeapAddressTooLow { address: VirtualAddress },
    #[error("free: virtual address {address} is not aligned properly to have come from malloc")]
    HeapMisaligned { address: VirtualAddress },
    #[error("free: virtual address {address} is not in allocatable RAM")]
    NotHeapMemory { address: VirtualAddress },
    #[error("free: virtual address {address} was already freed, or has not been allocated")]
    DoubleFree { address: VirtualAddress },
    #[error(
        "free: virtual address {address} has bad magic ({magic:#x}), either didn't come from malloc, was freed, or is corrupted"
    )]
    BadMagic { address: VirtualAddress, magic: u32 },
    #[error("malloc: bucket page {page} is corrupted (magic {magic:#x}, block size {block_size})")]
    BucketCorrupted {
        page: VirtualAddress,
        magic: u32,
        block_size: u32,
    },
    #[error("malloc: {count} x {size} bytes does not fit in the address space")]
    SizeOverflow { size: u32, count: u32 },
    #[error("memory access of {len} bytes at {address} is outside direct-mapped RAM")]
    OutsideRam { address: VirtualAddress, len: u32 },
    #[error("mem_init: no RAM found in the device table")]
    NoRam,
    #[error("mem_init: {ram_pages} RAM pages leave nothing to allocate after {reserved} reserved pages")]
    RamTooSmall { ram_pages: u32, reserved: u32 },
}

impl MemoryError {
    /// Report the error and stop.
    ///
    /// Logs the diagnostic at `error` level, then hands control to `shutdown`,
    /// the machine's power-off routine.
    pub fn halt(self, shutdown: fn() -> !) -> ! {
        log::error!("{self}");
        shutdown()
    }
}

/// Turn a fatal allocator result into its value or a halt.
pub trait OrHalt<T> {
    fn or_halt(self, shutdown: fn() -> !) -> T;
}

impl<T> OrHalt<T> for Result<T, MemoryError> {
    #[inline]
    fn or_halt(self, shutdown: fn() -> !) -> T {
        match self {
            Ok(v) => v,
            Err(e) => e.halt(shutdown),
        }
    }
}
