//! # Kernel Memory Allocation
//!
//! The allocators of the memory subsystem, layered on top of each other:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 HeapAllocator                       │
//! │    • malloc / calloc / free                         │
//! │    • 32..2048 byte size classes in bucket pages     │
//! │    • big blocks for anything larger                 │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ whole pages
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 PageAllocator                       │
//! │    • alloc_pages / calloc_pages / free_pages        │
//! │    • one bit per page, kept in RAM                  │
//! │    • owns the RAM extent and the reserved prefix    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ physical ↔ virtual
//! ┌─────────────────▼───────────────────────────────────┐
//! │         AddressTranslator (kernel-vmem)             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryManager`] bundles all three with the [`PhysMemory`] backend and is
//! the one object the rest of the kernel talks to.
//!
//! ## Failure model
//!
//! Allocator misuse, exhaustion and corruption are reported as
//! [`MemoryError`]s at the point of detection, with no rollback. None of them
//! is recoverable; the caller halts via [`MemoryError::halt`] or
//! [`OrHalt::or_halt`]. Translation misses are the exception and come back as
//! a plain [`TranslationError`](kernel_vmem::TranslationError).
//!
//! ## Sharing
//!
//! Nothing here synchronizes internally. Across cores, wrap the manager in a
//! [`LockedMemory`]; when interrupt handlers allocate too, lock it with
//! [`lock_irq`](kernel_sync::Mutex::lock_irq).
//!
//! ```rust
//! use kernel_alloc::{LockedMemory, MemoryManager};
//! use kernel_info::boot::RamLayout;
//! use kernel_vmem::SimulatedRam;
//!
//! let layout = RamLayout::from_page_numbers(4, 68, 2);
//! let mm = MemoryManager::new(SimulatedRam::new(layout.ram), layout).unwrap();
//! let shared = LockedMemory::new(mm);
//!
//! let p = shared.with_lock(|mm| mm.malloc(100)).unwrap();
//! shared.with_lock(|mm| mm.free(p)).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod bitmap;
mod error;
pub mod header;
mod heap;
mod manager;
mod page_alloc;
pub mod size_class;

pub use crate::error::{MemoryError, OrHalt, PageOperation};
pub use crate::heap::HeapAllocator;
pub use crate::manager::MemoryManager;
pub use crate::page_alloc::PageAllocator;
pub use crate::size_class::SizeClass;
pub use kernel_vmem::PhysMemory;

/// A [`MemoryManager`] shared between cores.
pub type LockedMemory<M> = kernel_sync::SpinMutex<MemoryManager<M>>;
