//! # Two-Level Page Tables
//!
//! The machine walks two levels to translate a virtual address that lies
//! below the direct map:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! - [`pd`]: the page directory, 1024 PDEs, named by the context register.
//! - [`pt`]: a page table, 1024 PTEs, each mapping one 4 KiB page.
//!
//! Both tables live in physical RAM and are accessed through a
//! [`PhysMemory`](crate::PhysMemory) backend rather than through references,
//! so the same code walks the machine's tables and a simulated RAM image.

pub mod pd;
pub mod pt;

use crate::addresses::VirtualAddress;
use pd::DirectoryIndex;
use pt::TableIndex;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from(va), TableIndex::from(va))
}
