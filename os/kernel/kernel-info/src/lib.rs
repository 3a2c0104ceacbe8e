//! # Machine Configuration and Boot Interface
//!
//! This crate defines the memory layout constants and the boot parameter block
//! shared by every part of the memory subsystem. It is the single source of
//! truth for where things live on the simulated MIPS-like machine.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! Defines the simulator-to-kernel handoff:
//! * **Device table**: up to 16 `(type, model, start, end)` entries describing
//!   the physical address space (ROM, devices, RAM).
//! * **Bootloader pages**: how many RAM pages, counted from the start of RAM,
//!   the loader already used.
//! * **RAM layout**: [`boot::RamLayout`], the already-extracted integers the
//!   memory subsystem is initialized from.
//!
//! ### Memory Layout ([`memory`])
//! Establishes the kernel's address space conventions.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  ROM (boot parameters)          │
//! 0x0000_1000 ├─────────────────────────────────┤
//!             │  keyboard I/O                   │
//! 0x0000_2000 ├─────────────────────────────────┤
//!             │  console I/O                    │
//! 0x0000_3000 ├─────────────────────────────────┤
//!             │  network I/O                    │
//! 0x0000_4000 ├─────────────────────────────────┤
//!             │  RAM: bootloader pages          │
//!             │       allocator bitmap          │
//!             │       allocatable pages         │
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Virtual Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  page-table mapped              │
//!             │  (kernel code, stacks, ...)     │
//! 0xC000_0000 ├─────────────────────────────────┤ DIRECT_MAP_BASE
//!             │  direct map: VA = base + PA     │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
