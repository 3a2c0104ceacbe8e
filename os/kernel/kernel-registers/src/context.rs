use crate::ContextSource;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// Context: coprocessor 0 register 4.
///
/// Names the active address space: the upper 20 bits hold the physical page
/// number of the page directory, the lower 12 bits are reserved and must be
/// zero when written.
///
/// ```text
/// +----------------------------------------+---------------------+
/// |    physical page number (31..12)       |  reserved (11..0)   |
/// +----------------------------------------+---------------------+
/// ```
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct Context {
    /// Bits 0–11: reserved (must be 0).
    #[bits(12)]
    pub reserved: u16,

    /// Bits 12–31: page directory physical page number.
    #[bits(20)]
    directory_page_number: u32,
}

impl Context {
    /// Create a `Context` value naming the page directory at `directory`.
    #[must_use]
    pub const fn from_page_directory(directory: PhysicalPage) -> Self {
        Self::new().with_directory_page_number(directory.number())
    }

    /// The physical page holding the active page directory.
    #[must_use]
    pub const fn page_directory(&self) -> PhysicalPage {
        PhysicalPage::from_number(self.directory_page_number())
    }

    /// The physical base address of the active page directory.
    #[must_use]
    pub const fn page_directory_address(&self) -> PhysicalAddress {
        self.page_directory().base()
    }
}

/// A fixed context value is its own source; handy for simulators and tests.
impl ContextSource for Context {
    #[inline]
    fn load_context(&self) -> Context {
        *self
    }
}

#[cfg(feature = "machine")]
mod machine {
    use super::Context;
    use crate::ContextSource;

    unsafe extern "C" {
        /// Reads the MIPS `Context` register (provided by `machine.s`).
        fn current_cpu_context() -> u32;
    }

    /// The calling core's coprocessor 0.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct Coprocessor0;

    impl ContextSource for Coprocessor0 {
        #[inline]
        fn load_context(&self) -> Context {
            // SAFETY: reading the context register has no side effects.
            Context::from_bits(unsafe { current_cpu_context() })
        }
    }
}

#[cfg(feature = "machine")]
pub use machine::Coprocessor0;
