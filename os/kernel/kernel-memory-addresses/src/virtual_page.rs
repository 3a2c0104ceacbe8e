use crate::{MemoryAddress, PageOffset, VirtualAddress};
use core::fmt;
use core::ops::Add;

/// A 4 KiB virtual page, identified by its page number.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xC000_4010);
/// let vp = va.page();
/// assert_eq!(vp.base().as_u32(), 0xC000_4000);
/// assert_eq!(vp.join(va.offset()), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self(number)
    }

    #[inline]
    #[must_use]
    pub const fn containing_address(va: VirtualAddress) -> Self {
        va.page()
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(MemoryAddress::from_page_number(self.0))
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: PageOffset) -> VirtualAddress {
        VirtualAddress(MemoryAddress::new(self.base().as_u32() | off.as_u32()))
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vpn {:#07X}", self.0)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage({:#07X})", self.0)
    }
}

impl Add<u32> for VirtualPage {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
