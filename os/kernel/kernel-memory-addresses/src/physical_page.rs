use crate::{MemoryAddress, PageOffset, PhysicalAddress};
use core::fmt;
use core::ops::Add;

/// A 4 KiB physical page, identified by its page number.
///
/// ### Semantics
/// - `base()` returns the page base as a [`PhysicalAddress`].
/// - `join(off)` combines this page with a [`PageOffset`] to form a full
///   [`PhysicalAddress`].
/// - The page number is what hardware entries store in their upper 20 bits and
///   what the allocators use as an index into RAM.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pp = PhysicalPage::from_number(0x10);
/// assert_eq!(pp.base().as_u32(), 0x1_0000);
/// assert_eq!(pp + 2, PhysicalPage::from_number(0x12));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u32);

impl PhysicalPage {
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self(number)
    }

    #[inline]
    #[must_use]
    pub const fn from_addr(p: PhysicalAddress) -> Self {
        p.page()
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(MemoryAddress::from_page_number(self.0))
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: PageOffset) -> PhysicalAddress {
        PhysicalAddress(MemoryAddress::new(self.base().as_u32() | off.as_u32()))
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, pages: u32) -> Option<Self> {
        match self.0.checked_add(pages) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ppn {:#07X}", self.0)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage({:#07X})", self.0)
    }
}

impl Add<u32> for PhysicalPage {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}
