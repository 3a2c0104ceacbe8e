use crate::PhysicalPage;
use core::fmt;

/// Half-open run of physical pages `[start, end)`.
///
/// Used for the RAM extent reported by the boot device table and for the
/// sub-ranges the allocators carve out of it.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalPageRange {
    start: PhysicalPage,
    end: PhysicalPage,
}

impl PhysicalPageRange {
    /// Create a range; `end` is exclusive and must not precede `start`.
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalPage, end: PhysicalPage) -> Self {
        debug_assert!(start.number() <= end.number());
        Self { start, end }
    }

    #[inline]
    #[must_use]
    pub const fn start(self) -> PhysicalPage {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(self) -> PhysicalPage {
        self.end
    }

    /// Number of pages in the range.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end.number() - self.start.number()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, page: PhysicalPage) -> bool {
        page.number() >= self.start.number() && page.number() < self.end.number()
    }

    /// Whether all of `count` pages starting at `first` lie inside the range.
    #[inline]
    #[must_use]
    pub const fn contains_run(self, first: PhysicalPage, count: u32) -> bool {
        if first.number() < self.start.number() {
            return false;
        }
        match first.number().checked_add(count) {
            Some(end) => end <= self.end.number(),
            None => false,
        }
    }

    /// The pages of the range in ascending order.
    pub fn iter(self) -> impl Iterator<Item = PhysicalPage> {
        (self.start.number()..self.end.number()).map(PhysicalPage::from_number)
    }
}

impl fmt::Debug for PhysicalPageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PhysicalPageRange({:#07X}..{:#07X})",
            self.start.number(),
            self.end.number()
        )
    }
}
