//! Size classes for small allocations
//!
//! Requests of up to half a page are rounded up to a power of two between
//! 32 and 2048 bytes. Each class packs its blocks into dedicated bucket pages.

use kernel_vmem::addresses::PAGE_SIZE;

/// log2 of the smallest block size.
pub const MIN_BLOCK_SHIFT: u32 = 5;

/// log2 of the largest block size.
pub const MAX_BLOCK_SHIFT: u32 = 11;

/// Number of size classes.
pub const CLASS_COUNT: usize = (MAX_BLOCK_SHIFT - MIN_BLOCK_SHIFT + 1) as usize;

/// Largest request served from a bucket; anything bigger is a big block.
pub const MAX_SMALL_SIZE: u32 = 1 << MAX_BLOCK_SHIFT;

const _: () = {
    // A bucket header (32 bytes) always fits in block 0.
    assert!(1 << MIN_BLOCK_SHIFT >= 32);
    // The busy bitmap (16 bytes) covers every block of the smallest class.
    assert!(PAGE_SIZE >> MIN_BLOCK_SHIFT <= 16 * 8);
    assert!(MAX_SMALL_SIZE == PAGE_SIZE / 2);
};

/// One of the power-of-two block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass {
    shift: u8,
}

impl SizeClass {
    pub const SMALLEST: Self = Self::from_shift(MIN_BLOCK_SHIFT);
    pub const LARGEST: Self = Self::from_shift(MAX_BLOCK_SHIFT);

    #[allow(clippy::cast_possible_truncation)]
    const fn from_shift(shift: u32) -> Self {
        Self { shift: shift as u8 }
    }

    /// The smallest class that holds `size` bytes, or `None` for big blocks.
    ///
    /// Zero-byte requests use the smallest class.
    #[must_use]
    pub const fn for_size(size: u32) -> Option<Self> {
        if size > MAX_SMALL_SIZE {
            return None;
        }
        let mut shift = MIN_BLOCK_SHIFT;
        while (1 << shift) < size {
            shift += 1;
        }
        Some(Self::from_shift(shift))
    }

    /// The class whose blocks are exactly `block_size` bytes.
    #[must_use]
    pub const fn from_block_size(block_size: u32) -> Option<Self> {
        if block_size.is_power_of_two() {
            let shift = block_size.trailing_zeros();
            if shift >= MIN_BLOCK_SHIFT && shift <= MAX_BLOCK_SHIFT {
                return Some(Self::from_shift(shift));
            }
        }
        None
    }

    #[must_use]
    pub const fn block_size(self) -> u32 {
        1 << self.shift
    }

    /// Position among all classes, smallest first.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.shift as u32 - MIN_BLOCK_SHIFT) as usize
    }

    /// Blocks per page, including the header block 0.
    #[must_use]
    pub const fn blocks_per_page(self) -> u32 {
        PAGE_SIZE >> self.shift
    }

    /// All classes, smallest first.
    pub fn all() -> impl Iterator<Item = Self> {
        (MIN_BLOCK_SHIFT..=MAX_BLOCK_SHIFT).map(Self::from_shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_uses_smallest_class() {
        assert_eq!(SizeClass::for_size(0), Some(SizeClass::SMALLEST));
        assert_eq!(SizeClass::for_size(1).map(SizeClass::block_size), Some(32));
    }

    #[test]
    fn exact_and_intermediate_sizes() {
        assert_eq!(SizeClass::for_size(32).map(SizeClass::block_size), Some(32));
        assert_eq!(SizeClass::for_size(33).map(SizeClass::block_size), Some(64));
        assert_eq!(SizeClass::for_size(1025).map(SizeClass::block_size), Some(2048));
        assert_eq!(SizeClass::for_size(2048), Some(SizeClass::LARGEST));
    }

    #[test]
    fn big_sizes_have_no_class() {
        assert_eq!(SizeClass::for_size(2049), None);
        assert_eq!(SizeClass::for_size(u32::MAX), None);
    }

    #[test]
    fn block_size_round_trip() {
        assert_eq!(SizeClass::all().count(), CLASS_COUNT);
        for (i, class) in SizeClass::all().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(SizeClass::from_block_size(class.block_size()), Some(class));
        }
        assert_eq!(SizeClass::from_block_size(16), None);
        assert_eq!(SizeClass::from_block_size(48), None);
        assert_eq!(SizeClass::from_block_size(4096), None);
    }

    #[test]
    fn blocks_per_page() {
        assert_eq!(SizeClass::SMALLEST.blocks_per_page(), 128);
        assert_eq!(SizeClass::LARGEST.blocks_per_page(), 2);
    }
}
