//! Move-to-front lists of recently emitted block data.
//!
//! The distance of a match from the front approximates what an LZ coder pays to reference it.

use astc_lz_rdo_common::PhysicalBlock;

/// A bounded recency list, most recent first.
#[derive(Debug, Clone)]
pub struct MtfList<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T: Copy> MtfList<T> {
    /// Creates an empty list holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MTF capacity must be non-zero");
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Removes every entry.
    #[inline]
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, most recent first.
    #[inline(always)]
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Position of the first entry accepted by `matches`.
    #[inline]
    pub fn search_by(&self, mut matches: impl FnMut(&T) -> bool) -> Option<usize> {
        self.entries.iter().position(|entry| matches(entry))
    }

    /// Moves `value` to the front.
    ///
    /// `pos` is where `value` (or an entry it replaces) currently sits. With `None` the list
    /// grows by one, or evicts its last entry when full.
    pub fn update(&mut self, value: T, pos: Option<usize>) {
        let pos = match pos {
            Some(pos) => pos,
            None => {
                if self.entries.len() < self.capacity {
                    self.entries.push(value);
                }
                self.entries.len() - 1
            }
        };

        self.entries[..=pos].rotate_right(1);
        self.entries[0] = value;
    }
}

impl MtfList<PhysicalBlock> {
    /// Position of the first entry equal to `value` in the bits selected by `mask`.
    #[inline]
    pub fn search(&self, value: PhysicalBlock, mask: PhysicalBlock) -> Option<usize> {
        let target = value & mask;
        self.search_by(|entry| (*entry & mask) == target)
    }

    /// Searches for `value` under `mask`, then moves it to the front. Returns the position it
    /// was found at.
    #[inline]
    pub fn encode(&mut self, value: PhysicalBlock, mask: PhysicalBlock) -> Option<usize> {
        let pos = self.search(value, mask);
        self.update(value, pos);
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    fn block(value: u128) -> PhysicalBlock {
        PhysicalBlock::from_u128(value)
    }

    #[test]
    fn encode_then_search_finds_front() {
        let mask = PhysicalBlock::top_bits_mask(32);
        let mut mtf = MtfList::new(4);
        let v = block(0xAB << 100);

        mtf.encode(v, mask);
        assert_eq!(mtf.search(v, mask), Some(0));
    }

    #[test]
    fn second_encode_pushes_first_back() {
        let mask = PhysicalBlock::top_bits_mask(32);
        let mut mtf = MtfList::new(4);
        let v1 = block(1 << 120);
        let v2 = block(2 << 120);

        mtf.encode(v1, mask);
        mtf.encode(v2, mask);
        assert_eq!(mtf.search(v1, mask), Some(1));
        assert_eq!(mtf.search(v2, mask), Some(0));
    }

    #[test]
    fn search_ignores_unmasked_bits() {
        let mask = PhysicalBlock::top_bits_mask(8);
        let mut mtf = MtfList::new(4);
        mtf.encode(block((0x5A << 120) | 1), mask);

        assert_eq!(mtf.search(block((0x5A << 120) | 2), mask), Some(0));
        assert_eq!(mtf.search(block(0x5B << 120), mask), None);
        assert_eq!(mtf.search(block(0x5B << 120), !mask), None);
    }

    #[test]
    fn full_list_evicts_oldest() {
        let mask = !PhysicalBlock::ZERO;
        let mut mtf = MtfList::new(3);
        for value in 1..=4 {
            assert_eq!(mtf.encode(block(value), mask), None);
        }

        assert_eq!(mtf.len(), 3);
        assert_eq!(mtf.entries(), &[block(4), block(3), block(2)]);
        assert_eq!(mtf.search(block(1), mask), None);
    }

    #[test]
    fn hit_promotes_without_growing() {
        let mask = !PhysicalBlock::ZERO;
        let mut mtf = MtfList::new(8);
        for value in 1..=3 {
            mtf.encode(block(value), mask);
        }

        assert_eq!(mtf.encode(block(1), mask), Some(2));
        assert_eq!(mtf.entries(), &[block(1), block(3), block(2)]);
    }

    #[test]
    fn empty_mask_replaces_front() {
        let mut mtf = MtfList::new(8);
        mtf.encode(block(1), !PhysicalBlock::ZERO);
        mtf.encode(block(2), !PhysicalBlock::ZERO);

        assert_eq!(mtf.encode(block(7), PhysicalBlock::ZERO), Some(0));
        assert_eq!(mtf.entries(), &[block(7), block(1)]);
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    fn size_never_exceeds_capacity(#[case] capacity: usize) {
        let mut mtf = MtfList::new(capacity);
        for value in 0..20u128 {
            mtf.encode(block(value), !PhysicalBlock::ZERO);
            assert!(mtf.len() <= mtf.capacity());
        }
        mtf.reset();
        assert!(mtf.is_empty());
    }
}
