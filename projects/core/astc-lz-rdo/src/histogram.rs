//! Adaptive frequency model of the leading block bytes.
//!
//! The first bytes of a block select its mode and partitioning, so they repeat far more often
//! than the rest of an unmatched block. They are priced from recent statistics instead of at a
//! flat bit per bit.

use astc_lz_rdo_common::vecmath::fast_log2;
use astc_lz_rdo_common::PhysicalBlock;

/// Number of leading bytes modelled.
pub const HISTOGRAM_BYTES: usize = 2;

/// Implicit count in every bucket so no byte value is free of cost.
const BIAS: f32 = 0.25;

/// Byte-value histograms of the first [`HISTOGRAM_BYTES`] block bytes, decayed periodically.
#[derive(Debug, Clone)]
pub struct ModeByteHistogram {
    counts: [[u16; 256]; HISTOGRAM_BYTES],
    totals: [u32; HISTOGRAM_BYTES],
    counter: u32,
    decay_period: u32,
}

impl ModeByteHistogram {
    /// Creates an empty histogram that halves its counts every `decay_period` updates.
    ///
    /// # Panics
    ///
    /// If `decay_period` is zero or above 32768, where counts could overflow.
    pub fn new(decay_period: u32) -> Self {
        assert!((1..=32768).contains(&decay_period));
        Self {
            counts: [[0; 256]; HISTOGRAM_BYTES],
            totals: [0; HISTOGRAM_BYTES],
            counter: 0,
            decay_period,
        }
    }

    /// Clears all counts.
    pub fn reset(&mut self) {
        self.counts = [[0; 256]; HISTOGRAM_BYTES];
        self.totals = [0; HISTOGRAM_BYTES];
        self.counter = 0;
    }

    /// Adds the leading bytes of `block`.
    pub fn update(&mut self, block: PhysicalBlock) {
        self.counter += 1;
        if self.counter == self.decay_period {
            self.counter = 0;
            for (counts, total) in self.counts.iter_mut().zip(self.totals.iter_mut()) {
                *total = 0;
                for count in counts.iter_mut() {
                    *count >>= 1;
                    *total += *count as u32;
                }
            }
        }

        for (index, (counts, total)) in self.counts.iter_mut().zip(self.totals.iter_mut()).enumerate() {
            counts[block.byte(index) as usize] += 1;
            *total += 1;
        }
    }

    /// Estimated bits to code the leading bytes of `block` as literals.
    pub fn cost(&self, block: PhysicalBlock) -> f32 {
        let mut numerator = 1.0f32;
        let mut denominator = 1.0f32;
        for index in 0..HISTOGRAM_BYTES {
            numerator *= self.totals[index] as f32 + 256.0 * BIAS;
            denominator *= self.counts[index][block.byte(index) as usize] as f32 + BIAS;
        }

        fast_log2(numerator / denominator)
    }

    /// Sum of the counts of table `index`.
    pub fn total(&self, index: usize) -> u32 {
        self.totals[index]
    }
}
