//! The best distinct encodings seen for the block being optimized.

use astc_lz_rdo_common::PhysicalBlock;

/// Number of candidates kept per block.
pub const MAX_CANDIDATES: usize = 8;

/// A scored candidate encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// The encoded block.
    pub block: PhysicalBlock,
    /// Its rate-distortion cost.
    pub rd_cost: f32,
    /// Endpoints MTF position of the block, if matched.
    pub mtf_position: Option<usize>,
    /// Number of weight bits the block stores.
    pub weight_bits: u32,
}

/// Up to [`MAX_CANDIDATES`] candidates sorted by ascending cost.
#[derive(Debug, Clone)]
pub struct CandidateList {
    candidates: [Candidate; MAX_CANDIDATES],
    count: usize,
}

impl Default for CandidateList {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            candidates: [Candidate {
                block: PhysicalBlock::ZERO,
                rd_cost: 0.0,
                mtf_position: None,
                weight_bits: 0,
            }; MAX_CANDIDATES],
            count: 0,
        }
    }

    /// Whether a candidate costing at least `cost` would not make the list.
    #[inline(always)]
    pub fn quick_reject(&self, cost: f32) -> bool {
        self.count == MAX_CANDIDATES && cost >= self.candidates[MAX_CANDIDATES - 1].rd_cost
    }

    /// Inserts a candidate in cost order, dropping the most expensive one when full.
    pub fn add(
        &mut self,
        block: PhysicalBlock,
        rd_cost: f32,
        mtf_position: Option<usize>,
        weight_bits: u32,
    ) {
        if self.quick_reject(rd_cost) {
            return;
        }

        let mut insert_pos = self.count.min(MAX_CANDIDATES - 1);
        while insert_pos > 0 && rd_cost < self.candidates[insert_pos - 1].rd_cost {
            self.candidates[insert_pos] = self.candidates[insert_pos - 1];
            insert_pos -= 1;
        }

        self.candidates[insert_pos] = Candidate {
            block,
            rd_cost,
            mtf_position,
            weight_bits,
        };

        if self.count < MAX_CANDIDATES {
            self.count += 1;
        }
    }

    /// Candidates, cheapest first.
    #[inline(always)]
    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates[..self.count]
    }

    /// Number of candidates.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the list is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
