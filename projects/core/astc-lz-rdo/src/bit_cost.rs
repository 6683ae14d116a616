//! Approximate LZ cost of a block given its match positions.

use crate::config::BitCostModel;
use crate::histogram::ModeByteHistogram;
use astc_lz_rdo_common::vecmath::fast_log2;
use astc_lz_rdo_common::PhysicalBlock;

impl BitCostModel {
    /// Bits to reference an MTF entry at `position`.
    #[inline(always)]
    pub fn match_cost(&self, position: usize) -> f32 {
        self.match_base_bits + fast_log2(position as f32 + self.match_distance_bias)
    }

    /// Estimated bits to code `block`, whose top `weight_bits` bits hold its weights.
    ///
    /// `endpoint_pos` and `weight_pos` are the MTF positions of the block's endpoint and weight
    /// portions, `None` when unmatched. Unmatched endpoints are literals, except for the leading
    /// bytes which `histogram` prices. A weight match from the same MTF slot as the endpoint
    /// match is one combined match.
    pub fn calculate_bit_cost_simple(
        &self,
        endpoint_pos: Option<usize>,
        weight_pos: Option<usize>,
        block: PhysicalBlock,
        weight_bits: u32,
        histogram: &ModeByteHistogram,
    ) -> f32 {
        let endpoint_bits = 128 - weight_bits;

        let mut cost = match endpoint_pos {
            None => endpoint_bits as f32 - 16.0 + histogram.cost(block),
            Some(position) => {
                let cost = self.match_cost(position);
                if weight_pos == Some(position) {
                    return cost;
                }
                cost
            }
        };

        // Bits sharing a byte with the weights are coded as literals.
        if endpoint_bits & 7 != 0 {
            cost += (8 - (endpoint_bits & 7)) as f32;
        }

        cost += match weight_pos {
            None => (weight_bits & !7) as f32,
            Some(position) => self.match_cost(position),
        };

        cost
    }
}
