//! Optimizer settings.
//!
//! Every tunable of the search is exposed here; [`LzRdoSettings::default`] holds the values the
//! heuristics were tuned with.

use crate::error::SettingsError;
use crate::error_calc::DECODE_CACHE_ROW_ITEMS;
use astc_lz_rdo_common::{DecodeConfig, Profile, Swizzle};

/// Parameters of the heuristic LZ match cost, `base + log2(position + bias)` bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitCostModel {
    /// Fixed bits charged for any match.
    pub match_base_bits: f32,
    /// Bias added to the MTF position before taking the logarithm.
    pub match_distance_bias: f32,
}

impl Default for BitCostModel {
    fn default() -> Self {
        Self {
            match_base_bits: 10.0,
            match_distance_bias: 32.0,
        }
    }
}

/// Settings for [`lz_rdo_setup`](crate::lz_rdo_setup) and
/// [`lz_rdo_optimize`](crate::lz_rdo_optimize).
#[derive(Debug, Clone, PartialEq)]
pub struct LzRdoSettings {
    /// Rate-distortion trade-off. 0 minimizes distortion only.
    pub lambda: f32,
    /// Number of alternating forward/backward passes over each work item.
    pub num_passes: u32,
    /// Capacity of the weights MTF list.
    pub weight_history_size: usize,
    /// Capacity of the simple-endpoint MTF list. The endpoints MTF holds twice as many.
    pub endpoint_history_size: usize,
    /// Decode profile of the target decoder.
    pub profile: Profile,
    /// Emulate a UNORM8 decoder on every channel.
    pub decode_unorm8: bool,
    /// Relative error weight per RGBA channel.
    pub channel_weights: [f32; 4],
    /// Swizzle applied when loading source texels.
    pub swizzle: Swizzle,
    /// Match cost model.
    pub bit_cost: BitCostModel,
    /// Number of histogram updates between count halvings.
    pub histogram_decay_period: u32,
    /// Number of blocks drawn to seed the MTF lists at the start of each pass.
    pub max_seed_samples: usize,
    /// Work item size in blocks.
    pub max_blocks_per_item: usize,
    /// Number of decoded blocks kept in each worker's decode cache.
    pub decode_cache_entries: usize,
    /// Endpoint substitutions whose estimated error exceeds the best found so far by this
    /// factor are skipped.
    pub substitution_slack: f32,
    /// Edge length of a 2D perceptual weight tile in texels.
    pub tile_size_2d: u32,
    /// Edge length of a 3D perceptual weight tile in texels.
    pub tile_size_3d: u32,
    /// Global scale applied to lambda.
    pub lambda_scale: f32,
}

impl Default for LzRdoSettings {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            num_passes: 2,
            weight_history_size: 64,
            endpoint_history_size: 32,
            profile: Profile::Ldr,
            decode_unorm8: false,
            channel_weights: [1.0; 4],
            swizzle: Swizzle::default(),
            bit_cost: BitCostModel::default(),
            histogram_decay_period: 256,
            max_seed_samples: 64,
            max_blocks_per_item: 4096,
            decode_cache_entries: 4096,
            substitution_slack: 1.25,
            tile_size_2d: 256,
            tile_size_3d: 32,
            lambda_scale: 0.75,
        }
    }
}

impl LzRdoSettings {
    /// Largest supported histogram decay period; counts stay within `u16`.
    pub const MAX_DECAY_PERIOD: u32 = 32768;

    /// Checks every field for values the optimizer cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(SettingsError::InvalidLambda(self.lambda));
        }

        for (name, value) in [
            ("num_passes", self.num_passes as usize),
            ("weight_history_size", self.weight_history_size),
            ("endpoint_history_size", self.endpoint_history_size),
            ("tile_size_2d", self.tile_size_2d as usize),
            ("tile_size_3d", self.tile_size_3d as usize),
        ] {
            if value == 0 {
                return Err(SettingsError::ZeroCount(name));
            }
        }

        if !self.max_blocks_per_item.is_power_of_two() {
            return Err(SettingsError::NotPowerOfTwo {
                name: "max_blocks_per_item",
                value: self.max_blocks_per_item,
            });
        }

        if !self.decode_cache_entries.is_power_of_two() {
            return Err(SettingsError::NotPowerOfTwo {
                name: "decode_cache_entries",
                value: self.decode_cache_entries,
            });
        }

        if self.decode_cache_entries < DECODE_CACHE_ROW_ITEMS {
            return Err(SettingsError::DecodeCacheTooSmall {
                minimum: DECODE_CACHE_ROW_ITEMS,
                value: self.decode_cache_entries,
            });
        }

        if !(1..=Self::MAX_DECAY_PERIOD).contains(&self.histogram_decay_period) {
            return Err(SettingsError::InvalidDecayPeriod(self.histogram_decay_period));
        }

        for (name, value) in [
            ("bit_cost.match_base_bits", self.bit_cost.match_base_bits),
            ("substitution_slack", self.substitution_slack),
            ("lambda_scale", self.lambda_scale),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::InvalidTunable { name, value });
            }
        }

        // log2(position + bias) must stay defined for position 0.
        let bias = self.bit_cost.match_distance_bias;
        if !bias.is_finite() || bias < 1.0 {
            return Err(SettingsError::InvalidTunable {
                name: "bit_cost.match_distance_bias",
                value: bias,
            });
        }

        let weights = self.channel_weights;
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f32>() <= 0.0
        {
            return Err(SettingsError::InvalidChannelWeights(weights));
        }

        Ok(())
    }

    /// Decoder behavior the error metric emulates.
    pub fn decode_config(&self) -> DecodeConfig {
        DecodeConfig {
            profile: self.profile,
            decode_unorm8: self.decode_unorm8,
        }
    }

    /// Channel weights rescaled to sum to 4.
    pub(crate) fn normalized_channel_weights(&self) -> [f32; 4] {
        let sum: f32 = self.channel_weights.iter().sum();
        self.channel_weights.map(|w| w * 4.0 / sum)
    }

    /// Lambda as applied to a block of `texel_count` texels.
    pub(crate) fn effective_lambda(&self, texel_count: usize) -> f32 {
        self.lambda * self.lambda_scale * texel_count as f32 / 16.0
    }
}
