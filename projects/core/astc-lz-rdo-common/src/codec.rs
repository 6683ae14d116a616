//! Codec data model and the [`BlockCodec`] contract.
//!
//! The optimizer never parses block bits itself. Everything it needs to know about a block
//! (mode tables, weight layout, endpoint unpacking) comes through the types in this module,
//! which mirror the ASTC encoder's own structures:
//!
//! - [`BlockSizeDescriptor`]: per block size lookup tables (modes, decimation, partitions).
//! - [`SymbolicBlock`]: a decoded, bit-free description of a single block.
//! - [`BlockCodec`]: conversion between symbolic and physical form, plus the weight fitting
//!   primitives used for endpoint substitution.

use crate::decode::{decompress_symbolic_block_raw, weighted_ssd};
use crate::image::ImageBlock;
use crate::physical_block::PhysicalBlock;
use crate::vecmath::{Vfloat4, Vint4};
use alloc::vec;
use alloc::vec::Vec;
use derive_enum_all_values::AllValues;

/// Maximum number of texels in a block (6x6x6).
pub const BLOCK_MAX_TEXELS: usize = 216;

/// Maximum number of stored weights in a block, across both planes.
pub const BLOCK_MAX_WEIGHTS: usize = 64;

/// Offset of the second weight plane inside [`SymbolicBlock::weights`].
pub const WEIGHTS_PLANE2_OFFSET: usize = BLOCK_MAX_WEIGHTS / 2;

/// Maximum number of color partitions in a block.
pub const BLOCK_MAX_PARTITIONS: usize = 4;

/// Number of distinct 11-bit block mode ids.
pub const BLOCK_MODE_COUNT: usize = 2048;

/// Quantization level counts used for color endpoints and weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AllValues)]
#[repr(u8)]
pub enum QuantMethod {
    /// 2 levels.
    Quant2 = 0,
    /// 3 levels.
    Quant3,
    /// 4 levels.
    Quant4,
    /// 5 levels.
    Quant5,
    /// 6 levels.
    Quant6,
    /// 8 levels.
    Quant8,
    /// 10 levels.
    Quant10,
    /// 12 levels.
    Quant12,
    /// 16 levels.
    Quant16,
    /// 20 levels.
    Quant20,
    /// 24 levels.
    Quant24,
    /// 32 levels.
    Quant32,
    /// 40 levels.
    Quant40,
    /// 48 levels.
    Quant48,
    /// 64 levels.
    Quant64,
    /// 80 levels.
    Quant80,
    /// 96 levels.
    Quant96,
    /// 128 levels.
    Quant128,
    /// 160 levels.
    Quant160,
    /// 192 levels.
    Quant192,
    /// 256 levels.
    Quant256,
}

impl QuantMethod {
    /// Number of representable levels.
    pub const fn levels(self) -> u32 {
        match self {
            Self::Quant2 => 2,
            Self::Quant3 => 3,
            Self::Quant4 => 4,
            Self::Quant5 => 5,
            Self::Quant6 => 6,
            Self::Quant8 => 8,
            Self::Quant10 => 10,
            Self::Quant12 => 12,
            Self::Quant16 => 16,
            Self::Quant20 => 20,
            Self::Quant24 => 24,
            Self::Quant32 => 32,
            Self::Quant40 => 40,
            Self::Quant48 => 48,
            Self::Quant64 => 64,
            Self::Quant80 => 80,
            Self::Quant96 => 96,
            Self::Quant128 => 128,
            Self::Quant160 => 160,
            Self::Quant192 => 192,
            Self::Quant256 => 256,
        }
    }

    /// Converts from the raw enum value, as stored in compact endpoint descriptions.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::all_values().get(value as usize).copied()
    }

    /// The pure bit quantization with `bits` bits per value, if one exists.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::Quant2),
            2 => Some(Self::Quant4),
            3 => Some(Self::Quant8),
            4 => Some(Self::Quant16),
            5 => Some(Self::Quant32),
            6 => Some(Self::Quant64),
            7 => Some(Self::Quant128),
            8 => Some(Self::Quant256),
            _ => None,
        }
    }

    /// Bits per value when the level count is a power of two.
    pub const fn bits(self) -> Option<u32> {
        let levels = self.levels();
        if levels.is_power_of_two() {
            Some(levels.trailing_zeros())
        } else {
            None
        }
    }

    /// Expands quantized weight `index` to the `0..=64` interpolation range.
    ///
    /// Power-of-two level counts use ASTC bit replication; other counts are spread linearly.
    pub fn unquantize_weight(self, index: u32) -> u8 {
        let levels = self.levels();
        let index = index.min(levels - 1);
        match self.bits() {
            Some(bits) => {
                let mut value = 0u32;
                let mut filled = 0;
                while filled < 6 {
                    let shift = 6 - filled as i32 - bits as i32;
                    value |= if shift >= 0 {
                        index << shift
                    } else {
                        index >> -shift
                    };
                    filled += bits;
                }
                let value = value & 0x3F;
                (if value > 32 { value + 1 } else { value }) as u8
            }
            None => ((index * 64 + (levels - 1) / 2) / (levels - 1)) as u8,
        }
    }
}

/// Color profile of the texture being optimized. HDR profiles are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, AllValues)]
pub enum Profile {
    /// Linear LDR.
    #[default]
    Ldr,
    /// LDR with sRGB encoded color channels.
    LdrSrgb,
}

/// Decoder settings that influence raw decoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeConfig {
    /// The color profile.
    pub profile: Profile,
    /// Emulate a decoder that outputs UNORM8 values on all channels.
    pub decode_unorm8: bool,
}

/// Kind of a decoded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolicBlockType {
    /// Malformed or unsupported encoding.
    #[default]
    Error,
    /// Constant color with UNORM16 value.
    ConstU16,
    /// Constant color with FP16 value (HDR only).
    ConstF16,
    /// A regular block with endpoints and weights.
    NonConst,
}

/// Bit-free description of a single block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicBlock {
    /// The block kind.
    pub block_type: SymbolicBlockType,
    /// Block mode id (lower 11 bits of the encoding).
    pub block_mode: u16,
    /// Number of color partitions, `1..=4`.
    pub partition_count: u8,
    /// Partition pattern index (only meaningful with more than one partition).
    pub partition_index: u16,
    /// Channel that uses the second weight plane, if the block is dual plane.
    pub plane2_component: Option<u8>,
    /// Whether all partitions share one color format.
    pub color_formats_matched: bool,
    /// Color endpoint format per partition.
    pub color_formats: [u8; BLOCK_MAX_PARTITIONS],
    /// Quantization applied to the color endpoint values.
    pub quant_mode: QuantMethod,
    /// Unquantized (`0..=255`) endpoint values per partition.
    pub color_values: [[u8; 8]; BLOCK_MAX_PARTITIONS],
    /// Constant color for constant blocks.
    pub constant_color: [i32; 4],
    /// Unquantized (`0..=64`) weights; plane 2 starts at [`WEIGHTS_PLANE2_OFFSET`].
    pub weights: [u8; BLOCK_MAX_WEIGHTS],
}

impl Default for SymbolicBlock {
    fn default() -> Self {
        Self {
            block_type: SymbolicBlockType::Error,
            block_mode: 0,
            partition_count: 0,
            partition_index: 0,
            plane2_component: None,
            color_formats_matched: false,
            color_formats: [0; BLOCK_MAX_PARTITIONS],
            quant_mode: QuantMethod::Quant2,
            color_values: [[0; 8]; BLOCK_MAX_PARTITIONS],
            constant_color: [0; 4],
            weights: [0; BLOCK_MAX_WEIGHTS],
        }
    }
}

/// A valid block mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMode {
    /// The 11-bit block mode id.
    pub mode_index: u16,
    /// Index into the descriptor's decimation table.
    pub decimation_mode: u8,
    /// Weight quantization.
    pub quant_mode: QuantMethod,
    /// Two weight planes.
    pub is_dual_plane: bool,
    /// Total number of weight bits stored at the top of the block.
    pub weight_bits: u8,
}

impl BlockMode {
    /// Weight quantization of this mode.
    #[inline(always)]
    pub fn weight_quant_mode(&self) -> QuantMethod {
        self.quant_mode
    }
}

/// Mapping from a reduced weight grid to per-texel weights.
#[derive(Debug, Clone, PartialEq)]
pub struct DecimationInfo {
    /// Texels in the block.
    pub texel_count: usize,
    /// Stored weights per plane.
    pub weight_count: usize,
    /// Weight grid width.
    pub weight_x: u8,
    /// Weight grid height.
    pub weight_y: u8,
    /// Number of grid weights contributing to each texel.
    pub texel_weight_count: Vec<u8>,
    /// Grid weight indices contributing to each texel.
    pub texel_weights: Vec<[u8; 4]>,
    /// Integer contributions (summing to 16) for each texel.
    pub texel_weight_contribs_int: Vec<[u8; 4]>,
    /// Float contributions (summing to 1) for each texel.
    pub texel_weight_contribs_float: Vec<[f32; 4]>,
}

impl DecimationInfo {
    /// Builds the ASTC bilinear infill table for a 2D block of `xdim` x `ydim` texels
    /// and a `weight_x` x `weight_y` weight grid.
    pub fn bilinear(xdim: u8, ydim: u8, weight_x: u8, weight_y: u8) -> Self {
        let (xdim_i, ydim_i) = (xdim as i32, ydim as i32);
        let (wx, wy) = (weight_x as i32, weight_y as i32);
        let texel_count = (xdim_i * ydim_i) as usize;

        let x_step = (1024 + xdim_i / 2) / (xdim_i - 1).max(1);
        let y_step = (1024 + ydim_i / 2) / (ydim_i - 1).max(1);

        let mut info = Self {
            texel_count,
            weight_count: (wx * wy) as usize,
            weight_x,
            weight_y,
            texel_weight_count: Vec::with_capacity(texel_count),
            texel_weights: Vec::with_capacity(texel_count),
            texel_weight_contribs_int: Vec::with_capacity(texel_count),
            texel_weight_contribs_float: Vec::with_capacity(texel_count),
        };

        for y in 0..ydim_i {
            for x in 0..xdim_i {
                let x_grid = (x_step * x * (wx - 1) + 32) >> 6;
                let y_grid = (y_step * y * (wy - 1) + 32) >> 6;

                let x_frac = x_grid & 0xF;
                let y_frac = y_grid & 0xF;
                let base = (x_grid >> 4) + (y_grid >> 4) * wx;

                let w11 = (x_frac * y_frac + 8) >> 4;
                let w10 = y_frac - w11;
                let w01 = x_frac - w11;
                let w00 = 16 - x_frac - y_frac + w11;

                let taps = [(base, w00), (base + 1, w01), (base + wx, w10), (base + wx + 1, w11)];

                let mut count = 0usize;
                let mut indices = [0u8; 4];
                let mut contribs = [0u8; 4];
                let mut contribs_f = [0f32; 4];
                for (index, contrib) in taps {
                    if contrib > 0 {
                        indices[count] = index as u8;
                        contribs[count] = contrib as u8;
                        contribs_f[count] = contrib as f32 / 16.0;
                        count += 1;
                    }
                }

                info.texel_weight_count.push(count as u8);
                info.texel_weights.push(indices);
                info.texel_weight_contribs_int.push(contribs);
                info.texel_weight_contribs_float.push(contribs_f);
            }
        }

        info
    }
}

/// Assignment of texels to color partitions for one partition pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Number of partitions in the pattern.
    pub partition_count: u8,
    /// Pattern index.
    pub partition_index: u16,
    /// Partition of each texel.
    pub partition_of_texel: Vec<u8>,
    /// Number of texels in each partition.
    pub partition_texel_count: [usize; BLOCK_MAX_PARTITIONS],
    /// Texel indices of each partition.
    pub texels_of_partition: [Vec<u8>; BLOCK_MAX_PARTITIONS],
}

impl PartitionInfo {
    /// Builds the lookup lists from a per-texel partition assignment.
    pub fn from_assignment(
        partition_count: u8,
        partition_index: u16,
        partition_of_texel: Vec<u8>,
    ) -> Self {
        let mut texels_of_partition: [Vec<u8>; BLOCK_MAX_PARTITIONS] = Default::default();
        for (texel, &partition) in partition_of_texel.iter().enumerate() {
            texels_of_partition[partition as usize].push(texel as u8);
        }

        Self {
            partition_count,
            partition_index,
            partition_texel_count: core::array::from_fn(|p| texels_of_partition[p].len()),
            texels_of_partition,
            partition_of_texel,
        }
    }
}

/// Lookup tables for one block footprint.
#[derive(Debug, Clone)]
pub struct BlockSizeDescriptor {
    /// Block width in texels.
    pub xdim: u8,
    /// Block height in texels.
    pub ydim: u8,
    /// Block depth in texels.
    pub zdim: u8,
    /// Texels per block.
    pub texel_count: usize,
    weight_bits_for_mode: Vec<u8>,
    block_mode_slot: Vec<u16>,
    block_modes: Vec<BlockMode>,
    decimation_infos: Vec<DecimationInfo>,
    partition_infos: Vec<Vec<PartitionInfo>>,
}

impl BlockSizeDescriptor {
    const NO_MODE: u16 = u16::MAX;

    /// Creates a descriptor from its valid block modes, decimation tables and partition tables.
    ///
    /// `partition_infos[n]` holds the patterns for `n + 1` partitions. Mode ids not listed in
    /// `block_modes` are invalid and have zero weight bits.
    ///
    /// # Panics
    ///
    /// If a mode id is outside the 11-bit range or references a missing decimation table.
    pub fn new(
        xdim: u8,
        ydim: u8,
        zdim: u8,
        block_modes: Vec<BlockMode>,
        decimation_infos: Vec<DecimationInfo>,
        partition_infos: Vec<Vec<PartitionInfo>>,
    ) -> Self {
        let mut weight_bits_for_mode = vec![0u8; BLOCK_MODE_COUNT];
        let mut block_mode_slot = vec![Self::NO_MODE; BLOCK_MODE_COUNT];

        for (slot, mode) in block_modes.iter().enumerate() {
            assert!((mode.mode_index as usize) < BLOCK_MODE_COUNT);
            assert!((mode.decimation_mode as usize) < decimation_infos.len());
            weight_bits_for_mode[mode.mode_index as usize] = mode.weight_bits;
            block_mode_slot[mode.mode_index as usize] = slot as u16;
        }

        Self {
            xdim,
            ydim,
            zdim,
            texel_count: xdim as usize * ydim as usize * zdim as usize,
            weight_bits_for_mode,
            block_mode_slot,
            block_modes,
            decimation_infos,
            partition_infos,
        }
    }

    /// Number of weight bits for a block mode id; zero for invalid modes.
    #[inline(always)]
    pub fn weight_bits_for_mode(&self, mode: u16) -> u32 {
        self.weight_bits_for_mode[(mode & 0x7FF) as usize] as u32
    }

    /// Number of weight bits stored in an encoded block; zero for constant and invalid blocks.
    #[inline(always)]
    pub fn weight_bits(&self, block: PhysicalBlock) -> u32 {
        self.weight_bits_for_mode(block.block_mode())
    }

    /// The block mode for a mode id, if valid.
    #[inline]
    pub fn get_block_mode(&self, mode: u16) -> Option<&BlockMode> {
        match self.block_mode_slot[(mode & 0x7FF) as usize] {
            Self::NO_MODE => None,
            slot => Some(&self.block_modes[slot as usize]),
        }
    }

    /// All valid block modes.
    pub fn block_modes(&self) -> &[BlockMode] {
        &self.block_modes
    }

    /// The decimation table for a [`BlockMode::decimation_mode`].
    #[inline(always)]
    pub fn get_decimation_info(&self, decimation_mode: u8) -> &DecimationInfo {
        &self.decimation_infos[decimation_mode as usize]
    }

    /// The partition table for a partition count and pattern index, if it exists.
    #[inline]
    pub fn get_partition_info(
        &self,
        partition_count: u8,
        partition_index: u16,
    ) -> Option<&PartitionInfo> {
        self.partition_infos
            .get((partition_count as usize).checked_sub(1)?)?
            .get(partition_index as usize)
    }

    /// Number of partition patterns for a partition count.
    pub fn partition_pattern_count(&self, partition_count: u8) -> usize {
        (partition_count as usize)
            .checked_sub(1)
            .and_then(|n| self.partition_infos.get(n))
            .map_or(0, Vec::len)
    }
}

/// Unpacked endpoint colors in the decoder's 16-bit integer space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnpackedEndpoints {
    /// Low endpoint.
    pub ep0: Vint4,
    /// High endpoint.
    pub ep1: Vint4,
    /// RGB channels are HDR.
    pub rgb_hdr: bool,
    /// Alpha channel is HDR.
    pub alpha_hdr: bool,
}

/// Endpoints and ideal per-texel weights for a block, the input to weight decimation.
#[derive(Debug, Clone)]
pub struct EndpointsAndWeights {
    /// Number of partitions with valid endpoints.
    pub partition_count: u8,
    /// Low endpoint per partition.
    pub endpt0: [Vfloat4; BLOCK_MAX_PARTITIONS],
    /// High endpoint per partition.
    pub endpt1: [Vfloat4; BLOCK_MAX_PARTITIONS],
    /// Ideal weight per texel, in `[0, 1]`.
    pub weights: [f32; BLOCK_MAX_TEXELS],
    /// Error scale per texel, how much a weight error costs.
    pub weight_error_scale: [f32; BLOCK_MAX_TEXELS],
    /// Every entry of [`Self::weight_error_scale`] is the same.
    pub is_constant_weight_error_scale: bool,
}

impl Default for EndpointsAndWeights {
    fn default() -> Self {
        Self {
            partition_count: 0,
            endpt0: [Vfloat4::ZERO; BLOCK_MAX_PARTITIONS],
            endpt1: [Vfloat4::ZERO; BLOCK_MAX_PARTITIONS],
            weights: [0.0; BLOCK_MAX_TEXELS],
            weight_error_scale: [0.0; BLOCK_MAX_TEXELS],
            is_constant_weight_error_scale: false,
        }
    }
}

/// The codec primitives the optimizer is built on.
///
/// Implementors must provide the descriptor, both directions of the physical/symbolic
/// conversion and endpoint unpacking. The weight helpers have default implementations that
/// follow ASTC semantics given the descriptor's decimation tables.
pub trait BlockCodec: Sync {
    /// Lookup tables for the block size this codec encodes.
    fn block_size_descriptor(&self) -> &BlockSizeDescriptor;

    /// Decodes the bits of a block. Malformed blocks yield [`SymbolicBlockType::Error`].
    fn physical_to_symbolic(&self, block: PhysicalBlock) -> SymbolicBlock;

    /// Encodes a symbolic block.
    fn symbolic_to_physical(&self, scb: &SymbolicBlock) -> PhysicalBlock;

    /// Unpacks unquantized endpoint values of a color format into 16-bit endpoint colors.
    fn unpack_color_endpoints(
        &self,
        profile: Profile,
        color_format: u8,
        color_values: &[u8; 8],
    ) -> UnpackedEndpoints;

    /// Undecimates the stored weights into per-texel weights (`0..=64`) for one or two planes.
    fn unpack_weights(
        &self,
        scb: &SymbolicBlock,
        di: &DecimationInfo,
        is_dual_plane: bool,
        plane1: &mut [i32; BLOCK_MAX_TEXELS],
        plane2: &mut [i32; BLOCK_MAX_TEXELS],
    ) {
        let infill = |texel: usize, offset: usize| {
            let mut sum = 8i32;
            for j in 0..di.texel_weight_count[texel] as usize {
                let weight = scb.weights[offset + di.texel_weights[texel][j] as usize];
                sum += weight as i32 * di.texel_weight_contribs_int[texel][j] as i32;
            }
            sum >> 4
        };

        for texel in 0..di.texel_count {
            plane1[texel] = infill(texel, 0);
        }

        if is_dual_plane {
            for texel in 0..di.texel_count {
                plane2[texel] = infill(texel, WEIGHTS_PLANE2_OFFSET);
            }
        }
    }

    /// Computes ideal (unquantized) grid weights from the per-texel ideal weights in `ei`.
    ///
    /// Without decimation the texel weights are copied; otherwise each grid weight is the
    /// error-scale weighted average of the texels it contributes to.
    fn compute_ideal_weights_for_decimation(
        &self,
        ei: &EndpointsAndWeights,
        di: &DecimationInfo,
        dec_weights_ideal: &mut [f32],
    ) {
        if di.weight_count == di.texel_count {
            dec_weights_ideal[..di.texel_count].copy_from_slice(&ei.weights[..di.texel_count]);
            return;
        }

        let mut numerator = [0f32; BLOCK_MAX_WEIGHTS];
        let mut denominator = [1e-10f32; BLOCK_MAX_WEIGHTS];
        for texel in 0..di.texel_count {
            let scale = ei.weight_error_scale[texel];
            for j in 0..di.texel_weight_count[texel] as usize {
                let index = di.texel_weights[texel][j] as usize;
                let contrib = di.texel_weight_contribs_float[texel][j] * scale;
                numerator[index] += contrib * ei.weights[texel];
                denominator[index] += contrib;
            }
        }

        for (i, out) in dec_weights_ideal[..di.weight_count].iter_mut().enumerate() {
            *out = numerator[i] / denominator[i];
        }
    }

    /// Quantizes ideal grid weights in `[low_bound, high_bound]` to the nearest level of
    /// `quant_level`, writing unquantized (`0..=64`) values.
    ///
    /// `dec_weights_quant` receives the normalized value of each chosen level.
    #[allow(clippy::too_many_arguments)]
    fn compute_quantized_weights_for_decimation(
        &self,
        di: &DecimationInfo,
        low_bound: f32,
        high_bound: f32,
        dec_weights_ideal: &[f32],
        dec_weights_quant: &mut [f32],
        dec_weights_uquant: &mut [u8],
        quant_level: QuantMethod,
    ) {
        let levels = quant_level.levels();
        let range = high_bound - low_bound;
        let scale = if range > 1e-10 { 1.0 / range } else { 0.0 };

        for i in 0..di.weight_count {
            let target = ((dec_weights_ideal[i] - low_bound) * scale).clamp(0.0, 1.0) * 64.0;
            let guess = ((target / 64.0) * (levels - 1) as f32) as u32;

            let distance = |value: u8| {
                let delta = value as f32 - target;
                delta * delta
            };
            let mut best = quant_level.unquantize_weight(guess);
            for candidate in [guess.saturating_sub(1), guess + 1] {
                let value = quant_level.unquantize_weight(candidate);
                if distance(value) < distance(best) {
                    best = value;
                }
            }

            dec_weights_uquant[i] = best;
            dec_weights_quant[i] = low_bound + range * (best as f32 / 64.0);
        }
    }

    /// Weighted error of a fully specified single plane, single partition block against `blk`.
    fn compute_symbolic_block_difference_1plane_1partition_weighted(
        &self,
        config: &DecodeConfig,
        scb: &SymbolicBlock,
        blk: &ImageBlock,
        texel_weights: &[f32],
    ) -> f32 {
        let texel_count = self.block_size_descriptor().texel_count;
        let mut decoded = [0f32; BLOCK_MAX_TEXELS * 4];
        decompress_symbolic_block_raw(self, config, scb, &mut decoded);

        weighted_ssd(
            &blk.data[..texel_count * 4],
            &decoded[..texel_count * 4],
            &texel_weights[..texel_count],
            blk.channel_weight,
        )
    }
}
