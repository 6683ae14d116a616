//! A compact ASTC-style LDR codec for 2D blocks.
//!
//! This is not the ASTC bit format, but it keeps every property the optimizer relies on:
//!
//! - 128-bit little-endian blocks with an 11-bit block mode in the low bits and the partition
//!   count in the two bits above it.
//! - Weights stored bit-reversed from bit 127 downwards, so the weight portion of a block is
//!   always a top-bits mask whose size depends only on the block mode.
//! - ASTC void-extent constant blocks (`FC FD FF FF FF FF FF FF` followed by RGBA u16).
//! - Bilinear weight infill, direct L/LA/RGB/RGBA endpoint formats and bit replication.
//!
//! Layout of a regular block (bit offsets from the least significant bit):
//!
//! | bits | single partition | two partitions |
//! |---|---|---|
//! | 0..11 | block mode | block mode |
//! | 11..13 | partition count - 1 | partition count - 1 |
//! | 13..17 | color format | partition pattern |
//! | 17.. | plane 2 component (dual plane, 2 bits), then color values | color format (4 bits), then color values |
//!
//! Color values take `min(8, available / count)` bits each, where `available` is what remains
//! after the header and the weights.

mod encoder;

pub use encoder::ReferenceEncoder;

use crate::codec::*;
use crate::physical_block::PhysicalBlock;
use crate::vecmath::Vint4;

/// Smallest supported block edge.
pub const MIN_BLOCK_DIM: u8 = 2;

/// Largest supported block edge.
pub const MAX_BLOCK_DIM: u8 = 8;

/// Number of two-partition patterns.
pub const PARTITION_PATTERNS: u16 = 16;

/// Luminance, two values per endpoint pair.
pub const FMT_LUMINANCE: u8 = 0;
/// Luminance and alpha.
pub const FMT_LUMINANCE_ALPHA: u8 = 4;
/// RGB.
pub const FMT_RGB: u8 = 8;
/// RGBA.
pub const FMT_RGBA: u8 = 12;

/// Block mode ids, their weight grid edge, weight quantization and plane count.
const MODES: [(u16, u8, QuantMethod, bool); 4] = [
    (0x011, 4, QuantMethod::Quant4, false),
    (0x012, 4, QuantMethod::Quant8, false),
    (0x013, 2, QuantMethod::Quant16, false),
    (0x014, 3, QuantMethod::Quant4, true),
];

/// Line coefficients `(a, b, c)` of the two-partition patterns; a texel at doubled centered
/// coordinates `(u, v)` is in partition 1 when `a * u + b * v + c >= 0`.
const PATTERN_LINES: [(i32, i32, i32); PARTITION_PATTERNS as usize] = [
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (1, -1, 0),
    (2, 1, 0),
    (1, 2, 0),
    (2, -1, 0),
    (1, -2, 0),
    (1, 0, 4),
    (0, 1, 4),
    (1, 1, 4),
    (1, -1, 4),
    (1, 0, -4),
    (0, 1, -4),
    (1, 1, -4),
    (1, -1, -4),
];

const VOID_EXTENT_HEADER: [u8; 8] = [0xFC, 0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
const HDR_VOID_EXTENT_BIT: u32 = 9;
const ERROR_COLOR: [i32; 4] = [0xFFFF, 0, 0xFFFF, 0xFFFF];

/// Number of color values of an endpoint format.
#[inline(always)]
pub const fn color_value_count(color_format: u8) -> usize {
    (color_format as usize >> 2) * 2 + 2
}

/// Bit layout of the color section of a regular block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ColorLayout {
    /// First bit of the color values.
    pub values_start: u32,
    /// Bits per color value.
    pub value_bits: u32,
}

impl ColorLayout {
    /// Computes the layout, or `None` if the values would not fit.
    pub(crate) fn new(
        partition_count: u8,
        color_format: u8,
        weight_bits: u32,
        is_dual_plane: bool,
    ) -> Option<Self> {
        let values_start = match (partition_count, is_dual_plane) {
            (1, false) => 17,
            (1, true) => 19,
            (2, false) => 21,
            _ => return None,
        };
        let count = (color_value_count(color_format) * partition_count as usize) as u32;
        let available = 128u32.checked_sub(weight_bits + values_start)?;
        let value_bits = (available / count).min(8);
        (value_bits >= 1).then_some(Self {
            values_start,
            value_bits,
        })
    }
}

#[inline(always)]
fn read_bits(value: u128, start: u32, count: u32) -> u32 {
    ((value >> start) & ((1u128 << count) - 1)) as u32
}

#[inline(always)]
fn write_bits(value: &mut u128, start: u32, count: u32, bits: u32) {
    let mask = ((1u128 << count) - 1) << start;
    *value = (*value & !mask) | (((bits as u128) << start) & mask);
}

/// Expands a `bits`-bit color value to 8 bits by bit replication.
pub fn unquantize_color(index: u32, bits: u32) -> u8 {
    let mut value = 0u32;
    let mut filled = 0;
    while filled < 8 {
        let shift = 8 - filled as i32 - bits as i32;
        value |= if shift >= 0 {
            index << shift
        } else {
            index >> -shift
        };
        filled += bits;
    }
    (value & 0xFF) as u8
}

/// Finds the `bits`-bit value whose expansion is closest to `value`.
pub fn quantize_color(value: u8, bits: u32) -> u32 {
    let max = (1u32 << bits) - 1;
    let guess = (value as u32 >> (8 - bits)).min(max);
    let distance = |index: u32| (unquantize_color(index, bits) as i32 - value as i32).abs();

    [guess.saturating_sub(1), guess, (guess + 1).min(max)]
        .into_iter()
        .min_by_key(|&index| distance(index))
        .unwrap_or(guess)
}

/// The reference codec for one block footprint.
#[derive(Debug, Clone)]
pub struct ReferenceCodec {
    bsd: BlockSizeDescriptor,
}

impl ReferenceCodec {
    /// Creates a codec for `xdim` x `ydim` blocks.
    ///
    /// # Panics
    ///
    /// If a dimension is outside `MIN_BLOCK_DIM..=MAX_BLOCK_DIM`.
    pub fn new(xdim: u8, ydim: u8) -> Self {
        assert!((MIN_BLOCK_DIM..=MAX_BLOCK_DIM).contains(&xdim));
        assert!((MIN_BLOCK_DIM..=MAX_BLOCK_DIM).contains(&ydim));

        let mut block_modes = Vec::with_capacity(MODES.len());
        let mut decimation_infos = Vec::with_capacity(MODES.len());
        for (decimation_mode, &(mode_index, grid, quant_mode, is_dual_plane)) in
            MODES.iter().enumerate()
        {
            let (weight_x, weight_y) = (grid.min(xdim), grid.min(ydim));
            let di = DecimationInfo::bilinear(xdim, ydim, weight_x, weight_y);
            let planes = if is_dual_plane { 2 } else { 1 };
            let bits_per_weight = quant_mode.bits().unwrap_or(8) as usize;

            block_modes.push(BlockMode {
                mode_index,
                decimation_mode: decimation_mode as u8,
                quant_mode,
                is_dual_plane,
                weight_bits: (di.weight_count * bits_per_weight * planes) as u8,
            });
            decimation_infos.push(di);
        }

        let texel_count = xdim as usize * ydim as usize;
        let single = vec![PartitionInfo::from_assignment(1, 0, vec![0; texel_count])];
        let two_partitions = (0..PARTITION_PATTERNS)
            .map(|index| {
                let (a, b, c) = PATTERN_LINES[index as usize];
                let assignment = (0..ydim as i32)
                    .flat_map(|y| (0..xdim as i32).map(move |x| (x, y)))
                    .map(|(x, y)| {
                        let u = 2 * x + 1 - xdim as i32;
                        let v = 2 * y + 1 - ydim as i32;
                        u8::from(a * u + b * v + c >= 0)
                    })
                    .collect();
                PartitionInfo::from_assignment(2, index, assignment)
            })
            .collect();

        Self {
            bsd: BlockSizeDescriptor::new(
                xdim,
                ydim,
                1,
                block_modes,
                decimation_infos,
                vec![single, two_partitions],
            ),
        }
    }

    fn encode_constant(color: [i32; 4], is_hdr: bool) -> PhysicalBlock {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&VOID_EXTENT_HEADER);
        for (lane, value) in color.iter().enumerate() {
            let value = (*value).clamp(0, 0xFFFF) as u16;
            bytes[8 + lane * 2..10 + lane * 2].copy_from_slice(&value.to_le_bytes());
        }

        let mut block = PhysicalBlock::from_bytes(bytes).to_u128();
        if is_hdr {
            block |= 1 << HDR_VOID_EXTENT_BIT;
        }
        PhysicalBlock::from_u128(block)
    }

    fn decode_constant(block: PhysicalBlock) -> SymbolicBlock {
        let bytes = block.to_bytes();
        let is_hdr = (block.to_u128() >> HDR_VOID_EXTENT_BIT) & 1 != 0;
        SymbolicBlock {
            block_type: if is_hdr {
                SymbolicBlockType::ConstF16
            } else {
                SymbolicBlockType::ConstU16
            },
            constant_color: core::array::from_fn(|lane| {
                u16::from_le_bytes([bytes[8 + lane * 2], bytes[9 + lane * 2]]) as i32
            }),
            ..SymbolicBlock::default()
        }
    }

    /// Bit position of weight stream bit `index`.
    #[inline(always)]
    fn weight_bit_position(index: u32) -> u32 {
        127 - index
    }

    fn weight_stream_slots(di: &DecimationInfo, is_dual_plane: bool) -> impl Iterator<Item = usize> {
        let weight_count = di.weight_count;
        (0..weight_count).flat_map(move |i| {
            let second = is_dual_plane.then_some(WEIGHTS_PLANE2_OFFSET + i);
            core::iter::once(i).chain(second)
        })
    }
}

impl BlockCodec for ReferenceCodec {
    fn block_size_descriptor(&self) -> &BlockSizeDescriptor {
        &self.bsd
    }

    fn physical_to_symbolic(&self, block: PhysicalBlock) -> SymbolicBlock {
        let error = SymbolicBlock::default();
        let bits = block.to_u128();

        if block.block_mode() & 0x1FF == 0x1FC {
            return Self::decode_constant(block);
        }

        let Some(bm) = self.bsd.get_block_mode(block.block_mode()) else {
            return error;
        };

        let partition_count = block.partition_bits() + 1;
        if partition_count > 2 || (partition_count > 1 && bm.is_dual_plane) {
            return error;
        }

        let mut scb = SymbolicBlock {
            block_type: SymbolicBlockType::NonConst,
            block_mode: bm.mode_index,
            partition_count,
            ..SymbolicBlock::default()
        };

        let color_format = if partition_count == 1 {
            if bm.is_dual_plane {
                scb.plane2_component = Some(read_bits(bits, 17, 2) as u8);
            }
            read_bits(bits, 13, 4) as u8
        } else {
            scb.partition_index = read_bits(bits, 13, 4) as u16;
            scb.color_formats_matched = true;
            read_bits(bits, 17, 4) as u8
        };

        if color_format & 3 != 0 {
            return error;
        }

        let Some(layout) = ColorLayout::new(
            partition_count,
            color_format,
            bm.weight_bits as u32,
            bm.is_dual_plane,
        ) else {
            return error;
        };
        let Some(quant_mode) = QuantMethod::from_bits(layout.value_bits) else {
            return error;
        };
        scb.quant_mode = quant_mode;

        let mut position = layout.values_start;
        for partition in 0..partition_count as usize {
            scb.color_formats[partition] = color_format;
            for value in scb.color_values[partition][..color_value_count(color_format)].iter_mut() {
                let index = read_bits(bits, position, layout.value_bits);
                *value = unquantize_color(index, layout.value_bits);
                position += layout.value_bits;
            }
        }

        let di = self.bsd.get_decimation_info(bm.decimation_mode);
        let quant = bm.weight_quant_mode();
        let weight_bits = quant.bits().unwrap_or(8);
        for (stream_index, slot) in Self::weight_stream_slots(di, bm.is_dual_plane).enumerate() {
            let mut index = 0u32;
            for bit in 0..weight_bits {
                let position = Self::weight_bit_position(stream_index as u32 * weight_bits + bit);
                index |= read_bits(bits, position, 1) << bit;
            }
            scb.weights[slot] = quant.unquantize_weight(index);
        }

        scb
    }

    fn symbolic_to_physical(&self, scb: &SymbolicBlock) -> PhysicalBlock {
        let error = Self::encode_constant(ERROR_COLOR, false);

        match scb.block_type {
            SymbolicBlockType::ConstU16 => return Self::encode_constant(scb.constant_color, false),
            SymbolicBlockType::ConstF16 => return Self::encode_constant(scb.constant_color, true),
            SymbolicBlockType::Error => return error,
            SymbolicBlockType::NonConst => {}
        }

        let Some(bm) = self.bsd.get_block_mode(scb.block_mode) else {
            return error;
        };
        let color_format = scb.color_formats[0];
        let Some(layout) = ColorLayout::new(
            scb.partition_count,
            color_format,
            bm.weight_bits as u32,
            bm.is_dual_plane,
        ) else {
            return error;
        };

        let mut bits = 0u128;
        write_bits(&mut bits, 0, 11, bm.mode_index as u32);
        write_bits(&mut bits, 11, 2, scb.partition_count as u32 - 1);
        if scb.partition_count == 1 {
            write_bits(&mut bits, 13, 4, color_format as u32);
            if bm.is_dual_plane {
                write_bits(&mut bits, 17, 2, scb.plane2_component.unwrap_or(0) as u32);
            }
        } else {
            write_bits(&mut bits, 13, 4, scb.partition_index as u32);
            write_bits(&mut bits, 17, 4, color_format as u32);
        }

        let mut position = layout.values_start;
        for partition in 0..scb.partition_count as usize {
            for &value in &scb.color_values[partition][..color_value_count(color_format)] {
                let index = quantize_color(value, layout.value_bits);
                write_bits(&mut bits, position, layout.value_bits, index);
                position += layout.value_bits;
            }
        }

        let di = self.bsd.get_decimation_info(bm.decimation_mode);
        let quant = bm.weight_quant_mode();
        let weight_bits = quant.bits().unwrap_or(8);
        let levels = quant.levels();
        for (stream_index, slot) in Self::weight_stream_slots(di, bm.is_dual_plane).enumerate() {
            // Nearest level to the stored 0..=64 value.
            let target = scb.weights[slot] as i32;
            let index = (0..levels)
                .min_by_key(|&i| (quant.unquantize_weight(i) as i32 - target).abs())
                .unwrap_or(0);
            for bit in 0..weight_bits {
                let position = Self::weight_bit_position(stream_index as u32 * weight_bits + bit);
                write_bits(&mut bits, position, 1, (index >> bit) & 1);
            }
        }

        PhysicalBlock::from_u128(bits)
    }

    fn unpack_color_endpoints(
        &self,
        profile: Profile,
        color_format: u8,
        color_values: &[u8; 8],
    ) -> UnpackedEndpoints {
        let v = color_values.map(|value| value as i32);
        let (ep0, ep1) = match color_format >> 2 {
            0 => (
                Vint4::new(v[0], v[0], v[0], 255),
                Vint4::new(v[1], v[1], v[1], 255),
            ),
            1 => (
                Vint4::new(v[0], v[0], v[0], v[2]),
                Vint4::new(v[1], v[1], v[1], v[3]),
            ),
            2 => (
                Vint4::new(v[0], v[2], v[4], 255),
                Vint4::new(v[1], v[3], v[5], 255),
            ),
            _ => (
                Vint4::new(v[0], v[2], v[4], v[6]),
                Vint4::new(v[1], v[3], v[5], v[7]),
            ),
        };

        let expand = |endpoint: Vint4| match profile {
            Profile::Ldr => endpoint * Vint4::splat(257),
            Profile::LdrSrgb => Vint4(endpoint.0.map(|c| (c << 8) | 0x80)),
        };

        UnpackedEndpoints {
            ep0: expand(ep0),
            ep1: expand(ep1),
            rgb_hdr: false,
            alpha_hdr: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    fn simple_block(mode: u16, weights: &[u8]) -> SymbolicBlock {
        let mut scb = SymbolicBlock {
            block_type: SymbolicBlockType::NonConst,
            block_mode: mode,
            partition_count: 1,
            quant_mode: QuantMethod::Quant256,
            ..SymbolicBlock::default()
        };
        scb.color_formats[0] = FMT_RGBA;
        scb.color_values[0] = [10, 200, 20, 180, 30, 160, 255, 255];
        scb.weights[..weights.len()].copy_from_slice(weights);
        scb
    }

    #[rstest]
    #[case::four_by_four(4, 4, [32, 48, 16, 36])]
    #[case::eight_by_eight(8, 8, [32, 48, 16, 36])]
    #[case::two_by_two(2, 2, [8, 12, 16, 16])]
    fn weight_bits_follow_grid(#[case] xdim: u8, #[case] ydim: u8, #[case] expected: [u32; 4]) {
        let codec = ReferenceCodec::new(xdim, ydim);
        let bsd = codec.block_size_descriptor();
        for ((mode, ..), bits) in MODES.iter().zip(expected) {
            assert_eq!(bsd.weight_bits_for_mode(*mode), bits);
        }
        assert_eq!(bsd.weight_bits_for_mode(0x5FC), 0);
        assert_eq!(bsd.partition_pattern_count(2), PARTITION_PATTERNS as usize);
    }

    #[rstest]
    #[case::one_bit(1)]
    #[case::three_bits(3)]
    #[case::five_bits(5)]
    #[case::eight_bits(8)]
    fn color_quantization_inverts_replication(#[case] bits: u32) {
        for index in 0..(1u32 << bits) {
            assert_eq!(quantize_color(unquantize_color(index, bits), bits), index);
        }
    }

    #[test]
    fn symbolic_round_trip_keeps_representable_values() {
        let codec = ReferenceCodec::new(6, 6);
        let weights: Vec<u8> = (0..16).map(|i| [0, 21, 43, 64][i % 4]).collect();
        let scb = simple_block(0x011, &weights);

        let physical = codec.symbolic_to_physical(&scb);
        let decoded = codec.physical_to_symbolic(physical);

        assert_eq!(decoded.block_type, SymbolicBlockType::NonConst);
        assert_eq!(decoded.block_mode, 0x011);
        assert_eq!(decoded.plane2_component, None);
        assert_eq!(&decoded.weights[..16], &weights[..]);
        // Values are re-quantized to the bits left for colors, then round trip exactly.
        assert_eq!(codec.symbolic_to_physical(&decoded), physical);
        assert_eq!(physical.partition_bits(), 0);
    }

    #[test]
    fn weights_occupy_top_bits() {
        let codec = ReferenceCodec::new(4, 4);
        let zero = simple_block(0x011, &[0; 16]);
        let full = simple_block(0x011, &[64; 16]);

        let a = codec.symbolic_to_physical(&zero);
        let b = codec.symbolic_to_physical(&full);
        let mask = PhysicalBlock::top_bits_mask(32);

        assert_eq!(a & !mask, b & !mask);
        assert_eq!(b & mask, mask);
    }

    #[test]
    fn void_extent_round_trip() {
        let codec = ReferenceCodec::new(8, 8);
        let scb = SymbolicBlock {
            block_type: SymbolicBlockType::ConstU16,
            constant_color: [257, 514, 771, 65535],
            ..SymbolicBlock::default()
        };
        let physical = codec.symbolic_to_physical(&scb);
        assert_eq!(&physical.to_bytes()[..8], &VOID_EXTENT_HEADER);
        assert_eq!(codec.block_size_descriptor().weight_bits(physical), 0);

        let decoded = codec.physical_to_symbolic(physical);
        assert_eq!(decoded.block_type, SymbolicBlockType::ConstU16);
        assert_eq!(decoded.constant_color, scb.constant_color);
    }

    #[rstest]
    #[case::invalid_mode(0x0000_0000_0000_0000_0000_0000_0000_0005)]
    #[case::three_partitions(0x0000_0000_0000_0000_0000_0000_0000_1011)]
    #[case::bad_format(0x0000_0000_0000_0000_0000_0000_0000_2011)]
    fn malformed_blocks_decode_to_error(#[case] bits: u128) {
        let codec = ReferenceCodec::new(4, 4);
        let decoded = codec.physical_to_symbolic(PhysicalBlock::from_u128(bits));
        assert_eq!(decoded.block_type, SymbolicBlockType::Error);
    }

    #[test]
    fn dual_plane_keeps_component() {
        let codec = ReferenceCodec::new(4, 4);
        let mut scb = simple_block(0x014, &[21; 9]);
        scb.plane2_component = Some(3);
        scb.weights[WEIGHTS_PLANE2_OFFSET..WEIGHTS_PLANE2_OFFSET + 9].fill(64);

        let decoded = codec.physical_to_symbolic(codec.symbolic_to_physical(&scb));
        assert_eq!(decoded.plane2_component, Some(3));
        assert_eq!(decoded.weights[0], 21);
        assert_eq!(decoded.weights[WEIGHTS_PLANE2_OFFSET + 8], 64);
    }

    #[rstest]
    #[case::ldr(Profile::Ldr, 255 * 257)]
    #[case::srgb(Profile::LdrSrgb, (255 << 8) | 0x80)]
    fn endpoints_expand_per_profile(#[case] profile: Profile, #[case] expected: i32) {
        let codec = ReferenceCodec::new(4, 4);
        let unpacked = codec.unpack_color_endpoints(profile, FMT_RGB, &[0, 255, 0, 255, 0, 255, 0, 0]);
        assert_eq!(unpacked.ep1.0[..3], [expected; 3]);
    }
}
