//! Baseline encoder for the reference codec.
//!
//! Fits bounding-box endpoints per partition, projects texels onto the endpoint axis for
//! ideal weights, and keeps whichever mode, partitioning and plane layout decodes with the
//! lowest error. Flat blocks become void-extent constant blocks.

use super::{
    color_value_count, quantize_color, unquantize_color, ColorLayout, ReferenceCodec,
    FMT_LUMINANCE, FMT_LUMINANCE_ALPHA, FMT_RGB, FMT_RGBA,
};
use crate::codec::*;
use crate::decode::{decompress_symbolic_block_raw, weighted_ssd};
use crate::image::{load_image_block, Image, ImageBlock, Swizzle};
use crate::physical_block::{PhysicalBlock, BLOCK_BYTES};
use crate::vecmath::{clamp1f, Vfloat4};

const PLANE2_ALPHA: &[Option<u8>] = &[Some(3)];
const PLANE2_RGB: &[Option<u8>] = &[Some(0), Some(1), Some(2)];
const SINGLE_PLANE: &[Option<u8>] = &[None];

/// Encodes image blocks with the [`ReferenceCodec`].
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEncoder<'a> {
    codec: &'a ReferenceCodec,
    config: DecodeConfig,
    restricted: bool,
}

impl<'a> ReferenceEncoder<'a> {
    /// An encoder that searches every mode, partitioning and plane layout.
    pub fn new(codec: &'a ReferenceCodec, config: DecodeConfig) -> Self {
        Self {
            codec,
            config,
            restricted: false,
        }
    }

    /// An encoder limited to single partition, single plane blocks.
    pub fn restricted(codec: &'a ReferenceCodec, config: DecodeConfig) -> Self {
        Self {
            codec,
            config,
            restricted: true,
        }
    }

    /// Encodes every block of `image` in raster order.
    pub fn encode_image(&self, image: &Image, swizzle: &Swizzle) -> Vec<u8> {
        let bsd = self.codec.block_size_descriptor();
        let [blocks_x, blocks_y, blocks_z] = image.block_counts(bsd);
        let mut out = Vec::with_capacity(blocks_x * blocks_y * blocks_z * BLOCK_BYTES);
        let mut blk = ImageBlock::new(bsd.texel_count, Vfloat4::splat(1.0));

        for z in 0..blocks_z {
            for y in 0..blocks_y {
                for x in 0..blocks_x {
                    let origin = [
                        (x * bsd.xdim as usize) as u32,
                        (y * bsd.ydim as usize) as u32,
                        (z * bsd.zdim as usize) as u32,
                    ];
                    load_image_block(image, &mut blk, bsd, origin, swizzle);
                    out.extend_from_slice(&self.encode_block(&blk).to_bytes());
                }
            }
        }

        out
    }

    /// Encodes a single block.
    pub fn encode_block(&self, blk: &ImageBlock) -> PhysicalBlock {
        let codec = self.codec;
        let bsd = codec.block_size_descriptor();
        let texel_count = bsd.texel_count;

        let first = blk.texel(0);
        if (1..texel_count).all(|i| blk.texel(i) == first) {
            return Self::constant_block(codec, first);
        }

        let format = choose_format(blk);
        let uniform = [1.0f32; BLOCK_MAX_TEXELS];
        let mut decoded = [0f32; BLOCK_MAX_TEXELS * 4];
        let mut best: Option<(f32, PhysicalBlock)> = None;

        for bm in bsd.block_modes() {
            if bm.is_dual_plane && self.restricted {
                continue;
            }

            let plane2_options = match (bm.is_dual_plane, format) {
                (false, _) => SINGLE_PLANE,
                (true, FMT_RGBA | FMT_LUMINANCE_ALPHA) => PLANE2_ALPHA,
                (true, FMT_RGB) => PLANE2_RGB,
                (true, _) => &[],
            };

            let two_partition_patterns = if self.restricted || bm.is_dual_plane {
                0
            } else {
                bsd.partition_pattern_count(2)
            };
            let partitionings = core::iter::once((1u8, 0u16))
                .chain((0..two_partition_patterns as u16).map(|index| (2u8, index)));

            for (partition_count, partition_index) in partitionings {
                let Some(pi) = bsd.get_partition_info(partition_count, partition_index) else {
                    continue;
                };

                for &plane2 in plane2_options {
                    let Some(scb) = self.fit(blk, bm, pi, format, plane2) else {
                        continue;
                    };

                    let physical = codec.symbolic_to_physical(&scb);
                    let stored = codec.physical_to_symbolic(physical);
                    decompress_symbolic_block_raw(codec, &self.config, &stored, &mut decoded);
                    let error = weighted_ssd(
                        blk.rgba(),
                        &decoded[..texel_count * 4],
                        &uniform[..texel_count],
                        blk.channel_weight,
                    );

                    match best {
                        Some((best_error, _)) if best_error <= error => {}
                        _ => best = Some((error, physical)),
                    }
                }
            }
        }

        match best {
            Some((_, physical)) => physical,
            None => Self::constant_block(codec, average_color(blk)),
        }
    }

    fn constant_block(codec: &ReferenceCodec, color: Vfloat4) -> PhysicalBlock {
        let scb = SymbolicBlock {
            block_type: SymbolicBlockType::ConstU16,
            constant_color: color.0.map(|v| v.round() as i32),
            ..SymbolicBlock::default()
        };
        codec.symbolic_to_physical(&scb)
    }

    /// Fits endpoints and weights for one mode, partitioning and plane layout.
    fn fit(
        &self,
        blk: &ImageBlock,
        bm: &BlockMode,
        pi: &PartitionInfo,
        format: u8,
        plane2: Option<u8>,
    ) -> Option<SymbolicBlock> {
        let codec = self.codec;
        let layout = ColorLayout::new(
            pi.partition_count,
            format,
            bm.weight_bits as u32,
            bm.is_dual_plane,
        )?;

        let mut scb = SymbolicBlock {
            block_type: SymbolicBlockType::NonConst,
            block_mode: bm.mode_index,
            partition_count: pi.partition_count,
            partition_index: pi.partition_index,
            plane2_component: plane2,
            color_formats_matched: pi.partition_count > 1,
            quant_mode: QuantMethod::from_bits(layout.value_bits)?,
            ..SymbolicBlock::default()
        };

        let mut plane1_ei = EndpointsAndWeights::default();
        let mut plane2_ei = EndpointsAndWeights::default();
        let plane2_lane = plane2.map(|c| c as usize);

        for partition in 0..pi.partition_count as usize {
            let texels = &pi.texels_of_partition[partition];
            let (low, high) = endpoint_box(blk, texels, plane2_lane);

            let mut values = pack_values(format, low, high);
            for value in values[..color_value_count(format)].iter_mut() {
                *value = unquantize_color(quantize_color(*value, layout.value_bits), layout.value_bits);
            }
            scb.color_formats[partition] = format;
            scb.color_values[partition] = values;

            let endpoints = codec.unpack_color_endpoints(self.config.profile, format, &values);
            let ep0 = endpoints.ep0.to_float();
            let dir = endpoints.ep1.to_float() - ep0;
            let dir1 = without_lane(dir, plane2_lane);
            let length_squared = dir1.dot(dir1);

            for &texel in texels {
                let texel = texel as usize;
                let offset = blk.texel(texel) - ep0;

                plane1_ei.weights[texel] = if length_squared > 1e-7 {
                    clamp1f(without_lane(offset, plane2_lane).dot(dir1) / length_squared)
                } else {
                    0.0
                };
                plane1_ei.weight_error_scale[texel] = 1.0;

                if let Some(lane) = plane2_lane {
                    plane2_ei.weights[texel] = if dir[lane].abs() > 1e-7 {
                        clamp1f(offset[lane] / dir[lane])
                    } else {
                        0.0
                    };
                    plane2_ei.weight_error_scale[texel] = 1.0;
                }
            }
        }

        let di = codec.block_size_descriptor().get_decimation_info(bm.decimation_mode);
        self.quantize_plane(&plane1_ei, di, bm, &mut scb.weights[..WEIGHTS_PLANE2_OFFSET]);
        if plane2.is_some() {
            self.quantize_plane(&plane2_ei, di, bm, &mut scb.weights[WEIGHTS_PLANE2_OFFSET..]);
        }

        Some(scb)
    }

    fn quantize_plane(
        &self,
        ei: &EndpointsAndWeights,
        di: &DecimationInfo,
        bm: &BlockMode,
        out: &mut [u8],
    ) {
        let mut ideal = [0f32; BLOCK_MAX_WEIGHTS];
        let mut quantized = [0f32; BLOCK_MAX_WEIGHTS];
        let mut uquant = [0u8; BLOCK_MAX_WEIGHTS];

        self.codec.compute_ideal_weights_for_decimation(ei, di, &mut ideal);
        self.codec.compute_quantized_weights_for_decimation(
            di,
            0.0,
            1.0,
            &ideal,
            &mut quantized,
            &mut uquant,
            bm.weight_quant_mode(),
        );
        out[..di.weight_count].copy_from_slice(&uquant[..di.weight_count]);
    }
}

fn without_lane(value: Vfloat4, lane: Option<usize>) -> Vfloat4 {
    let mut out = value;
    if let Some(lane) = lane {
        out.0[lane] = 0.0;
    }
    out
}

fn choose_format(blk: &ImageBlock) -> u8 {
    let texels = || (0..blk.texel_count).map(|i| blk.texel(i));
    let has_alpha = texels().any(|t| t[3] != 65535.0);
    let is_grey = texels().all(|t| t[0] == t[1] && t[1] == t[2]);

    match (is_grey, has_alpha) {
        (true, false) => FMT_LUMINANCE,
        (true, true) => FMT_LUMINANCE_ALPHA,
        (false, false) => FMT_RGB,
        (false, true) => FMT_RGBA,
    }
}

fn average_color(blk: &ImageBlock) -> Vfloat4 {
    let sum = (0..blk.texel_count).fold(Vfloat4::ZERO, |acc, i| acc + blk.texel(i));
    sum * (1.0 / blk.texel_count as f32)
}

/// Per-channel bounding box in 8-bit units, with channels that run against the overall
/// brightness trend swapped so both endpoints sit on the main diagonal.
fn endpoint_box(blk: &ImageBlock, texels: &[u8], plane2: Option<usize>) -> ([u8; 4], [u8; 4]) {
    if texels.is_empty() {
        return ([0; 4], [0; 4]);
    }

    let scaled = |texel: u8| blk.texel(texel as usize) * (1.0 / 257.0);
    let brightness = |value: Vfloat4| without_lane(value, plane2).hadd();

    let count = texels.len() as f32;
    let mean = texels.iter().fold(Vfloat4::ZERO, |acc, &t| acc + scaled(t)) * (1.0 / count);
    let mean_brightness = brightness(mean);

    let mut low = [f32::MAX; 4];
    let mut high = [f32::MIN; 4];
    let mut covariance = [0f32; 4];
    for &texel in texels {
        let value = scaled(texel);
        let trend = brightness(value) - mean_brightness;
        for lane in 0..4 {
            low[lane] = low[lane].min(value[lane]);
            high[lane] = high[lane].max(value[lane]);
            covariance[lane] += (value[lane] - mean[lane]) * trend;
        }
    }

    let mut ep0 = [0u8; 4];
    let mut ep1 = [0u8; 4];
    for lane in 0..4 {
        let (a, b) = if covariance[lane] < 0.0 && Some(lane) != plane2 {
            (high[lane], low[lane])
        } else {
            (low[lane], high[lane])
        };
        ep0[lane] = a.round().clamp(0.0, 255.0) as u8;
        ep1[lane] = b.round().clamp(0.0, 255.0) as u8;
    }

    (ep0, ep1)
}

/// Orders endpoint channels the way each format stores them (`c0, c1` per channel).
fn pack_values(format: u8, ep0: [u8; 4], ep1: [u8; 4]) -> [u8; 8] {
    let luminance = |ep: [u8; 4]| ((ep[0] as u32 + ep[1] as u32 + ep[2] as u32 + 1) / 3) as u8;
    match format {
        FMT_LUMINANCE => [luminance(ep0), luminance(ep1), 0, 0, 0, 0, 0, 0],
        FMT_LUMINANCE_ALPHA => [luminance(ep0), luminance(ep1), ep0[3], ep1[3], 0, 0, 0, 0],
        FMT_RGB => [ep0[0], ep1[0], ep0[1], ep1[1], ep0[2], ep1[2], 0, 0],
        _ => [ep0[0], ep1[0], ep0[1], ep1[1], ep0[2], ep1[2], ep0[3], ep1[3]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    fn gradient_block(texel_count: usize) -> ImageBlock {
        let mut blk = ImageBlock::new(texel_count, Vfloat4::splat(1.0));
        for i in 0..texel_count {
            let v = (i * 255 / (texel_count - 1)) as f32 * 257.0;
            blk.data[i * 4..i * 4 + 4].copy_from_slice(&[v, 65535.0 - v, v * 0.5, 65535.0]);
        }
        blk
    }

    fn decoded_error(codec: &ReferenceCodec, blk: &ImageBlock, block: PhysicalBlock) -> f32 {
        let texel_count = blk.texel_count;
        let mut decoded = [0f32; BLOCK_MAX_TEXELS * 4];
        let scb = codec.physical_to_symbolic(block);
        decompress_symbolic_block_raw(codec, &DecodeConfig::default(), &scb, &mut decoded);
        weighted_ssd(
            blk.rgba(),
            &decoded[..texel_count * 4],
            &[1.0; BLOCK_MAX_TEXELS][..texel_count],
            blk.channel_weight,
        )
    }

    #[test]
    fn flat_block_becomes_void_extent() {
        let codec = ReferenceCodec::new(4, 4);
        let encoder = ReferenceEncoder::new(&codec, DecodeConfig::default());
        let mut blk = ImageBlock::new(16, Vfloat4::splat(1.0));
        for texel in blk.data[..64].chunks_exact_mut(4) {
            texel.copy_from_slice(&[257.0, 514.0, 771.0, 65535.0]);
        }

        let block = encoder.encode_block(&blk);
        let scb = codec.physical_to_symbolic(block);
        assert_eq!(scb.block_type, SymbolicBlockType::ConstU16);
        assert_eq!(decoded_error(&codec, &blk, block), 0.0);
    }

    #[rstest]
    #[case::four(4)]
    #[case::six(6)]
    #[case::eight(8)]
    fn gradient_encodes_closely(#[case] dim: u8) {
        let codec = ReferenceCodec::new(dim, dim);
        let blk = gradient_block(dim as usize * dim as usize);

        let block = ReferenceEncoder::new(&codec, DecodeConfig::default()).encode_block(&blk);
        let scb = codec.physical_to_symbolic(block);
        assert_eq!(scb.block_type, SymbolicBlockType::NonConst);

        // Average error below ~10 units (of 65535) per channel.
        let error = decoded_error(&codec, &blk, block);
        let per_texel = error / blk.texel_count as f32;
        assert!(per_texel < 4.0 * 2560.0 * 2560.0, "{per_texel}");
    }

    #[test]
    fn restricted_encoder_emits_simple_blocks() {
        let codec = ReferenceCodec::new(6, 6);
        let blk = gradient_block(36);
        let encoder = ReferenceEncoder::restricted(&codec, DecodeConfig::default());

        let block = encoder.encode_block(&blk);
        let scb = codec.physical_to_symbolic(block);
        let bm = codec
            .block_size_descriptor()
            .get_block_mode(scb.block_mode)
            .unwrap();

        assert_eq!(scb.partition_count, 1);
        assert!(!bm.is_dual_plane);
        assert!(decoded_error(&codec, &blk, block) >= decoded_error(
            &codec,
            &blk,
            ReferenceEncoder::new(&codec, DecodeConfig::default()).encode_block(&blk)
        ));
    }

    #[test]
    fn encode_image_emits_one_block_per_footprint() {
        let data: Vec<u8> = (0..10 * 7).flat_map(|i| [i as u8, 0, 255 - i as u8, 255]).collect();
        let image = Image::new(10, 7, 1, &data).unwrap();
        let codec = ReferenceCodec::new(4, 4);

        let blocks = ReferenceEncoder::new(&codec, DecodeConfig::default())
            .encode_image(&image, &Swizzle::default());
        assert_eq!(blocks.len(), 3 * 2 * BLOCK_BYTES);
    }
}
