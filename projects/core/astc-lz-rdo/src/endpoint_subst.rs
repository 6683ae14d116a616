//! Endpoint reuse for simple (single plane, single partition) blocks.
//!
//! Endpoints from recent simple blocks are tried on the current block with freshly fitted
//! weights. Only endpoint pairs whose color axis roughly agrees with the block's own
//! restricted encoding are worth the fitting.

use crate::mtf::MtfList;
use astc_lz_rdo_common::codec::{
    BlockCodec, BlockSizeDescriptor, EndpointsAndWeights, Profile, QuantMethod, SymbolicBlock,
    SymbolicBlockType, BLOCK_MAX_WEIGHTS,
};
use astc_lz_rdo_common::image::ImageBlock;
use astc_lz_rdo_common::vecmath::{clamp1f, normalize_safe, Vfloat4};
use astc_lz_rdo_common::PhysicalBlock;

/// Whether `block` has one partition and one weight plane.
///
/// Void-extent blocks fail the partition check, invalid modes fail the mode lookup.
#[inline]
pub fn is_simple_block(block: PhysicalBlock, bsd: &BlockSizeDescriptor) -> bool {
    block.partition_bits() == 0
        && bsd
            .get_block_mode(block.block_mode())
            .is_some_and(|bm| !bm.is_dual_plane)
}

/// The mode and endpoints of a simple block, with unused color values zeroed so equal
/// endpoints compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSimpleEndpoints {
    /// Block mode id.
    pub block_mode: u16,
    /// Quantization of the color values.
    pub quant_mode: QuantMethod,
    /// Color endpoint format.
    pub color_format: u8,
    /// Quantized color values.
    pub color_values: [u8; 8],
}

impl CompactSimpleEndpoints {
    /// Extracts the endpoints of a single plane, single partition, non-constant block.
    pub fn from_symbolic(scb: &SymbolicBlock) -> Option<Self> {
        if scb.block_type != SymbolicBlockType::NonConst
            || scb.partition_count != 1
            || scb.plane2_component.is_some()
        {
            return None;
        }

        let color_format = scb.color_formats[0];
        let value_count = (color_format as usize >> 2) * 2 + 2;
        let values = &scb.color_values[0];

        Some(Self {
            block_mode: scb.block_mode,
            quant_mode: scb.quant_mode,
            color_format,
            color_values: core::array::from_fn(|i| if i < value_count { values[i] } else { 0 }),
        })
    }

    /// Writes the mode and endpoints into `scb`, leaving its weights untouched.
    pub fn to_symbolic(&self, scb: &mut SymbolicBlock) {
        scb.block_type = SymbolicBlockType::NonConst;
        scb.partition_count = 1;
        scb.partition_index = 0;
        scb.color_formats_matched = false;
        scb.plane2_component = None;
        scb.block_mode = self.block_mode;
        scb.color_formats[0] = self.color_format;
        scb.quant_mode = self.quant_mode;
        scb.color_values[0] = self.color_values;
    }

    /// Unit direction between the two decoded endpoints, zero for a degenerate pair.
    pub fn normalized_axis<C: BlockCodec + ?Sized>(&self, codec: &C, profile: Profile) -> Vfloat4 {
        let endpoints = codec.unpack_color_endpoints(profile, self.color_format, &self.color_values);
        normalize_safe(
            endpoints.ep0.to_float() - endpoints.ep1.to_float(),
            Vfloat4::ZERO,
        )
    }
}

/// An endpoint pair in the substitution list, with its axis computed once on insertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleEndpointEntry {
    /// The endpoints.
    pub endpoints: CompactSimpleEndpoints,
    /// Their normalized color axis.
    pub normalized_axis: Vfloat4,
}

/// Move-to-front list of recently emitted simple endpoints.
#[derive(Debug, Clone)]
pub struct EndpointSubstMtf {
    list: MtfList<SimpleEndpointEntry>,
}

impl EndpointSubstMtf {
    /// Creates an empty list of at most `capacity` endpoint pairs.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: MtfList::new(capacity),
        }
    }

    /// Removes every entry.
    pub fn reset(&mut self) {
        self.list.reset();
    }

    /// Entries, most recent first.
    pub fn entries(&self) -> &[SimpleEndpointEntry] {
        self.list.entries()
    }

    /// Position of `endpoints` in the list.
    pub fn search(&self, endpoints: &CompactSimpleEndpoints) -> Option<usize> {
        self.list.search_by(|entry| entry.endpoints == *endpoints)
    }

    /// Moves `endpoints` to the front, inserting it with the axis from `axis` if new.
    pub fn encode(
        &mut self,
        endpoints: CompactSimpleEndpoints,
        axis: impl FnOnce(&CompactSimpleEndpoints) -> Vfloat4,
    ) {
        let pos = self.search(&endpoints);
        let entry = match pos {
            Some(pos) => self.list.entries()[pos],
            None => SimpleEndpointEntry {
                normalized_axis: axis(&endpoints),
                endpoints,
            },
        };
        self.list.update(entry, pos);
    }
}

/// Projects every texel of `blk` onto the endpoint segment of a simple block.
///
/// Weights are clamped to `[0, 1]`; every texel gets the squared segment length as its
/// error scale.
pub fn compute_known_endpoint_weights<C: BlockCodec + ?Sized>(
    codec: &C,
    profile: Profile,
    blk: &ImageBlock,
    scb: &SymbolicBlock,
    ei: &mut EndpointsAndWeights,
) {
    let endpoints = codec.unpack_color_endpoints(profile, scb.color_formats[0], &scb.color_values[0]);

    let base = endpoints.ep0.to_float();
    ei.partition_count = 1;
    ei.endpt0[0] = base;
    ei.endpt1[0] = endpoints.ep1.to_float();

    let mut dir = ei.endpt1[0] - base;
    let length_squared = dir.dot(dir);
    if length_squared > 1e-7 {
        dir = dir * (1.0 / length_squared);
    }

    for texel in 0..blk.texel_count {
        ei.weights[texel] = clamp1f((blk.texel(texel) - base).dot(dir));
        ei.weight_error_scale[texel] = length_squared;
    }
    ei.is_constant_weight_error_scale = true;
}

/// Builds the block that uses `endpoints` with weights fitted to `blk`.
///
/// Returns `None` when the endpoint mode is not valid for this block size.
pub fn fit_known_endpoints<C: BlockCodec + ?Sized>(
    codec: &C,
    profile: Profile,
    blk: &ImageBlock,
    endpoints: &CompactSimpleEndpoints,
    ei: &mut EndpointsAndWeights,
) -> Option<SymbolicBlock> {
    let bsd = codec.block_size_descriptor();
    let bm = bsd.get_block_mode(endpoints.block_mode)?;

    let mut scb = SymbolicBlock::default();
    endpoints.to_symbolic(&mut scb);
    compute_known_endpoint_weights(codec, profile, blk, &scb, ei);

    let di = bsd.get_decimation_info(bm.decimation_mode);
    let mut ideal = [0f32; BLOCK_MAX_WEIGHTS];
    let mut quantized = [0f32; BLOCK_MAX_WEIGHTS];
    let mut uquant = [0u8; BLOCK_MAX_WEIGHTS];
    codec.compute_ideal_weights_for_decimation(ei, di, &mut ideal);
    codec.compute_quantized_weights_for_decimation(
        di,
        0.0,
        1.0,
        &ideal,
        &mut quantized,
        &mut uquant,
        bm.weight_quant_mode(),
    );
    scb.weights[..di.weight_count].copy_from_slice(&uquant[..di.weight_count]);

    Some(scb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    fn rgba_endpoints(lo: u8, hi: u8) -> CompactSimpleEndpoints {
        CompactSimpleEndpoints {
            block_mode: 0x011,
            quant_mode: QuantMethod::Quant256,
            color_format: FMT_RGBA,
            color_values: [lo, hi, lo, hi, lo, hi, 255, 255],
        }
    }

    fn gradient_block(texel_count: usize) -> ImageBlock {
        let mut blk = ImageBlock::new(texel_count, Vfloat4::splat(1.0));
        for i in 0..texel_count {
            let v = (i * 65535 / (texel_count - 1)) as f32;
            blk.data[i * 4..i * 4 + 4].copy_from_slice(&[v, v, v, 65535.0]);
        }
        blk
    }

    #[test]
    fn simple_block_classification() {
        let codec = ReferenceCodec::new(4, 4);
        let bsd = codec.block_size_descriptor();
        let blk = gradient_block(16);

        let single = ReferenceEncoder::restricted(&codec, DecodeConfig::default()).encode_block(&blk);
        assert!(is_simple_block(single, bsd));

        let mut flat = ImageBlock::new(16, Vfloat4::splat(1.0));
        flat.data[..64].fill(4096.0);
        let constant = ReferenceEncoder::new(&codec, DecodeConfig::default()).encode_block(&flat);
        assert!(!is_simple_block(constant, bsd));

        let mut scb = SymbolicBlock::default();
        rgba_endpoints(0, 255).to_symbolic(&mut scb);
        scb.block_mode = 0x014;
        scb.plane2_component = Some(3);
        assert!(!is_simple_block(codec.symbolic_to_physical(&scb), bsd));

        // Unused mode id.
        assert!(!is_simple_block(PhysicalBlock::from_u128(0x7FF), bsd));
    }

    #[test]
    fn compact_endpoints_zero_unused_values() {
        let scb = SymbolicBlock {
            block_type: SymbolicBlockType::NonConst,
            block_mode: 0x011,
            partition_count: 1,
            quant_mode: QuantMethod::Quant32,
            color_formats: [FMT_LUMINANCE_ALPHA, 0, 0, 0],
            color_values: [[1, 2, 3, 4, 5, 6, 7, 8], [0; 8], [0; 8], [0; 8]],
            ..SymbolicBlock::default()
        };

        let compact = CompactSimpleEndpoints::from_symbolic(&scb).unwrap();
        assert_eq!(compact.color_values, [1, 2, 3, 4, 0, 0, 0, 0]);

        let mut round_trip = SymbolicBlock::default();
        compact.to_symbolic(&mut round_trip);
        assert_eq!(CompactSimpleEndpoints::from_symbolic(&round_trip), Some(compact));
    }

    #[rstest]
    #[case::constant(SymbolicBlock { block_type: SymbolicBlockType::ConstU16, ..SymbolicBlock::default() })]
    #[case::two_partitions(SymbolicBlock {
        block_type: SymbolicBlockType::NonConst,
        partition_count: 2,
        ..SymbolicBlock::default()
    })]
    #[case::dual_plane(SymbolicBlock {
        block_type: SymbolicBlockType::NonConst,
        partition_count: 1,
        plane2_component: Some(0),
        ..SymbolicBlock::default()
    })]
    fn compact_endpoints_reject_non_simple(#[case] scb: SymbolicBlock) {
        assert_eq!(CompactSimpleEndpoints::from_symbolic(&scb), None);
    }

    #[test]
    fn axis_is_unit_or_zero() {
        let codec = ReferenceCodec::new(4, 4);
        let axis = rgba_endpoints(0, 255).normalized_axis(&codec, Profile::Ldr);
        assert!((axis.dot(axis) - 1.0).abs() < 1e-5);
        assert!(axis[3].abs() < 1e-6);

        let degenerate = rgba_endpoints(9, 9).normalized_axis(&codec, Profile::Ldr);
        assert_eq!(degenerate, Vfloat4::ZERO);
    }

    #[test]
    fn subst_mtf_caches_axis_on_insert() {
        let mut mtf = EndpointSubstMtf::new(2);
        let a = rgba_endpoints(0, 255);
        let b = rgba_endpoints(10, 20);

        mtf.encode(a, |_| Vfloat4::splat(1.0));
        mtf.encode(b, |_| Vfloat4::splat(2.0));
        mtf.encode(a, |_| panic!("axis recomputed for a known entry"));

        assert_eq!(mtf.search(&a), Some(0));
        assert_eq!(mtf.search(&b), Some(1));
        assert_eq!(mtf.entries()[0].normalized_axis, Vfloat4::splat(1.0));

        mtf.encode(rgba_endpoints(1, 2), |_| Vfloat4::ZERO);
        assert_eq!(mtf.search(&b), None);
        mtf.reset();
        assert!(mtf.entries().is_empty());
    }

    #[test]
    fn known_endpoint_weights_project_texels() {
        let codec = ReferenceCodec::new(4, 4);
        let blk = gradient_block(16);
        let mut scb = SymbolicBlock::default();
        rgba_endpoints(0, 255).to_symbolic(&mut scb);

        let mut ei = EndpointsAndWeights::default();
        compute_known_endpoint_weights(&codec, Profile::Ldr, &blk, &scb, &mut ei);

        for texel in 0..16 {
            let expected = texel as f32 / 15.0;
            assert!((ei.weights[texel] - expected).abs() < 1e-3, "{texel}");
        }
        assert!(ei.is_constant_weight_error_scale);
        assert_eq!(ei.weight_error_scale[0], ei.weight_error_scale[15]);
    }

    #[test]
    fn fitted_block_reproduces_gradient() {
        let codec = ReferenceCodec::new(4, 4);
        let config = DecodeConfig::default();
        let blk = gradient_block(16);
        let mut ei = EndpointsAndWeights::default();

        let scb = fit_known_endpoints(&codec, Profile::Ldr, &blk, &rgba_endpoints(0, 255), &mut ei)
            .unwrap();
        let error = codec.compute_symbolic_block_difference_1plane_1partition_weighted(
            &config,
            &scb,
            &blk,
            &[1.0; 16],
        );

        // Bounded by 4-level weight quantization of the ramp on three channels.
        assert!(error / 16.0 < 3.0 * (8000.0f32 * 8000.0));
        assert_eq!(
            CompactSimpleEndpoints::from_symbolic(&codec.physical_to_symbolic(codec.symbolic_to_physical(&scb))),
            Some(rgba_endpoints(0, 255))
        );
    }
}
