//! Raw block decoding and the weighted error metric.
//!
//! Errors are measured the way the encoder sees them: in the 16-bit integer space the decoder
//! produces before its final output conversion, interleaved as RGBA per texel.

use crate::codec::{BlockCodec, DecodeConfig, Profile, SymbolicBlock, SymbolicBlockType};
use crate::codec::BLOCK_MAX_TEXELS;
use crate::vecmath::{Vfloat4, Vint4};
use multiversion::multiversion;

/// Value written for error blocks and HDR constant blocks, far outside `[0, 65535]`.
pub const ERROR_BLOCK_VALUE: f32 = -65536.0;

/// Channels that are rounded as a UNORM8 decoder would.
fn u8_rounding_mask(config: &DecodeConfig) -> [bool; 4] {
    if config.decode_unorm8 {
        [true; 4]
    } else if config.profile == Profile::LdrSrgb {
        [true, true, true, false]
    } else {
        [false; 4]
    }
}

/// Rescales the top 8 bits back into a 16-bit value that rounds like a UNORM8 output.
#[inline(always)]
fn apply_u8_rounding(color: Vint4, mask: [bool; 4]) -> Vint4 {
    color.select(color.asr(8) * Vint4::splat(257), mask)
}

/// Decodes `scb` into interleaved RGBA floats, 4 per texel, in raw decoder space.
///
/// Constant blocks emit their color for every texel. Error and HDR constant blocks emit
/// [`ERROR_BLOCK_VALUE`] so any comparison against real texels is heavily penalized.
pub fn decompress_symbolic_block_raw<C: BlockCodec + ?Sized>(
    codec: &C,
    config: &DecodeConfig,
    scb: &SymbolicBlock,
    out_rgba: &mut [f32],
) {
    let bsd = codec.block_size_descriptor();
    let texel_count = bsd.texel_count;
    let u8_mask = u8_rounding_mask(config);

    let fill = |out_rgba: &mut [f32], color: Vfloat4| {
        for texel in out_rgba[..texel_count * 4].chunks_exact_mut(4) {
            color.store(texel);
        }
    };

    let block_mode = match scb.block_type {
        SymbolicBlockType::NonConst => bsd.get_block_mode(scb.block_mode),
        SymbolicBlockType::ConstU16 => {
            let color = apply_u8_rounding(Vint4(scb.constant_color), u8_mask);
            fill(out_rgba, color.to_float());
            return;
        }
        SymbolicBlockType::Error | SymbolicBlockType::ConstF16 => None,
    };

    let partition_info = bsd.get_partition_info(scb.partition_count, scb.partition_index);
    let (Some(bm), Some(pi)) = (block_mode, partition_info) else {
        fill(out_rgba, Vfloat4::splat(ERROR_BLOCK_VALUE));
        return;
    };

    let di = bsd.get_decimation_info(bm.decimation_mode);
    let mut plane1 = [0i32; BLOCK_MAX_TEXELS];
    let mut plane2 = [0i32; BLOCK_MAX_TEXELS];
    codec.unpack_weights(scb, di, bm.is_dual_plane, &mut plane1, &mut plane2);

    let plane2_mask: [bool; 4] =
        core::array::from_fn(|lane| scb.plane2_component == Some(lane as u8));

    for partition in 0..scb.partition_count as usize {
        let endpoints = codec.unpack_color_endpoints(
            config.profile,
            scb.color_formats[partition],
            &scb.color_values[partition],
        );
        let ep0 = endpoints.ep0;
        let diff = endpoints.ep1 - ep0;

        for &texel in &pi.texels_of_partition[partition] {
            let texel = texel as usize;
            let weight =
                Vint4::splat(plane1[texel]).select(Vint4::splat(plane2[texel]), plane2_mask);

            let color = ep0 + (diff * weight + Vint4::splat(32)).asr(6);
            let color = apply_u8_rounding(color, u8_mask);
            color.to_float().store(&mut out_rgba[texel * 4..]);
        }
    }
}

/// Sum of squared differences between two interleaved RGBA blocks, scaled per texel by
/// `texel_weights` and per channel by `channel_weights`.
#[inline]
pub fn weighted_ssd(
    original: &[f32],
    decoded: &[f32],
    texel_weights: &[f32],
    channel_weights: Vfloat4,
) -> f32 {
    debug_assert!(original.len() == decoded.len());
    debug_assert!(original.len() == texel_weights.len() * 4);

    #[cfg_attr(
        not(feature = "nightly"),
        multiversion(targets(
            // x86-64-v3 without lahfsahf
            "x86_64+avx+avx2+bmi1+bmi2+cmpxchg16b+f16c+fma+fxsr+lzcnt+movbe+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3+xsave",
            // x86-64-v2 without lahfsahf
            "x86_64+cmpxchg16b+fxsr+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3",
        ))
    )]
    #[cfg_attr(
        feature = "nightly",
        multiversion(targets(
            // x86-64-v4 without lahfsahf
            "x86_64+avx+avx2+avx512bw+avx512cd+avx512dq+avx512f+avx512vl+bmi1+bmi2+cmpxchg16b+f16c+fma+fxsr+lzcnt+movbe+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3+xsave",
            // x86-64-v3 without lahfsahf
            "x86_64+avx+avx2+bmi1+bmi2+cmpxchg16b+f16c+fma+fxsr+lzcnt+movbe+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3+xsave",
            // x86-64-v2 without lahfsahf
            "x86_64+cmpxchg16b+fxsr+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3",
        ))
    )]
    fn accumulate(original: &[f32], decoded: &[f32], texel_weights: &[f32]) -> [f32; 4] {
        let mut sum = [0f32; 4];
        for ((a, b), &weight) in original
            .chunks_exact(4)
            .zip(decoded.chunks_exact(4))
            .zip(texel_weights)
        {
            for lane in 0..4 {
                let diff = a[lane] - b[lane];
                sum[lane] += diff * diff * weight;
            }
        }
        sum
    }

    Vfloat4(accumulate(original, decoded, texel_weights)).dot(channel_weights)
}
