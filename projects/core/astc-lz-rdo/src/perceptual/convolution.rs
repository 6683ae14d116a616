//! Separable convolution over 3D float volumes.
//!
//! Volumes are `xdim * ydim * zdim` values in X, then Y, then Z order. Kernel taps that fall
//! outside the volume are dropped and the remaining taps renormalized, so a constant field
//! stays constant up to the edges.

use super::kernel::FilterKernel;
use multiversion::multiversion;

/// Axis a 1D convolution runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Along rows.
    X,
    /// Along columns.
    Y,
    /// Across slices.
    Z,
}

/// Convolves `input` with `kernel` along one axis into `output`.
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
pub fn apply_1d_convolution_3d(
    input: &[f32],
    output: &mut [f32],
    dims: [usize; 3],
    kernel: &FilterKernel,
    axis: Axis,
) {
    let [xdim, ydim, zdim] = dims;
    let len = xdim * ydim * zdim;
    debug_assert!(input.len() >= len && output.len() >= len);

    let (stride, extent) = match axis {
        Axis::X => (1, xdim),
        Axis::Y => (xdim, ydim),
        Axis::Z => (xdim * ydim, zdim),
    };
    let radius = kernel.radius as isize;

    for z in 0..zdim {
        for y in 0..ydim {
            let row = (z * ydim + y) * xdim;
            for x in 0..xdim {
                let index = row + x;
                let pos = match axis {
                    Axis::X => x,
                    Axis::Y => y,
                    Axis::Z => z,
                } as isize;

                let k0 = -pos.min(radius);
                let k1 = (extent as isize - 1 - pos).min(radius);

                let mut sum = 0.0f32;
                let mut weight_sum = 0.0f32;
                for k in k0..=k1 {
                    let weight = kernel.tap(k);
                    weight_sum += weight;
                    sum += weight * input[(index as isize + k * stride as isize) as usize];
                }

                output[index] = if k0 == -radius && k1 == radius {
                    sum
                } else {
                    sum / weight_sum
                };
            }
        }
    }
}

/// Applies `kernel` along every axis of the volume (X and Y only when `zdim == 1`).
///
/// `input` is left untouched; `workspace` must be at least as large as the volume.
pub fn separable_convolve_3d(
    input: &[f32],
    output: &mut [f32],
    workspace: &mut [f32],
    dims: [usize; 3],
    kernel: &FilterKernel,
) {
    if dims[2] > 1 {
        apply_1d_convolution_3d(input, output, dims, kernel, Axis::X);
        apply_1d_convolution_3d(output, workspace, dims, kernel, Axis::Y);
        apply_1d_convolution_3d(workspace, output, dims, kernel, Axis::Z);
    } else {
        apply_1d_convolution_3d(input, workspace, dims, kernel, Axis::X);
        apply_1d_convolution_3d(workspace, output, dims, kernel, Axis::Y);
    }
}

#[cfg(test)]
mod tests {
    use super::super::kernel::{INITIAL_LPF, SPREAD};
    use super::*;
    use crate::test_prelude::*;

    #[rstest]
    #[case::plane_2d([17, 9, 1], INITIAL_LPF)]
    #[case::tiny([1, 1, 1], INITIAL_LPF)]
    #[case::volume_3d([6, 5, 4], SPREAD)]
    fn constant_field_is_preserved(#[case] dims: [usize; 3], #[case] kernel: FilterKernel) {
        let len = dims.iter().product();
        let input = vec![42.0f32; len];
        let mut output = vec![0.0f32; len];
        let mut workspace = vec![0.0f32; len];

        separable_convolve_3d(&input, &mut output, &mut workspace, dims, &kernel);
        assert!(output.iter().all(|&v| (v - 42.0).abs() < 1e-3), "{output:?}");
    }

    #[test]
    fn impulse_spreads_by_kernel() {
        // Wide enough that no output near the impulse touches an edge.
        let dims = [17, 1, 1];
        let mut input = vec![0.0f32; 17];
        input[8] = 1.0;
        let mut output = vec![0.0f32; 17];

        apply_1d_convolution_3d(&input, &mut output, dims, &SPREAD, Axis::X);
        for k in -4..=4isize {
            let expected = SPREAD.tap(k);
            assert!((output[(8 + k) as usize] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn edges_renormalize() {
        // Ramp along Y; the first row only sees taps at or below it.
        let dims = [1, 4, 1];
        let input = [0.0f32, 1.0, 2.0, 3.0];
        let mut output = [0.0f32; 4];
        apply_1d_convolution_3d(&input, &mut output, dims, &SPREAD, Axis::Y);

        let taps = [SPREAD.tap(0), SPREAD.tap(1), SPREAD.tap(2), SPREAD.tap(3)];
        let expected = (taps[1] + 2.0 * taps[2] + 3.0 * taps[3]) / taps.iter().sum::<f32>();
        assert!((output[0] - expected).abs() < 1e-5);
        // Symmetric about the middle.
        assert!((output[0] + output[3] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn z_axis_uses_slice_stride() {
        let dims = [2, 2, 3];
        let mut input = vec![0.0f32; 12];
        // Slice 1 set to 1.
        input[4..8].fill(1.0);
        let mut output = vec![0.0f32; 12];
        apply_1d_convolution_3d(&input, &mut output, dims, &SPREAD, Axis::Z);

        // All texels in a slice see the same values.
        assert!(output[0..4].iter().all(|&v| (v - output[0]).abs() < 1e-7));
        assert!(output[4] > output[0]);
    }
}
