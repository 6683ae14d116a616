//! Small 4-lane vector types and scalar helpers.
//!
//! These are plain scalar implementations; hot loops elsewhere are compiled with
//! [`mod@multiversion`] so the compiler can vectorize them for the host CPU.

use core::ops::{Add, Index, Mul, Sub};

/// Four `f32` lanes (R, G, B, A).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vfloat4(pub [f32; 4]);

/// Four `i32` lanes (R, G, B, A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vint4(pub [i32; 4]);

impl Vfloat4 {
    /// All lanes zero.
    pub const ZERO: Self = Self([0.0; 4]);

    /// Creates a vector from four lanes.
    #[inline(always)]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }

    /// Broadcasts `value` into every lane.
    #[inline(always)]
    pub const fn splat(value: f32) -> Self {
        Self([value; 4])
    }

    /// Loads four lanes from the start of `values`.
    #[inline(always)]
    pub fn load(values: &[f32]) -> Self {
        Self([values[0], values[1], values[2], values[3]])
    }

    /// Stores four lanes to the start of `out`.
    #[inline(always)]
    pub fn store(self, out: &mut [f32]) {
        out[..4].copy_from_slice(&self.0);
    }

    /// Dot product of all four lanes.
    #[inline(always)]
    pub fn dot(self, other: Self) -> f32 {
        let [a0, a1, a2, a3] = self.0;
        let [b0, b1, b2, b3] = other.0;
        (a0 * b0 + a2 * b2) + (a1 * b1 + a3 * b3)
    }

    /// Horizontal sum of all four lanes.
    #[inline(always)]
    pub fn hadd(self) -> f32 {
        let [a, b, c, d] = self.0;
        (a + c) + (b + d)
    }

    /// Lane-wise absolute value.
    #[inline(always)]
    pub fn abs(self) -> Self {
        Self(self.0.map(f32::abs))
    }
}

impl Vint4 {
    /// Creates a vector from four lanes.
    #[inline(always)]
    pub const fn new(r: i32, g: i32, b: i32, a: i32) -> Self {
        Self([r, g, b, a])
    }

    /// Broadcasts `value` into every lane.
    #[inline(always)]
    pub const fn splat(value: i32) -> Self {
        Self([value; 4])
    }

    /// Arithmetic shift right of every lane.
    #[inline(always)]
    pub fn asr(self, shift: u32) -> Self {
        Self(self.0.map(|v| v >> shift))
    }

    /// Per-lane select: lanes where `mask` is set come from `other`.
    #[inline(always)]
    pub fn select(self, other: Self, mask: [bool; 4]) -> Self {
        let mut out = self.0;
        for (lane, value) in out.iter_mut().enumerate() {
            if mask[lane] {
                *value = other.0[lane];
            }
        }
        Self(out)
    }

    /// Converts each lane to `f32`.
    #[inline(always)]
    pub fn to_float(self) -> Vfloat4 {
        Vfloat4(self.0.map(|v| v as f32))
    }
}

macro_rules! impl_lanewise {
    ($ty:ident, $trait:ident, $fn:ident, $op:tt) => {
        impl $trait for $ty {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: Self) -> Self {
                let mut out = self.0;
                for (lane, value) in out.iter_mut().enumerate() {
                    *value = *value $op rhs.0[lane];
                }
                Self(out)
            }
        }
    };
}

impl_lanewise!(Vfloat4, Add, add, +);
impl_lanewise!(Vfloat4, Sub, sub, -);
impl_lanewise!(Vfloat4, Mul, mul, *);
impl_lanewise!(Vint4, Add, add, +);
impl_lanewise!(Vint4, Sub, sub, -);
impl_lanewise!(Vint4, Mul, mul, *);

impl Mul<f32> for Vfloat4 {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f32) -> Self {
        Self(self.0.map(|v| v * rhs))
    }
}

impl Index<usize> for Vfloat4 {
    type Output = f32;

    #[inline(always)]
    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

impl Index<usize> for Vint4 {
    type Output = i32;

    #[inline(always)]
    fn index(&self, index: usize) -> &i32 {
        &self.0[index]
    }
}

/// Normalizes `value` to unit length, returning `fallback` for (near) zero-length input.
#[cfg(feature = "std")]
#[inline]
pub fn normalize_safe(value: Vfloat4, fallback: Vfloat4) -> Vfloat4 {
    let length_squared = value.dot(value);
    if length_squared != 0.0 {
        value * (1.0 / length_squared.sqrt())
    } else {
        fallback
    }
}

/// Clamps a value into `[0, 1]`, mapping NaN to 0.
#[inline(always)]
pub fn clamp1f(value: f32) -> f32 {
    if value > 1.0 {
        1.0
    } else if value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Fast approximate base-2 logarithm for positive, normal inputs.
///
/// Splits off the exponent and fits `log2(m) / (m - 1)` on the mantissa `m` in `[1, 2)`
/// with a degree-4 polynomial; the trailing `(m - 1)` factor makes `fast_log2(1.0) == 0.0`.
#[inline]
#[allow(clippy::excessive_precision)]
pub fn fast_log2(value: f32) -> f32 {
    let bits = value.to_bits() as i32;
    let exponent = ((bits >> 23) - 127) as f32;
    let m = f32::from_bits(((bits & 0x007F_FFFF) | 0x3F80_0000) as u32);

    const C0: f32 = 2.888_270_454_816_477_6;
    const C1: f32 = -2.520_749_625_778_070_1;
    const C2: f32 = 1.481_166_475_212_131_7;
    const C3: f32 = -0.465_725_644_288_844_8;
    const C4: f32 = 0.059_651_548_267_457_5;

    let p = C0 + m * (C1 + m * (C2 + m * (C3 + m * C4)));

    p * (m - 1.0) + exponent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    #[rstest]
    #[case::one(0)]
    #[case::two(1)]
    #[case::thirty_two(5)]
    #[case::big(20)]
    fn fast_log2_of_powers_of_two(#[case] power: i32) {
        let value = 2f32.powi(power);
        let approx = fast_log2(value);
        assert!((approx - power as f32).abs() < 1e-3, "{approx} vs {power}");
    }

    #[test]
    fn fast_log2_one_is_exactly_zero() {
        assert_eq!(fast_log2(1.0), 0.0);
    }

    #[test]
    fn fast_log2_tracks_std_log2() {
        for i in 1..2000 {
            let value = i as f32 * 0.37;
            assert!((fast_log2(value) - value.log2()).abs() < 1e-3);
        }
    }

    #[test]
    fn normalize_safe_handles_zero() {
        let fallback = Vfloat4::splat(0.0);
        assert_eq!(normalize_safe(Vfloat4::ZERO, fallback), fallback);

        let unit = normalize_safe(Vfloat4::new(3.0, 0.0, 4.0, 0.0), fallback);
        assert!((unit.dot(unit) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clamp1f_limits_range() {
        assert_eq!(clamp1f(-0.5), 0.0);
        assert_eq!(clamp1f(0.25), 0.25);
        assert_eq!(clamp1f(7.0), 1.0);
        assert_eq!(clamp1f(f32::NAN), 0.0);
    }
}
