//! The 128-bit physical encoding of a single block.
//!
//! A [`PhysicalBlock`] is stored as a little-endian [`u128`], so bitwise operations (and the
//! masks built by [`PhysicalBlock::top_bits_mask`]) are independent of the host byte order.
//! Byte-level accessors always read the little-endian interpretation.

use core::ops::{BitAnd, BitOr, Not};

/// Size of an encoded block in bytes.
pub const BLOCK_BYTES: usize = 16;

/// An immutable, encoded 128-bit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PhysicalBlock(u128);

impl PhysicalBlock {
    /// The all-zero block. Also used as an 'empty' mask.
    pub const ZERO: Self = Self(0);

    /// Creates a block from its 16 encoded bytes.
    #[inline(always)]
    pub const fn from_bytes(bytes: [u8; BLOCK_BYTES]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    /// Reads a block from the start of `bytes`.
    ///
    /// # Panics
    ///
    /// If `bytes` is shorter than [`BLOCK_BYTES`].
    #[inline(always)]
    pub fn read(bytes: &[u8]) -> Self {
        let mut raw = [0u8; BLOCK_BYTES];
        raw.copy_from_slice(&bytes[..BLOCK_BYTES]);
        Self::from_bytes(raw)
    }

    /// Returns the 16 encoded bytes.
    #[inline(always)]
    pub const fn to_bytes(self) -> [u8; BLOCK_BYTES] {
        self.0.to_le_bytes()
    }

    /// Writes the encoded bytes to the start of `out`.
    #[inline(always)]
    pub fn write(self, out: &mut [u8]) {
        out[..BLOCK_BYTES].copy_from_slice(&self.to_bytes());
    }

    /// Creates a block from its little-endian integer value.
    #[inline(always)]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Returns the little-endian integer value of the block.
    #[inline(always)]
    pub const fn to_u128(self) -> u128 {
        self.0
    }

    /// Returns byte `index` of the encoding.
    #[inline(always)]
    pub const fn byte(self, index: usize) -> u8 {
        (self.0 >> (index * 8)) as u8
    }

    /// Extracts the 11-bit block mode id from the first two bytes.
    #[inline(always)]
    pub const fn block_mode(self) -> u16 {
        (self.0 & 0x7FF) as u16
    }

    /// The two partition count bits that follow the block mode (`partition count - 1`).
    #[inline(always)]
    pub const fn partition_bits(self) -> u8 {
        (self.byte(1) >> 3) & 3
    }

    /// Returns a mask with the top `num_bits` of the 128 bits set.
    ///
    /// Weights are stored from the most significant bit downwards, so this isolates the
    /// weight portion of a block given its weight bit count. Values above 128 saturate.
    #[inline]
    pub const fn top_bits_mask(num_bits: u32) -> Self {
        match num_bits {
            0 => Self(0),
            n if n >= 128 => Self(u128::MAX),
            n => Self(u128::MAX << (128 - n)),
        }
    }

    /// 32-bit mixing hash of the block contents, used for cache indexing only.
    #[inline]
    pub const fn hash(self) -> u32 {
        const PRIME64_1: u64 = 0x9E37_79B1_85EB_CA87;
        const PRIME64_2: u64 = 0xC2B2_AE3D_27D4_EB4F;

        let h1 = (self.0 as u64)
            .wrapping_mul(PRIME64_1)
            .rotate_left(31)
            .wrapping_mul(PRIME64_2);
        let h2 = ((self.0 >> 64) as u64)
            .wrapping_mul(PRIME64_2)
            .rotate_left(29)
            .wrapping_mul(PRIME64_1);

        let mut result = (h1 ^ h2) as u32;
        result ^= result >> 15;
        result = result.wrapping_mul(0x85EB_CA6B);
        result ^= result >> 13;
        result = result.wrapping_mul(0xC2B2_AE35);
        result ^= result >> 16;
        result
    }
}

impl From<[u8; BLOCK_BYTES]> for PhysicalBlock {
    #[inline(always)]
    fn from(bytes: [u8; BLOCK_BYTES]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl BitAnd for PhysicalBlock {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for PhysicalBlock {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Not for PhysicalBlock {
    type Output = Self;

    #[inline(always)]
    fn not(self) -> Self {
        Self(!self.0)
    }
}
