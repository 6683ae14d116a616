//! Errors returned by the optimizer entry points.
//!
//! The search itself has no failure path; these cover caller misuse that is detected before
//! any block is touched.

use astc_lz_rdo_common::allocate::AllocateError;
use astc_lz_rdo_common::ImageError;
use thiserror::Error;

/// An invalid [`LzRdoSettings`](crate::LzRdoSettings) field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// Lambda is negative, NaN or infinite.
    #[error("Lambda must be finite and non-negative, got {0}")]
    InvalidLambda(f32),

    /// A count that must be at least one is zero.
    #[error("`{0}` must be at least 1")]
    ZeroCount(&'static str),

    /// A size that must be a power of two is not.
    #[error("`{name}` must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Field name.
        name: &'static str,
        /// Supplied value.
        value: usize,
    },

    /// The decode cache is smaller than one row.
    #[error("`decode_cache_entries` must be at least {minimum}, got {value}")]
    DecodeCacheTooSmall {
        /// Smallest accepted size.
        minimum: usize,
        /// Supplied value.
        value: usize,
    },

    /// The histogram decay period is outside `1..=32768`.
    #[error("`histogram_decay_period` must be within 1..=32768, got {0}")]
    InvalidDecayPeriod(u32),

    /// A float tunable is negative, NaN or infinite.
    #[error("`{name}` must be finite and non-negative, got {value}")]
    InvalidTunable {
        /// Field name.
        name: &'static str,
        /// Supplied value.
        value: f32,
    },

    /// Channel weights must be finite, non-negative and not all zero.
    #[error("Channel weights must be finite, non-negative and not all zero, got {0:?}")]
    InvalidChannelWeights([f32; 4]),
}

/// Errors from [`lz_rdo_setup`](crate::lz_rdo_setup) and
/// [`lz_rdo_optimize`](crate::lz_rdo_optimize).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LzRdoError {
    /// The settings failed validation.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The source image is invalid.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Scratch memory could not be allocated.
    #[error(transparent)]
    Allocate(#[from] AllocateError),

    /// The block buffer is not a whole number of blocks.
    #[error("Invalid block buffer length: {0} (must be divisible by 16)")]
    InvalidLength(usize),

    /// The block buffer does not hold one block per image tile.
    #[error("Block buffer holds {actual} blocks, image needs {expected}")]
    BlockCountMismatch {
        /// Blocks required by the image and block size.
        expected: usize,
        /// Blocks in the buffer.
        actual: usize,
    },

    /// The restricted encoding buffer differs in length from the block buffer.
    #[error("Restricted buffer is {actual} bytes, block buffer is {expected}")]
    RestrictedLengthMismatch {
        /// Length of the block buffer.
        expected: usize,
        /// Length of the restricted buffer.
        actual: usize,
    },

    /// The per-texel weights were computed for a different image or block size.
    #[error("Per-texel weights hold {actual} values, image needs {expected}")]
    WeightsMismatch {
        /// Values required by the image and block size.
        expected: usize,
        /// Values in the buffer.
        actual: usize,
    },
}
