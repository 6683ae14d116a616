#![doc = include_str!(concat!("../", core::env!("CARGO_PKG_README")))]
#![cfg_attr(not(feature = "std"), no_std)]
// Not yet in stable today, but will be in 1.89.0
#![allow(stable_features)]
#![cfg_attr(
    all(feature = "nightly", any(target_arch = "x86_64", target_arch = "x86")),
    feature(stdarch_x86_avx512)
)]
#![warn(missing_docs)]

extern crate alloc;

pub mod allocate;
pub mod codec;
pub mod decode;
pub mod image;
pub mod physical_block;
pub mod vecmath;

/// Compact ASTC-style codec and baseline encoder (enabled with the `reference-codec` feature)
#[cfg(any(test, feature = "reference-codec"))]
pub mod reference_codec;

/// Common test prelude for avoiding duplicate imports in test modules
#[cfg(test)]
pub(crate) mod test_prelude;

pub use codec::{BlockCodec, BlockSizeDescriptor, DecodeConfig, Profile};
pub use image::{Image, ImageError, Swizzle, SwizzleSource};
pub use physical_block::{PhysicalBlock, BLOCK_BYTES};
