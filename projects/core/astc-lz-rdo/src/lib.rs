#![doc = include_str!(concat!("../", core::env!("CARGO_PKG_README")))]
// Not yet in stable today, but will be in 1.89.0
#![allow(stable_features)]
#![cfg_attr(
    all(feature = "nightly", any(target_arch = "x86_64", target_arch = "x86")),
    feature(stdarch_x86_avx512)
)]
#![warn(missing_docs)]

pub mod bit_cost;
pub mod candidates;
pub mod config;
pub mod endpoint_subst;
pub mod error;
pub mod error_calc;
pub mod histogram;
pub mod mtf;
pub mod perceptual;
pub mod progress;

pub(crate) mod optimize;

#[cfg(feature = "bench")]
pub mod bench;

pub use config::{BitCostModel, LzRdoSettings};
pub use error::{LzRdoError, SettingsError};
pub use optimize::{lz_rdo_optimize, lz_rdo_setup, LzRdoStats};
pub use perceptual::PerTexelWeights;

/// Common test prelude for avoiding duplicate imports in test modules
#[cfg(test)]
pub(crate) mod test_prelude;
