//! Internal functions re-exported for external benchmarks.
//!
//! This module re-exposes internal functions with `pub(crate)` visibility so that external
//! benchmarks can still access them when the `bench` feature is enabled.
#![cfg(not(tarpaulin_include))]

pub mod perceptual {
    //! Perceptual weight filtering

    pub use crate::perceptual::convolution::{
        apply_1d_convolution_3d, separable_convolve_3d, Axis,
    };
    pub use crate::perceptual::kernel::{FilterKernel, INITIAL_LPF, SPREAD};
}
