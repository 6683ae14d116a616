//! Common test imports and utilities for the optimizer tests
//!
//! This module provides a common prelude for test modules to avoid
//! duplicate imports across the codebase.

// External crates commonly used in tests
pub use rstest::rstest;

// Core functionality from this crate
pub use crate::config::{BitCostModel, LzRdoSettings};
pub use crate::error::{LzRdoError, SettingsError};
pub use crate::histogram::ModeByteHistogram;
pub use crate::mtf::MtfList;

// Common types from astc_lz_rdo_common
pub use astc_lz_rdo_common::codec::*;
pub use astc_lz_rdo_common::decode::*;
pub use astc_lz_rdo_common::image::*;
pub use astc_lz_rdo_common::physical_block::*;
pub use astc_lz_rdo_common::reference_codec::*;
pub use astc_lz_rdo_common::vecmath::*;

