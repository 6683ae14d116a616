//! Common test imports and utilities for the shared block and codec types.

// External crates commonly used in tests
pub use rstest::rstest;

// Core functionality from this crate
pub use crate::codec::*;
pub use crate::decode::*;
pub use crate::image::*;
pub use crate::physical_block::*;
pub use crate::reference_codec::{ReferenceCodec, ReferenceEncoder};
pub use crate::vecmath::*;
