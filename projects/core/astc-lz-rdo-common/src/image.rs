//! Source image access and per-block texel loading.

use crate::codec::{BlockSizeDescriptor, BLOCK_MAX_TEXELS};
use crate::vecmath::Vfloat4;
use thiserror::Error;

/// Bytes per RGBA8 texel.
pub const TEXEL_BYTES: usize = 4;

/// An error in the description of a source image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// One of the dimensions is zero.
    #[error("Image dimensions must be non-zero, got {dim_x}x{dim_y}x{dim_z}")]
    ZeroDimension {
        /// Width.
        dim_x: u32,
        /// Height.
        dim_y: u32,
        /// Depth.
        dim_z: u32,
    },

    /// The texel data does not match the dimensions.
    #[error("Expected {expected} bytes of RGBA8 texel data, got {actual}")]
    DataLength {
        /// Bytes required by the dimensions.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

/// A borrowed, tightly packed RGBA8 image (2D or 3D).
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    dim_x: u32,
    dim_y: u32,
    dim_z: u32,
    data: &'a [u8],
}

impl<'a> Image<'a> {
    /// Wraps RGBA8 texel data laid out in X, then Y, then Z order.
    pub fn new(dim_x: u32, dim_y: u32, dim_z: u32, data: &'a [u8]) -> Result<Self, ImageError> {
        if dim_x == 0 || dim_y == 0 || dim_z == 0 {
            return Err(ImageError::ZeroDimension {
                dim_x,
                dim_y,
                dim_z,
            });
        }

        let expected = dim_x as usize * dim_y as usize * dim_z as usize * TEXEL_BYTES;
        if data.len() != expected {
            return Err(ImageError::DataLength {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            dim_x,
            dim_y,
            dim_z,
            data,
        })
    }

    /// Width in texels.
    pub fn dim_x(&self) -> u32 {
        self.dim_x
    }

    /// Height in texels.
    pub fn dim_y(&self) -> u32 {
        self.dim_y
    }

    /// Depth in texels.
    pub fn dim_z(&self) -> u32 {
        self.dim_z
    }

    /// Returns the texel at the given coordinates.
    #[inline(always)]
    pub fn texel(&self, x: u32, y: u32, z: u32) -> [u8; 4] {
        let index = ((z as usize * self.dim_y as usize + y as usize) * self.dim_x as usize
            + x as usize)
            * TEXEL_BYTES;
        [
            self.data[index],
            self.data[index + 1],
            self.data[index + 2],
            self.data[index + 3],
        ]
    }

    /// Number of blocks along each axis for a block footprint.
    pub fn block_counts(&self, bsd: &BlockSizeDescriptor) -> [usize; 3] {
        [
            self.dim_x.div_ceil(bsd.xdim as u32) as usize,
            self.dim_y.div_ceil(bsd.ydim as u32) as usize,
            self.dim_z.div_ceil(bsd.zdim as u32) as usize,
        ]
    }

    /// Total number of blocks for a block footprint.
    pub fn block_count(&self, bsd: &BlockSizeDescriptor) -> usize {
        self.block_counts(bsd).iter().product()
    }
}

/// Source of one output channel when loading texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleSource {
    /// Red channel.
    R,
    /// Green channel.
    G,
    /// Blue channel.
    B,
    /// Alpha channel.
    A,
    /// Constant 0.
    Zero,
    /// Constant 255.
    One,
}

/// Component swizzle applied to source texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swizzle {
    /// Source of the red channel.
    pub r: SwizzleSource,
    /// Source of the green channel.
    pub g: SwizzleSource,
    /// Source of the blue channel.
    pub b: SwizzleSource,
    /// Source of the alpha channel.
    pub a: SwizzleSource,
}

impl Default for Swizzle {
    fn default() -> Self {
        Self {
            r: SwizzleSource::R,
            g: SwizzleSource::G,
            b: SwizzleSource::B,
            a: SwizzleSource::A,
        }
    }
}

impl Swizzle {
    /// Applies the swizzle to an RGBA8 texel.
    #[inline(always)]
    pub fn apply(&self, texel: [u8; 4]) -> [u8; 4] {
        let pick = |source: SwizzleSource| match source {
            SwizzleSource::R => texel[0],
            SwizzleSource::G => texel[1],
            SwizzleSource::B => texel[2],
            SwizzleSource::A => texel[3],
            SwizzleSource::Zero => 0,
            SwizzleSource::One => 255,
        };
        [pick(self.r), pick(self.g), pick(self.b), pick(self.a)]
    }
}

/// Source texels of one block, interleaved RGBA in `0..=65535` float space.
#[derive(Debug, Clone)]
pub struct ImageBlock {
    /// Texels in the block.
    pub texel_count: usize,
    /// Interleaved RGBA values, 4 per texel.
    pub data: [f32; BLOCK_MAX_TEXELS * 4],
    /// Per-channel error weights.
    pub channel_weight: Vfloat4,
    /// Block origin in texels.
    pub origin: [u32; 3],
}

impl ImageBlock {
    /// Creates an empty block for a footprint of `texel_count` texels.
    pub fn new(texel_count: usize, channel_weight: Vfloat4) -> Self {
        Self {
            texel_count,
            data: [0.0; BLOCK_MAX_TEXELS * 4],
            channel_weight,
            origin: [0; 3],
        }
    }

    /// RGBA value of a texel.
    #[inline(always)]
    pub fn texel(&self, index: usize) -> Vfloat4 {
        Vfloat4::load(&self.data[index * 4..])
    }

    /// The interleaved RGBA values of all texels.
    #[inline(always)]
    pub fn rgba(&self) -> &[f32] {
        &self.data[..self.texel_count * 4]
    }
}

/// Loads the block whose first texel is at `origin` into `blk`.
///
/// Texels past the image edge replicate the nearest edge texel. RGBA8 values are expanded
/// to the decoder's 16-bit range (`v * 257`).
pub fn load_image_block(
    image: &Image,
    blk: &mut ImageBlock,
    bsd: &BlockSizeDescriptor,
    origin: [u32; 3],
    swizzle: &Swizzle,
) {
    blk.origin = origin;
    blk.texel_count = bsd.texel_count;

    let mut index = 0;
    for z in 0..bsd.zdim as u32 {
        let zi = (origin[2] + z).min(image.dim_z - 1);
        for y in 0..bsd.ydim as u32 {
            let yi = (origin[1] + y).min(image.dim_y - 1);
            for x in 0..bsd.xdim as u32 {
                let xi = (origin[0] + x).min(image.dim_x - 1);
                let texel = swizzle.apply(image.texel(xi, yi, zi));
                for (lane, value) in texel.iter().enumerate() {
                    blk.data[index * 4 + lane] = *value as f32 * 257.0;
                }
                index += 1;
            }
        }
    }
}
