//! Per-texel perceptual error weights.
//!
//! Quantization error is most visible in smooth regions and masked by detail. Each texel's
//! weight falls with the high-frequency energy around it: the image is low-pass filtered, the
//! squared residual summed over channels, spread with a second smaller blur, and mapped to
//! `C1 / (C2 + (4 / 255) * sqrt(energy))`.
//!
//! The image is processed in independent block-aligned tiles to bound scratch memory. Weights
//! are stored in block order, `texel_count` values per block, ready for the error calculator.

pub(crate) mod convolution;
pub(crate) mod kernel;

use crate::config::LzRdoSettings;
use astc_lz_rdo_common::allocate::{AlignedF32Buffer, AllocateError};
use astc_lz_rdo_common::{BlockSizeDescriptor, Image, Swizzle};
use convolution::separable_convolve_3d;
use kernel::{INITIAL_LPF, SPREAD};
use multiversion::multiversion;
#[cfg(feature = "multithreaded")]
use rayon::prelude::*;

/// Weight of a texel with no surrounding detail is `C1 / C2`.
const C1: f32 = 1.0 / 257.0;
const C2: f32 = 257.0 / 256.0;
const ACTIVITY_SCALE: f32 = 4.0 / 255.0;

/// Perceptual error weight of every texel, in block order.
#[derive(Debug, Clone, PartialEq)]
pub struct PerTexelWeights {
    weights: Vec<f32>,
    texel_count: usize,
}

impl PerTexelWeights {
    /// Weights of the texels of block `block_index`.
    #[inline(always)]
    pub fn block(&self, block_index: usize) -> &[f32] {
        &self.weights[block_index * self.texel_count..][..self.texel_count]
    }

    /// All weights.
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Texels per block.
    pub fn texel_count(&self) -> usize {
        self.texel_count
    }

    /// Number of blocks covered.
    pub fn block_count(&self) -> usize {
        self.weights.len() / self.texel_count
    }
}

/// Scratch planes for one tile.
struct TileBuffers {
    channels: [AlignedF32Buffer; 4],
    work: AlignedF32Buffer,
    filtered: AlignedF32Buffer,
}

impl TileBuffers {
    fn new(texels: usize) -> Result<Self, AllocateError> {
        Ok(Self {
            channels: [
                AlignedF32Buffer::new(texels)?,
                AlignedF32Buffer::new(texels)?,
                AlignedF32Buffer::new(texels)?,
                AlignedF32Buffer::new(texels)?,
            ],
            work: AlignedF32Buffer::new(texels)?,
            filtered: AlignedF32Buffer::new(texels)?,
        })
    }
}

/// Weights of the blocks overlapping one tile.
struct TileWeights {
    first_block: [usize; 3],
    blocks: [usize; 3],
    weights: Vec<f32>,
}

/// Tile edge lengths: roughly the configured size, rounded down to whole blocks.
fn tile_extent(bsd: &BlockSizeDescriptor, settings: &LzRdoSettings) -> [u32; 3] {
    let fit = |size: u32, dim: u8| (size / dim as u32).max(1) * dim as u32;
    if bsd.zdim == 1 {
        [
            fit(settings.tile_size_2d, bsd.xdim),
            fit(settings.tile_size_2d, bsd.ydim),
            1,
        ]
    } else {
        [
            fit(settings.tile_size_3d, bsd.xdim),
            fit(settings.tile_size_3d, bsd.ydim),
            fit(settings.tile_size_3d, bsd.zdim),
        ]
    }
}

/// Computes the perceptual weight of every texel of `image` for blocks described by `bsd`.
///
/// Texels of partial edge blocks that fall outside the image get weight 0.
pub fn compute_per_texel_weights(
    bsd: &BlockSizeDescriptor,
    image: &Image,
    settings: &LzRdoSettings,
) -> Result<PerTexelWeights, AllocateError> {
    let extent = tile_extent(bsd, settings);
    let image_dims = [image.dim_x(), image.dim_y(), image.dim_z()];
    let tiles: [u32; 3] = core::array::from_fn(|i| image_dims[i].div_ceil(extent[i]));
    let tile_count = tiles.iter().map(|&t| t as usize).product::<usize>();
    let max_tile_texels = extent.iter().map(|&e| e as usize).product::<usize>();

    let swizzle = settings.swizzle;
    let tile_task = |buffers: &mut TileBuffers, tile_index: usize| {
        let tile_index = tile_index as u32;
        let coords = [
            tile_index % tiles[0],
            (tile_index / tiles[0]) % tiles[1],
            tile_index / (tiles[0] * tiles[1]),
        ];
        let origin: [u32; 3] = core::array::from_fn(|i| coords[i] * extent[i]);
        let dims: [u32; 3] = core::array::from_fn(|i| extent[i].min(image_dims[i] - origin[i]));
        compute_tile_weights(image, bsd, &swizzle, origin, dims, buffers)
    };

    #[cfg(feature = "multithreaded")]
    let tile_weights = (0..tile_count)
        .into_par_iter()
        .map_init(
            || TileBuffers::new(max_tile_texels),
            |buffers, tile_index| {
                let buffers = buffers.as_mut().map_err(|e| e.clone())?;
                Ok(tile_task(buffers, tile_index))
            },
        )
        .collect::<Result<Vec<_>, AllocateError>>()?;

    #[cfg(not(feature = "multithreaded"))]
    let tile_weights = {
        let mut buffers = TileBuffers::new(max_tile_texels)?;
        (0..tile_count)
            .map(|tile_index| tile_task(&mut buffers, tile_index))
            .collect::<Vec<_>>()
    };

    let [blocks_x, blocks_y, _] = image.block_counts(bsd);
    let texel_count = bsd.texel_count;
    let mut weights = vec![0.0f32; image.block_count(bsd) * texel_count];

    for tile in &tile_weights {
        let mut source = tile.weights.chunks_exact(texel_count);
        for bz in 0..tile.blocks[2] {
            for by in 0..tile.blocks[1] {
                for bx in 0..tile.blocks[0] {
                    let block_index = ((tile.first_block[2] + bz) * blocks_y
                        + tile.first_block[1]
                        + by)
                        * blocks_x
                        + tile.first_block[0]
                        + bx;
                    if let Some(block_weights) = source.next() {
                        weights[block_index * texel_count..][..texel_count]
                            .copy_from_slice(block_weights);
                    }
                }
            }
        }
    }

    Ok(PerTexelWeights {
        weights,
        texel_count,
    })
}

fn compute_tile_weights(
    image: &Image,
    bsd: &BlockSizeDescriptor,
    swizzle: &Swizzle,
    origin: [u32; 3],
    dims: [u32; 3],
    buffers: &mut TileBuffers,
) -> TileWeights {
    let [tile_x, tile_y, tile_z] = dims.map(|d| d as usize);
    let texels = tile_x * tile_y * tile_z;
    let volume = [tile_x, tile_y, tile_z];

    // Load the tile as four channel planes.
    let mut index = 0;
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                let texel = swizzle.apply(image.texel(origin[0] + x, origin[1] + y, origin[2] + z));
                for (channel, value) in buffers.channels.iter_mut().zip(texel) {
                    channel.as_mut_slice()[index] = value as f32 * 257.0;
                }
                index += 1;
            }
        }
    }

    // High-pass energy, accumulated into the first channel plane.
    let work = &mut buffers.work.as_mut_slice()[..texels];
    let filtered = &mut buffers.filtered.as_mut_slice()[..texels];
    let [energy, rest @ ..] = &mut buffers.channels;
    let energy = &mut energy.as_mut_slice()[..texels];

    separable_convolve_3d(energy, filtered, work, volume, &INITIAL_LPF);
    accumulate_high_pass_energy(energy, None, filtered);
    for channel in rest.iter() {
        let channel = &channel.as_slice()[..texels];
        separable_convolve_3d(channel, filtered, work, volume, &INITIAL_LPF);
        accumulate_high_pass_energy(energy, Some(channel), filtered);
    }

    // Spread the energy and map it to weights.
    separable_convolve_3d(energy, filtered, work, volume, &SPREAD);
    energy_to_weight(filtered);

    // Scatter into block order.
    let blocks = [
        tile_x.div_ceil(bsd.xdim as usize),
        tile_y.div_ceil(bsd.ydim as usize),
        tile_z.div_ceil(bsd.zdim as usize),
    ];
    let mut weights = Vec::with_capacity(blocks.iter().product::<usize>() * bsd.texel_count);
    for bz in 0..blocks[2] {
        for by in 0..blocks[1] {
            for bx in 0..blocks[0] {
                for z in 0..bsd.zdim as usize {
                    let zt = bz * bsd.zdim as usize + z;
                    for y in 0..bsd.ydim as usize {
                        let yt = by * bsd.ydim as usize + y;
                        for x in 0..bsd.xdim as usize {
                            let xt = bx * bsd.xdim as usize + x;
                            weights.push(if xt < tile_x && yt < tile_y && zt < tile_z {
                                filtered[(zt * tile_y + yt) * tile_x + xt]
                            } else {
                                0.0
                            });
                        }
                    }
                }
            }
        }
    }

    TileWeights {
        first_block: [
            origin[0] as usize / bsd.xdim as usize,
            origin[1] as usize / bsd.ydim as usize,
            origin[2] as usize / bsd.zdim as usize,
        ],
        blocks,
        weights,
    }
}

/// Adds `(channel - filtered)^2` to `energy`. With no `channel`, `energy` holds the channel
/// itself and is overwritten.
#[multiversion(targets(
    // x86-64-v3 without lahfsahf
    "x86_64+avx+avx2+bmi1+bmi2+cmpxchg16b+f16c+fma+fxsr+lzcnt+movbe+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3+xsave",
    // x86-64-v2 without lahfsahf
    "x86_64+cmpxchg16b+fxsr+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3",
))]
fn accumulate_high_pass_energy(energy: &mut [f32], channel: Option<&[f32]>, filtered: &[f32]) {
    match channel {
        None => {
            for (e, f) in energy.iter_mut().zip(filtered) {
                let diff = *e - f;
                *e = diff * diff;
            }
        }
        Some(channel) => {
            for ((e, c), f) in energy.iter_mut().zip(channel).zip(filtered) {
                let diff = c - f;
                *e += diff * diff;
            }
        }
    }
}

#[multiversion(targets(
    // x86-64-v3 without lahfsahf
    "x86_64+avx+avx2+bmi1+bmi2+cmpxchg16b+f16c+fma+fxsr+lzcnt+movbe+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3+xsave",
    // x86-64-v2 without lahfsahf
    "x86_64+cmpxchg16b+fxsr+popcnt+sse+sse2+sse3+sse4.1+sse4.2+ssse3",
))]
fn energy_to_weight(values: &mut [f32]) {
    for value in values.iter_mut() {
        *value = C1 / (C2 + ACTIVITY_SCALE * value.max(0.0).sqrt());
    }
}
