//! Perceptually weighted block error with a decode cache.
//!
//! Candidate blocks repeat a lot while a block is being optimized (the same MTF entries are
//! combined with the same endpoints over and over), so decoded texels are cached in a
//! set-associative table keyed by the block hash.

use astc_lz_rdo_common::allocate::{AlignedF32Buffer, AllocateError};
use astc_lz_rdo_common::codec::{BlockCodec, DecodeConfig, BLOCK_MAX_TEXELS};
use astc_lz_rdo_common::decode::{decompress_symbolic_block_raw, weighted_ssd};
use astc_lz_rdo_common::image::ImageBlock;
use astc_lz_rdo_common::PhysicalBlock;
use astc_lz_rdo_common::vecmath::Vfloat4;

/// Log2 of the number of slots per cache row.
pub const DECODE_CACHE_ROW_SHIFT: u32 = 3;

/// Slots per cache row.
pub const DECODE_CACHE_ROW_ITEMS: usize = 1 << DECODE_CACHE_ROW_SHIFT;

/// Tag bytes per row: one per slot, then the row's FIFO counter.
type RowTags = [u8; DECODE_CACHE_ROW_ITEMS + 1];

/// Set-associative cache of decoded blocks with FIFO eviction per row.
///
/// A slot's tag is 8 hash bits with the top bit forced on, so a zero tag marks an empty slot.
/// Hits require the tag and the full block to match.
pub struct DecodeCache {
    row_mask: usize,
    stride: usize,
    tags: Vec<RowTags>,
    blocks: Vec<PhysicalBlock>,
    decoded: AlignedF32Buffer,
    hits: u64,
    misses: u64,
}

impl DecodeCache {
    /// Creates a cache of `entries` decoded blocks of `texel_count` texels.
    ///
    /// # Panics
    ///
    /// If `entries` is not a power of two or is smaller than one row.
    pub fn new(entries: usize, texel_count: usize) -> Result<Self, AllocateError> {
        assert!(
            entries.is_power_of_two() && entries >= DECODE_CACHE_ROW_ITEMS,
            "decode cache size must be a power of two of at least {DECODE_CACHE_ROW_ITEMS}"
        );

        let rows = entries >> DECODE_CACHE_ROW_SHIFT;
        let stride = texel_count * 4;
        let decoded_len = entries
            .checked_mul(stride)
            .ok_or(AllocateError::SizeOverflow(entries))?;

        Ok(Self {
            row_mask: rows - 1,
            stride,
            tags: vec![[0; DECODE_CACHE_ROW_ITEMS + 1]; rows],
            blocks: vec![PhysicalBlock::ZERO; entries],
            decoded: AlignedF32Buffer::new(decoded_len)?,
            hits: 0,
            misses: 0,
        })
    }

    /// Forgets every cached block.
    pub fn clear(&mut self) {
        self.tags.fill([0; DECODE_CACHE_ROW_ITEMS + 1]);
    }

    /// Returns the decoded texels of `block`, calling `decode` to fill an evicted slot on a miss.
    pub fn get_or_decode(
        &mut self,
        block: PhysicalBlock,
        decode: impl FnOnce(&mut [f32]),
    ) -> &[f32] {
        let hash = block.hash();
        let row = hash as usize & self.row_mask;
        let tag = ((hash >> 25) as u8) | 0x80;

        let row_tags = &mut self.tags[row];
        let row_start = row << DECODE_CACHE_ROW_SHIFT;

        let found = (0..DECODE_CACHE_ROW_ITEMS).find(|&slot| {
            row_tags[slot] == tag && self.blocks[row_start + slot] == block
        });

        let index = match found {
            Some(slot) => {
                self.hits += 1;
                row_start + slot
            }
            None => {
                self.misses += 1;
                let counter = &mut row_tags[DECODE_CACHE_ROW_ITEMS];
                let slot = *counter as usize & (DECODE_CACHE_ROW_ITEMS - 1);
                *counter = counter.wrapping_add(1);

                row_tags[slot] = tag;
                let index = row_start + slot;
                self.blocks[index] = block;
                decode(&mut self.decoded.as_mut_slice()[index * self.stride..][..self.stride]);
                index
            }
        };

        &self.decoded.as_slice()[index * self.stride..][..self.stride]
    }

    /// Lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that decoded.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Scores candidate encodings of the current source block.
pub struct BlockErrorCalculator<'a, C: BlockCodec + ?Sized> {
    codec: &'a C,
    config: DecodeConfig,
    cache: DecodeCache,
    blk: ImageBlock,
    texel_weights: [f32; BLOCK_MAX_TEXELS],
}

impl<'a, C: BlockCodec + ?Sized> BlockErrorCalculator<'a, C> {
    /// Creates a calculator with a decode cache of `cache_entries` blocks.
    pub fn new(
        codec: &'a C,
        config: DecodeConfig,
        cache_entries: usize,
    ) -> Result<Self, AllocateError> {
        let texel_count = codec.block_size_descriptor().texel_count;
        Ok(Self {
            codec,
            config,
            cache: DecodeCache::new(cache_entries, texel_count)?,
            blk: ImageBlock::new(texel_count, Vfloat4::splat(1.0)),
            texel_weights: [0.0; BLOCK_MAX_TEXELS],
        })
    }

    /// Makes `blk` the block candidates are compared against, with one perceptual weight per
    /// texel.
    pub fn set_current_block(&mut self, blk: &ImageBlock, texel_weights: &[f32]) {
        self.blk.clone_from(blk);
        self.texel_weights[..blk.texel_count].copy_from_slice(&texel_weights[..blk.texel_count]);
    }

    /// The source block set by [`Self::set_current_block`].
    pub fn current_block(&self) -> &ImageBlock {
        &self.blk
    }

    /// Per-texel weights of the current block.
    pub fn texel_weights(&self) -> &[f32] {
        &self.texel_weights[..self.blk.texel_count]
    }

    /// Weighted squared error of `block` against the current source block.
    pub fn eval(&mut self, block: PhysicalBlock) -> f32 {
        let codec = self.codec;
        let config = self.config;
        let decoded = self.cache.get_or_decode(block, |out| {
            let scb = codec.physical_to_symbolic(block);
            decompress_symbolic_block_raw(codec, &config, &scb, out);
        });

        weighted_ssd(
            self.blk.rgba(),
            decoded,
            &self.texel_weights[..self.blk.texel_count],
            self.blk.channel_weight,
        )
    }

    /// The decode cache.
    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }
}
