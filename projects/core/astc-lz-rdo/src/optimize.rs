//! The rate-distortion search and its public entry points.
//!
//! The block buffer is split into work items of up to `max_blocks_per_item` blocks. Each item
//! is optimized independently by a worker that owns its MTF lists, histogram and decode cache,
//! so items can run on any thread in any order.
//!
//! Within an item, every pass reseeds the statistics from a sample of blocks and then visits
//! the blocks (forwards on even passes, backwards on odd ones). For each block the worker
//! scores the current encoding, the two reference encodings, endpoint substitutions and every
//! recombination of candidate endpoints with recently seen weights, and keeps whichever has the
//! lowest `error + lambda * bits`.

use crate::candidates::CandidateList;
use crate::config::LzRdoSettings;
use crate::endpoint_subst::{fit_known_endpoints, is_simple_block, CompactSimpleEndpoints, EndpointSubstMtf};
use crate::error::LzRdoError;
use crate::error_calc::BlockErrorCalculator;
use crate::histogram::ModeByteHistogram;
use crate::mtf::MtfList;
use crate::perceptual::{compute_per_texel_weights, PerTexelWeights};
use crate::progress::ProgressTracker;
use astc_lz_rdo_common::allocate::AllocateError;
use astc_lz_rdo_common::codec::{DecodeConfig, EndpointsAndWeights};
use astc_lz_rdo_common::image::{load_image_block, ImageBlock};
use astc_lz_rdo_common::vecmath::Vfloat4;
use astc_lz_rdo_common::{BlockCodec, Image, PhysicalBlock, BLOCK_BYTES};
use core::ops::Add;
use likely_stable::unlikely;
#[cfg(feature = "multithreaded")]
use rayon::prelude::*;
use tracing::{debug, info, trace};

/// Error assumed for a substitution before any has been scored.
const UNSCORED_ERROR: f32 = 1e30;

/// Counts gathered while optimizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LzRdoStats {
    /// Blocks processed.
    pub total_blocks: usize,
    /// Blocks whose final encoding differs from the baseline.
    pub rewritten_blocks: usize,
    /// Blocks without weight bits (constant color or invalid), passed through unchanged.
    pub zero_weight_blocks: usize,
}

impl Add for LzRdoStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            total_blocks: self.total_blocks + rhs.total_blocks,
            rewritten_blocks: self.rewritten_blocks + rhs.rewritten_blocks,
            zero_weight_blocks: self.zero_weight_blocks + rhs.zero_weight_blocks,
        }
    }
}

/// Computes the per-texel perceptual weights [`lz_rdo_optimize`] needs for `image`.
///
/// This must complete before optimization starts; the weights have no valid partial state.
///
/// # Parameters
///
/// - `codec`: Codec whose block size the weights are laid out for
/// - `settings`: Optimizer settings; the swizzle and tile sizes are used here
/// - `image`: The source image
///
/// # Returns
///
/// One weight per texel, grouped per block in block order.
pub fn lz_rdo_setup<C: BlockCodec + ?Sized>(
    codec: &C,
    settings: &LzRdoSettings,
    image: &Image,
) -> Result<PerTexelWeights, LzRdoError> {
    settings.validate()?;

    let bsd = codec.block_size_descriptor();
    let weights = compute_per_texel_weights(bsd, image, settings)?;
    info!(
        dim_x = image.dim_x(),
        dim_y = image.dim_y(),
        dim_z = image.dim_z(),
        blocks = weights.block_count(),
        "computed per-texel weights"
    );
    Ok(weights)
}

/// Rewrites `blocks` in place so the encoded data compresses better with LZ-based compressors.
///
/// Every output block is either one of the input encodings or a recombination of valid
/// encodings, so the buffer stays decodable. With `lambda == 0` only distortion is minimized.
///
/// # Parameters
///
/// - `codec`: Codec the blocks are encoded with
/// - `settings`: Optimizer settings
/// - `image`: The source image the blocks were encoded from
/// - `weights`: Per-texel weights from [`lz_rdo_setup`] for the same image and codec
/// - `blocks`: The baseline encoding, one block per image block in X, Y, Z order
/// - `restricted`: An alternative encoding using only single plane, single partition blocks.
///   The baseline stands in for it when `None`.
/// - `progress`: Called with the completion percentage after each work item
///
/// # Returns
///
/// Statistics about the rewritten blocks.
pub fn lz_rdo_optimize<C: BlockCodec + ?Sized>(
    codec: &C,
    settings: &LzRdoSettings,
    image: &Image,
    weights: &PerTexelWeights,
    blocks: &mut [u8],
    restricted: Option<&[u8]>,
    progress: Option<&(dyn Fn(f32) + Sync)>,
) -> Result<LzRdoStats, LzRdoError> {
    settings.validate()?;

    if blocks.len() % BLOCK_BYTES != 0 {
        return Err(LzRdoError::InvalidLength(blocks.len()));
    }

    let bsd = codec.block_size_descriptor();
    let block_count = image.block_count(bsd);
    if blocks.len() / BLOCK_BYTES != block_count {
        return Err(LzRdoError::BlockCountMismatch {
            expected: block_count,
            actual: blocks.len() / BLOCK_BYTES,
        });
    }

    if let Some(restricted) = restricted {
        if restricted.len() != blocks.len() {
            return Err(LzRdoError::RestrictedLengthMismatch {
                expected: blocks.len(),
                actual: restricted.len(),
            });
        }
    }

    if weights.texel_count() != bsd.texel_count || weights.block_count() != block_count {
        return Err(LzRdoError::WeightsMismatch {
            expected: block_count * bsd.texel_count,
            actual: weights.as_slice().len(),
        });
    }

    let [r, g, b, a] = settings.normalized_channel_weights();
    let ctx = RdoContext {
        codec,
        settings,
        image: *image,
        weights,
        restricted,
        lambda: settings.effective_lambda(bsd.texel_count),
        decode_config: settings.decode_config(),
        channel_weight: Vfloat4::new(r, g, b, a),
        block_counts: image.block_counts(bsd),
    };

    let tracker = ProgressTracker::new(block_count, progress);
    let item_blocks = settings.max_blocks_per_item;
    let item_bytes = item_blocks * BLOCK_BYTES;

    #[cfg(feature = "multithreaded")]
    let stats = blocks
        .par_chunks_mut(item_bytes)
        .enumerate()
        .map_init(
            || RdoWorker::new(&ctx),
            |worker, (item, item_data)| {
                let worker = worker.as_mut().map_err(|e| e.clone())?;
                let stats = worker.process_item(&ctx, item * item_blocks, item_data);
                tracker.complete(stats.total_blocks);
                Ok::<_, AllocateError>(stats)
            },
        )
        .try_reduce(LzRdoStats::default, |a, b| Ok(a + b))?;

    #[cfg(not(feature = "multithreaded"))]
    let stats = {
        let mut worker = RdoWorker::new(&ctx)?;
        let mut stats = LzRdoStats::default();
        for (item, item_data) in blocks.chunks_mut(item_bytes).enumerate() {
            let item_stats = worker.process_item(&ctx, item * item_blocks, item_data);
            tracker.complete(item_stats.total_blocks);
            stats = stats + item_stats;
        }
        stats
    };

    info!(
        total_blocks = stats.total_blocks,
        rewritten_blocks = stats.rewritten_blocks,
        zero_weight_blocks = stats.zero_weight_blocks,
        lambda = settings.lambda,
        passes = settings.num_passes,
        "lz rdo optimization finished"
    );
    Ok(stats)
}

/// Read-only state shared by every worker.
struct RdoContext<'a, C: BlockCodec + ?Sized> {
    codec: &'a C,
    settings: &'a LzRdoSettings,
    image: Image<'a>,
    weights: &'a PerTexelWeights,
    restricted: Option<&'a [u8]>,
    lambda: f32,
    decode_config: DecodeConfig,
    channel_weight: Vfloat4,
    block_counts: [usize; 3],
}

impl<C: BlockCodec + ?Sized> RdoContext<'_, C> {
    /// Texel coordinates of the first texel of a block.
    fn block_origin(&self, block_index: usize) -> [u32; 3] {
        let bsd = self.codec.block_size_descriptor();
        let [blocks_x, blocks_y, _] = self.block_counts;
        let x = block_index % blocks_x;
        let y = (block_index / blocks_x) % blocks_y;
        let z = block_index / (blocks_x * blocks_y);
        [
            (x * bsd.xdim as usize) as u32,
            (y * bsd.ydim as usize) as u32,
            (z * bsd.zdim as usize) as u32,
        ]
    }
}

/// Running best encoding of the block being optimized.
#[derive(Debug, Clone, Copy)]
struct BestBlock {
    block: PhysicalBlock,
    rd_cost: f32,
}

impl BestBlock {
    #[inline(always)]
    fn offer(&mut self, block: PhysicalBlock, rd_cost: f32) {
        if rd_cost < self.rd_cost {
            self.block = block;
            self.rd_cost = rd_cost;
        }
    }
}

/// Outcome of the search for one block.
#[derive(Debug, Clone, Copy)]
struct BlockChoice {
    /// Cost of the encoding the block had before the search.
    current_rd: f32,
    /// Cost of the encoding written back.
    chosen_rd: f32,
    replaced: bool,
}

/// Per-thread optimizer state.
struct RdoWorker<'a, C: BlockCodec + ?Sized> {
    err_calc: BlockErrorCalculator<'a, C>,
    mtf_weights: MtfList<PhysicalBlock>,
    mtf_endpoints: MtfList<PhysicalBlock>,
    mtf_simple_endpoints: EndpointSubstMtf,
    histogram: ModeByteHistogram,
    blk: ImageBlock,
    ei: Box<EndpointsAndWeights>,
    baseline: Vec<u8>,
}

impl<'a, C: BlockCodec + ?Sized> RdoWorker<'a, C> {
    fn new(ctx: &RdoContext<'a, C>) -> Result<Self, AllocateError> {
        let settings = ctx.settings;
        let texel_count = ctx.codec.block_size_descriptor().texel_count;
        Ok(Self {
            err_calc: BlockErrorCalculator::new(
                ctx.codec,
                ctx.decode_config,
                settings.decode_cache_entries,
            )?,
            mtf_weights: MtfList::new(settings.weight_history_size),
            mtf_endpoints: MtfList::new(settings.endpoint_history_size * 2),
            mtf_simple_endpoints: EndpointSubstMtf::new(settings.endpoint_history_size),
            histogram: ModeByteHistogram::new(settings.histogram_decay_period),
            blk: ImageBlock::new(texel_count, ctx.channel_weight),
            ei: Box::default(),
            baseline: Vec::with_capacity(settings.max_blocks_per_item * BLOCK_BYTES),
        })
    }

    /// Optimizes the blocks of one work item, starting at global block `block_start`.
    fn process_item(
        &mut self,
        ctx: &RdoContext<'a, C>,
        block_start: usize,
        blocks: &mut [u8],
    ) -> LzRdoStats {
        let mut baseline = core::mem::take(&mut self.baseline);
        baseline.clear();
        baseline.extend_from_slice(blocks);

        // Work starts from the restricted encodings; both references stay available.
        let restricted = match ctx.restricted {
            Some(restricted) => {
                let restricted = &restricted[block_start * BLOCK_BYTES..][..blocks.len()];
                blocks.copy_from_slice(restricted);
                restricted
            }
            None => &baseline[..],
        };
        let references = [restricted, &baseline[..]];

        for pass in 0..ctx.settings.num_passes {
            self.run_pass(ctx, block_start, blocks, references, pass);
        }

        let bsd = ctx.codec.block_size_descriptor();
        let mut stats = LzRdoStats {
            total_blocks: blocks.len() / BLOCK_BYTES,
            ..LzRdoStats::default()
        };
        for (block, original) in blocks
            .chunks_exact(BLOCK_BYTES)
            .zip(baseline.chunks_exact(BLOCK_BYTES))
        {
            stats.rewritten_blocks += (block != original) as usize;
            stats.zero_weight_blocks += (bsd.weight_bits(PhysicalBlock::read(block)) == 0) as usize;
        }

        debug!(
            block_start,
            blocks = stats.total_blocks,
            rewritten = stats.rewritten_blocks,
            cache_hits = self.err_calc.cache().hits(),
            cache_misses = self.err_calc.cache().misses(),
            "work item done"
        );

        self.baseline = baseline;
        stats
    }

    fn run_pass(
        &mut self,
        ctx: &RdoContext<'a, C>,
        block_start: usize,
        blocks: &mut [u8],
        references: [&[u8]; 2],
        pass: u32,
    ) {
        let block_count = blocks.len() / BLOCK_BYTES;
        let forward = pass & 1 == 0;

        self.mtf_weights.reset();
        self.mtf_endpoints.reset();
        self.mtf_simple_endpoints.reset();
        self.histogram.reset();
        self.seed(ctx, block_start, blocks, references, pass);

        let mut replaced = 0usize;
        for step in 0..block_count {
            let local = if forward { step } else { block_count - 1 - step };
            replaced += self
                .optimize_block(ctx, block_start + local, local, blocks, references)
                .is_some_and(|choice| choice.replaced) as usize;
        }

        debug!(block_start, pass, forward, replaced, "pass done");
    }

    /// Primes the statistics with a deterministic sample of the item's blocks.
    ///
    /// The first pass samples the two references, later passes the current encodings.
    fn seed(
        &mut self,
        ctx: &RdoContext<'a, C>,
        block_start: usize,
        blocks: &[u8],
        references: [&[u8]; 2],
        pass: u32,
    ) {
        let block_count = blocks.len() / BLOCK_BYTES;
        let samples = block_count.min(ctx.settings.max_seed_samples);
        let mut rng_state = (block_start as u32)
            .wrapping_mul(3677199193)
            .wrapping_add(pass.wrapping_mul(7))
            .wrapping_add(23857527)
            | 1;

        for i in 0..samples {
            let draw = xorshift32(&mut rng_state);
            let index = if samples == block_count {
                i
            } else {
                draw as usize % block_count
            };

            let source = if pass == 0 {
                references[((draw >> 31) & 1) as usize]
            } else {
                blocks
            };
            self.record(ctx, PhysicalBlock::read(&source[index * BLOCK_BYTES..]));
        }
    }

    /// Feeds an emitted block into the MTF lists and histogram.
    fn record(&mut self, ctx: &RdoContext<'a, C>, block: PhysicalBlock) {
        let bsd = ctx.codec.block_size_descriptor();
        let weights_mask = PhysicalBlock::top_bits_mask(bsd.weight_bits(block));

        self.mtf_weights.encode(block, weights_mask);
        self.mtf_endpoints.encode(block, !weights_mask);
        self.histogram.update(block);

        if is_simple_block(block, bsd) {
            let scb = ctx.codec.physical_to_symbolic(block);
            if let Some(endpoints) = CompactSimpleEndpoints::from_symbolic(&scb) {
                let (codec, profile) = (ctx.codec, ctx.settings.profile);
                self.mtf_simple_endpoints
                    .encode(endpoints, |e| e.normalized_axis(codec, profile));
            }
        }
    }

    /// Endpoint and weight MTF positions of `block`.
    #[inline]
    fn positions(&self, block: PhysicalBlock, weight_bits: u32) -> (Option<usize>, Option<usize>) {
        let weights_mask = PhysicalBlock::top_bits_mask(weight_bits);
        (
            self.mtf_endpoints.search(block, !weights_mask),
            self.mtf_weights.search(block, weights_mask),
        )
    }

    #[inline]
    fn rate(
        &self,
        ctx: &RdoContext<'a, C>,
        endpoint_pos: Option<usize>,
        weight_pos: Option<usize>,
        block: PhysicalBlock,
        weight_bits: u32,
    ) -> f32 {
        ctx.settings.bit_cost.calculate_bit_cost_simple(
            endpoint_pos,
            weight_pos,
            block,
            weight_bits,
            &self.histogram,
        )
    }

    /// Picks the encoding of one block and writes it back.
    ///
    /// Returns `None` for blocks without weight bits, which are never searched.
    fn optimize_block(
        &mut self,
        ctx: &RdoContext<'a, C>,
        block_index: usize,
        local: usize,
        blocks: &mut [u8],
        references: [&[u8]; 2],
    ) -> Option<BlockChoice> {
        let bsd = ctx.codec.block_size_descriptor();
        let lambda = ctx.lambda;
        let offset = local * BLOCK_BYTES;

        let current = PhysicalBlock::read(&blocks[offset..]);
        let current_weight_bits = bsd.weight_bits(current);

        // Constant and invalid blocks stay as they are but still shape the statistics.
        if unlikely(current_weight_bits == 0) {
            self.mtf_weights.encode(current, PhysicalBlock::ZERO);
            self.mtf_endpoints.encode(current, !PhysicalBlock::ZERO);
            self.histogram.update(current);
            return None;
        }

        load_image_block(
            &ctx.image,
            &mut self.blk,
            bsd,
            ctx.block_origin(block_index),
            &ctx.settings.swizzle,
        );
        let texel_weights = ctx.weights.block(block_index);
        self.err_calc.set_current_block(&self.blk, texel_weights);

        let mut candidates = CandidateList::new();

        let original_err = self.err_calc.eval(current);
        let (endpoint_pos, weight_pos) = self.positions(current, current_weight_bits);
        let original_rate = self.rate(ctx, endpoint_pos, weight_pos, current, current_weight_bits);
        let current_rd = original_err + lambda * original_rate;
        let mut best = BestBlock {
            block: current,
            rd_cost: current_rd,
        };
        candidates.add(current, best.rd_cost, endpoint_pos, current_weight_bits);

        // The restricted and baseline encodings.
        let mut restricted_err = UNSCORED_ERROR;
        for (which, reference) in references.iter().enumerate() {
            let other = PhysicalBlock::read(&reference[offset..]);
            let other_weight_bits = bsd.weight_bits(other);
            let (endpoint_pos, weight_pos) = self.positions(other, other_weight_bits);

            let other_err = self.err_calc.eval(other);
            if which == 0 {
                restricted_err = other_err;
            }

            let rd_cost = other_err
                + lambda * self.rate(ctx, endpoint_pos, weight_pos, other, other_weight_bits);
            best.offer(other, rd_cost);
            candidates.add(other, rd_cost, endpoint_pos, other_weight_bits);
        }

        let restricted_ref = PhysicalBlock::read(&references[0][offset..]);
        if is_simple_block(restricted_ref, bsd) {
            self.try_endpoint_substitution(
                ctx,
                restricted_ref,
                restricted_err,
                texel_weights,
                &mut best,
                &mut candidates,
            );
        }

        // Recombine candidate endpoints with recently seen weights of the same size.
        for (k, &weights_block) in self.mtf_weights.entries().iter().enumerate() {
            let weight_bits = bsd.weight_bits(weights_block);
            if weight_bits == 0 {
                continue;
            }

            let weights_mask = PhysicalBlock::top_bits_mask(weight_bits);
            let weights_only = weights_block & weights_mask;

            for endpoints in candidates.as_slice() {
                if endpoints.weight_bits != weight_bits {
                    continue;
                }

                let combined = weights_only | (endpoints.block & !weights_mask);
                let err = self.err_calc.eval(combined);
                let bit_cost = ctx.settings.bit_cost.calculate_bit_cost_simple(
                    endpoints.mtf_position,
                    Some(k),
                    combined,
                    weight_bits,
                    &self.histogram,
                );
                best.offer(combined, err + lambda * bit_cost);
            }
        }

        best.block.write(&mut blocks[offset..]);
        self.record(ctx, best.block);

        let replaced = best.block != current;
        if replaced {
            trace!(
                block_index,
                original_err,
                rd_cost = best.rd_cost,
                "block replaced"
            );
        }
        Some(BlockChoice {
            current_rd,
            chosen_rd: best.rd_cost,
            replaced,
        })
    }

    /// Tries recently used simple endpoints with weights fitted to the current block.
    ///
    /// Entries whose color axis is far from the restricted encoding's are skipped unless their
    /// estimated error, `(2 - |axis . target|) * restricted_err`, is within the substitution
    /// slack of the best substitution so far.
    fn try_endpoint_substitution(
        &mut self,
        ctx: &RdoContext<'a, C>,
        restricted_ref: PhysicalBlock,
        restricted_err: f32,
        texel_weights: &[f32],
        best: &mut BestBlock,
        candidates: &mut CandidateList,
    ) {
        let codec = ctx.codec;
        let bsd = codec.block_size_descriptor();
        let profile = ctx.settings.profile;

        let Some(target) = CompactSimpleEndpoints::from_symbolic(&codec.physical_to_symbolic(restricted_ref))
        else {
            return;
        };
        let target_axis = target.normalized_axis(codec, profile);
        let mut best_subst_err = UNSCORED_ERROR;

        for entry in self.mtf_simple_endpoints.entries() {
            let estimate = (2.0 - entry.normalized_axis.dot(target_axis).abs()) * restricted_err;
            if estimate >= best_subst_err * ctx.settings.substitution_slack {
                continue;
            }

            let Some(scb) = fit_known_endpoints(codec, profile, &self.blk, &entry.endpoints, &mut self.ei)
            else {
                continue;
            };

            let err = codec.compute_symbolic_block_difference_1plane_1partition_weighted(
                &ctx.decode_config,
                &scb,
                &self.blk,
                texel_weights,
            );
            if candidates.quick_reject(err) {
                continue;
            }
            best_subst_err = best_subst_err.min(err);

            let candidate = codec.symbolic_to_physical(&scb);
            let weight_bits = bsd.weight_bits(candidate);
            let weights_mask = PhysicalBlock::top_bits_mask(weight_bits);

            // Endpoints pushed out of the MTF list by other blocks can't be matched.
            let Some(endpoint_pos) = self.mtf_endpoints.search(candidate, !weights_mask) else {
                continue;
            };
            let weight_pos = self.mtf_weights.search(candidate, weights_mask);

            let rd_cost = err
                + ctx.lambda
                    * ctx.settings.bit_cost.calculate_bit_cost_simple(
                        Some(endpoint_pos),
                        weight_pos,
                        candidate,
                        weight_bits,
                        &self.histogram,
                    );
            best.offer(candidate, rd_cost);
            candidates.add(candidate, rd_cost, Some(endpoint_pos), weight_bits);
        }
    }
}

#[inline(always)]
fn xorshift32(state: &mut u32) -> u32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    *state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_prelude::*;

    fn gradient_image(dim_x: u32, dim_y: u32) -> Vec<u8> {
        let mut data = Vec::new();
        for y in 0..dim_y {
            for x in 0..dim_x {
                let r = (x * 255 / (dim_x - 1)) as u8;
                let g = (y * 255 / (dim_y - 1)) as u8;
                data.extend_from_slice(&[r, g, (r / 2).wrapping_add(g / 2), 255]);
            }
        }
        data
    }

    fn encode(codec: &ReferenceCodec, image: &Image, restricted: bool) -> Vec<u8> {
        let config = LzRdoSettings::default().decode_config();
        let encoder = if restricted {
            ReferenceEncoder::restricted(codec, config)
        } else {
            ReferenceEncoder::new(codec, config)
        };
        encoder.encode_image(image, &Swizzle::default())
    }

    /// Gradient with a noisy lower half.
    fn mixed_image(dim_x: u32, dim_y: u32) -> Vec<u8> {
        let mut state = 0x2545F491u32;
        let mut data = gradient_image(dim_x, dim_y);
        for texel in data.chunks_exact_mut(4).skip((dim_x * dim_y / 2) as usize) {
            let noise = xorshift32(&mut state).to_le_bytes();
            texel[..3].copy_from_slice(&noise[..3]);
        }
        data
    }

    fn context<'a>(
        codec: &'a ReferenceCodec,
        settings: &'a LzRdoSettings,
        image: Image<'a>,
        weights: &'a PerTexelWeights,
        restricted: Option<&'a [u8]>,
    ) -> RdoContext<'a, ReferenceCodec> {
        let bsd = codec.block_size_descriptor();
        let [r, g, b, a] = settings.normalized_channel_weights();
        RdoContext {
            codec,
            settings,
            image,
            weights,
            restricted,
            lambda: settings.effective_lambda(bsd.texel_count),
            decode_config: settings.decode_config(),
            channel_weight: Vfloat4::new(r, g, b, a),
            block_counts: image.block_counts(bsd),
        }
    }

    #[rstest]
    #[case::blocks_4x4(4, 0.5)]
    #[case::blocks_6x6(6, 4.0)]
    #[case::blocks_8x8(8, 20.0)]
    fn chosen_block_never_costs_more_than_current(#[case] dim: u8, #[case] lambda: f32) {
        let codec = ReferenceCodec::new(dim, dim);
        let data = mixed_image(48, 48);
        let image = Image::new(48, 48, 1, &data).unwrap();
        let settings = LzRdoSettings {
            lambda,
            ..Default::default()
        };
        let bsd = codec.block_size_descriptor();
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let baseline = encode(&codec, &image, false);
        let restricted = encode(&codec, &image, true);
        let ctx = context(&codec, &settings, image, &weights, Some(&restricted));

        let mut worker = RdoWorker::new(&ctx).unwrap();
        let mut blocks = restricted.clone();
        let references = [&restricted[..], &baseline[..]];
        worker.seed(&ctx, 0, &blocks, references, 0);

        let mut searched = 0;
        for local in 0..blocks.len() / BLOCK_BYTES {
            let current = PhysicalBlock::read(&blocks[local * BLOCK_BYTES..]);
            let endpoints = worker.mtf_endpoints.clone();
            let weight_history = worker.mtf_weights.clone();
            let histogram = worker.histogram.clone();

            let Some(choice) = worker.optimize_block(&ctx, local, local, &mut blocks, references)
            else {
                assert_eq!(bsd.weight_bits(current), 0);
                continue;
            };
            searched += 1;
            assert!(
                choice.chosen_rd <= choice.current_rd,
                "block {local}: {} > {}",
                choice.chosen_rd,
                choice.current_rd
            );

            // The current encoding was priced against the statistics before the block.
            let chosen = PhysicalBlock::read(&blocks[local * BLOCK_BYTES..]);
            assert_eq!(choice.replaced, chosen != current);
            let after = (
                core::mem::replace(&mut worker.mtf_endpoints, endpoints),
                core::mem::replace(&mut worker.mtf_weights, weight_history),
                core::mem::replace(&mut worker.histogram, histogram),
            );
            let weight_bits = bsd.weight_bits(current);
            let (endpoint_pos, weight_pos) = worker.positions(current, weight_bits);
            let current_rd = worker.err_calc.eval(current)
                + ctx.lambda * worker.rate(&ctx, endpoint_pos, weight_pos, current, weight_bits);
            assert!((current_rd - choice.current_rd).abs() <= current_rd.abs() * 1e-5 + 1e-3);
            (worker.mtf_endpoints, worker.mtf_weights, worker.histogram) = after;
        }
        assert!(searched > 0);
    }

    #[test]
    fn xorshift_matches_reference_sequence() {
        let mut state = 1u32;
        assert_eq!(xorshift32(&mut state), 270369);
        assert_eq!(xorshift32(&mut state), 67634689);
    }

    #[test]
    fn block_origin_walks_x_then_y() {
        let codec = ReferenceCodec::new(4, 4);
        let data = vec![0u8; 12 * 8 * 4];
        let image = Image::new(12, 8, 1, &data).unwrap();
        let settings = LzRdoSettings::default();
        let weights = compute_per_texel_weights(codec.block_size_descriptor(), &image, &settings).unwrap();
        let ctx = RdoContext {
            codec: &codec,
            settings: &settings,
            image,
            weights: &weights,
            restricted: None,
            lambda: 0.0,
            decode_config: settings.decode_config(),
            channel_weight: Vfloat4::splat(1.0),
            block_counts: image.block_counts(codec.block_size_descriptor()),
        };

        assert_eq!(ctx.block_origin(0), [0, 0, 0]);
        assert_eq!(ctx.block_origin(2), [8, 0, 0]);
        assert_eq!(ctx.block_origin(4), [4, 4, 0]);
    }

    #[rstest]
    #[case::not_whole_blocks(15, LzRdoError::InvalidLength(15))]
    #[case::too_few_blocks(16, LzRdoError::BlockCountMismatch { expected: 4, actual: 1 })]
    fn rejects_bad_block_buffers(#[case] len: usize, #[case] expected: LzRdoError) {
        let codec = ReferenceCodec::new(4, 4);
        let data = gradient_image(8, 8);
        let image = Image::new(8, 8, 1, &data).unwrap();
        let settings = LzRdoSettings::default();
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();

        let mut blocks = vec![0u8; len];
        let result = lz_rdo_optimize(&codec, &settings, &image, &weights, &mut blocks, None, None);
        assert_eq!(result, Err(expected));
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let codec = ReferenceCodec::new(4, 4);
        let data = gradient_image(8, 8);
        let image = Image::new(8, 8, 1, &data).unwrap();
        let settings = LzRdoSettings::default();
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let mut blocks = encode(&codec, &image, false);

        let short = vec![0u8; 32];
        assert_eq!(
            lz_rdo_optimize(&codec, &settings, &image, &weights, &mut blocks, Some(&short), None),
            Err(LzRdoError::RestrictedLengthMismatch {
                expected: 64,
                actual: 32
            })
        );

        let other_codec = ReferenceCodec::new(8, 8);
        let other_weights = lz_rdo_setup(&other_codec, &settings, &image).unwrap();
        assert_eq!(
            lz_rdo_optimize(&codec, &settings, &image, &other_weights, &mut blocks, None, None),
            Err(LzRdoError::WeightsMismatch {
                expected: 64,
                actual: 64
            })
        );

        let bad_settings = LzRdoSettings {
            lambda: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            lz_rdo_optimize(&codec, &bad_settings, &image, &weights, &mut blocks, None, None),
            Err(LzRdoError::Settings(_))
        ));
    }

    #[test]
    fn zero_weight_blocks_pass_through() {
        let codec = ReferenceCodec::new(4, 4);
        let data = [40u8, 80, 120, 255].repeat(8 * 8);
        let image = Image::new(8, 8, 1, &data).unwrap();
        let settings = LzRdoSettings::default();
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let baseline = encode(&codec, &image, false);

        let mut blocks = baseline.clone();
        let stats = lz_rdo_optimize(&codec, &settings, &image, &weights, &mut blocks, None, None).unwrap();

        assert_eq!(blocks, baseline);
        assert_eq!(
            stats,
            LzRdoStats {
                total_blocks: 4,
                rewritten_blocks: 0,
                zero_weight_blocks: 4,
            }
        );
    }

    #[test]
    fn output_is_deterministic() {
        let codec = ReferenceCodec::new(4, 4);
        let data = gradient_image(32, 24);
        let image = Image::new(32, 24, 1, &data).unwrap();
        let settings = LzRdoSettings {
            max_blocks_per_item: 16,
            ..Default::default()
        };
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let baseline = encode(&codec, &image, false);
        let restricted = encode(&codec, &image, true);

        let run = || {
            let mut blocks = baseline.clone();
            lz_rdo_optimize(&codec, &settings, &image, &weights, &mut blocks, Some(&restricted), None)
                .unwrap();
            blocks
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn progress_reaches_one_hundred() {
        let codec = ReferenceCodec::new(4, 4);
        let data = gradient_image(16, 16);
        let image = Image::new(16, 16, 1, &data).unwrap();
        let settings = LzRdoSettings {
            max_blocks_per_item: 4,
            ..Default::default()
        };
        let weights = lz_rdo_setup(&codec, &settings, &image).unwrap();
        let mut blocks = encode(&codec, &image, false);

        let last = std::sync::Mutex::new(0.0f32);
        let callback = |percent: f32| {
            let mut last = last.lock().unwrap();
            *last = last.max(percent);
        };
        lz_rdo_optimize(&codec, &settings, &image, &weights, &mut blocks, None, Some(&callback)).unwrap();
        assert_eq!(*last.lock().unwrap(), 100.0);
    }
}
