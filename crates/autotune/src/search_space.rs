//! Search space of promising Triton configs for a dot fusion.
//!
//! Takes into account the shape of the problem (operand and result sizes,
//! compute precision) and the hardware (number of cores, registers and shared
//! memory per core, warp limits). Configs are generated in three stages:
//!
//! 1. contracting split factors (split_k) that may be needed for occupancy,
//! 2. output tilings (block_m, block_n) for every split,
//! 3. removal of configs that leave cores idle, with a single best-effort
//!    fallback when nothing would remain.

use crate::error::SearchSpaceError;
use dotspace_kernels::{DeviceDescription, DotWorkload, TritonGemmConfig};
use std::cmp::Reverse;
use std::fmt;
use std::iter::successors;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

const REGISTER_SIZE_BITS: usize = 32;
/// Share of a core's registers (as a divisor) the accumulator tile may use.
const OUTPUT_TILE_REGISTER_DIVISOR: usize = 4;
const MAX_TILE_DIM: usize = 256;
/// Triton does not support tiles smaller than 16x16.
const MIN_SUPPORTED_TILE: OutputTile = OutputTile {
    lhs_dim: 16,
    rhs_dim: 16,
};
const SCHEDULERS_PER_CORE: usize = 4;
const DESIRED_WARPS_PER_SCHEDULER: usize = 5;
const MIN_WARPS_PER_CTA: usize = 4;
/// Bits of the contracting dimension consumed by a single MMA step.
const MMA_CONTRACTING_BITS: usize = 256;
const OUTPUT_ELEMENTS_PER_THREAD: usize = 64;
const MAX_CONTRACTING_TILE: usize = 64;
const MAX_STAGES: usize = 4;

/// Tiling of the dot's output: the parallel dimensions of the LHS and RHS.
/// Batch dimensions are always tiled by a factor of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputTile {
    /// LHS tiling (aka. block_m).
    pub lhs_dim: usize,
    /// RHS tiling (aka. block_n).
    pub rhs_dim: usize,
}

impl OutputTile {
    pub fn elements(&self) -> usize {
        self.lhs_dim * self.rhs_dim
    }
}

impl fmt::Display for OutputTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.lhs_dim, self.rhs_dim)
    }
}

/// A config plus the notes we need while building the search space.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ConfigWithNotes {
    pub config: TritonGemmConfig,
    /// split_k is larger than the sensible maximum, but the config must stay.
    pub keep_large_split: bool,
    /// Not enough result tiles to occupy every core.
    pub not_enough_tiles: bool,
}

impl ConfigWithNotes {
    fn with_split(split_k: usize) -> Self {
        Self {
            config: TritonGemmConfig {
                split_k,
                ..TritonGemmConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Applies `extend_config` to every config and collects what it appends.
///
/// A rule may drop individual configs, but an empty result means the
/// generator itself is broken.
pub(crate) fn extend_configs<F>(
    configs: Vec<ConfigWithNotes>,
    mut extend_config: F,
) -> Vec<ConfigWithNotes>
where
    F: FnMut(&ConfigWithNotes, &mut Vec<ConfigWithNotes>),
{
    assert!(!configs.is_empty(), "cannot extend an empty config list");
    let mut updated_configs = Vec::new();
    for config in &configs {
        extend_config(config, &mut updated_configs);
    }
    assert!(
        !updated_configs.is_empty(),
        "extending {} configs produced no configs",
        configs.len()
    );
    updated_configs
}

/// The space of promising Triton configs for one dot on one device.
///
/// Only scalar bounds are kept; the descriptors are borrowed for
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TritonDotFusionSearchSpace {
    core_count: usize,
    warp_size: usize,
    max_warps_per_cta: usize,
    shared_memory_per_core: usize,
    contracting_size: usize,
    batch_size: usize,
    lhs_parallel_size: usize,
    rhs_parallel_size: usize,
    compute_bitwidth: usize,
    desired_total_warps: usize,
    max_out_tile: OutputTile,
    min_out_tile: OutputTile,
    min_warps_per_cta: usize,
    min_contracting_tile_size: usize,
    max_contracting_split: usize,
}

impl TritonDotFusionSearchSpace {
    pub fn new(
        device: &DeviceDescription,
        workload: &DotWorkload,
    ) -> Result<Self, SearchSpaceError> {
        workload
            .validate()
            .map_err(SearchSpaceError::InvalidWorkload)?;
        device.validate().map_err(SearchSpaceError::InvalidDevice)?;

        let mut space = Self {
            core_count: device.core_count,
            warp_size: device.warp_size,
            max_warps_per_cta: device.max_warps_per_cta,
            shared_memory_per_core: device.shared_memory_per_core,
            contracting_size: workload.contracting_size,
            batch_size: workload.batch_size,
            lhs_parallel_size: workload.lhs_parallel_size,
            rhs_parallel_size: workload.rhs_parallel_size,
            compute_bitwidth: workload.compute_bitwidth,
            desired_total_warps: 0,
            max_out_tile: MIN_SUPPORTED_TILE,
            min_out_tile: MIN_SUPPORTED_TILE,
            min_warps_per_cta: MIN_WARPS_PER_CTA.min(device.max_warps_per_cta),
            min_contracting_tile_size: power_of_two_floor(
                MMA_CONTRACTING_BITS / workload.compute_bitwidth,
            )
            .max(1),
            max_contracting_split: 1,
        };
        space.desired_total_warps = device.core_count
            * (SCHEDULERS_PER_CORE * DESIRED_WARPS_PER_SCHEDULER).min(device.max_warps_per_core);
        // min_out_tile is a hard limit, max_out_tile a soft one, so the range
        // must never be empty.
        let max_tile = space.max_output_tile(device.registers_per_core);
        space.max_out_tile = OutputTile {
            lhs_dim: max_tile.lhs_dim.max(space.min_out_tile.lhs_dim),
            rhs_dim: max_tile.rhs_dim.max(space.min_out_tile.rhs_dim),
        };
        space.max_contracting_split = space.max_contracting_split_for(space.max_out_tile);

        debug!(device = %device.name, bounds = %space, "built dot search space");
        Ok(space)
    }

    /// Generates the promising configs for the autotuner to try, in
    /// generation order. With `force_contracting_split` only configs with that
    /// split_k are produced.
    pub fn generate_configs(
        &self,
        force_contracting_split: Option<NonZeroUsize>,
    ) -> Vec<TritonGemmConfig> {
        let configs = match force_contracting_split {
            Some(split) => {
                let mut config = ConfigWithNotes::with_split(split.get());
                config.keep_large_split = split.get() > self.max_contracting_split;
                vec![config]
            }
            None => self.generate_contracting_split_factors(),
        };

        let configs = extend_configs(configs, |config, updated| {
            self.add_output_tilings(config, updated)
        });
        let configs = self.eliminate_low_occupancy_configs(configs);

        debug!(count = configs.len(), "generated dot configs");
        configs.into_iter().map(|notes| notes.config).collect()
    }

    /// Human-readable rendering of the search space bounds.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    pub fn desired_total_warps(&self) -> usize {
        self.desired_total_warps
    }

    pub fn max_out_tile(&self) -> OutputTile {
        self.max_out_tile
    }

    pub fn min_out_tile(&self) -> OutputTile {
        self.min_out_tile
    }

    pub fn min_warps_per_cta(&self) -> usize {
        self.min_warps_per_cta
    }

    pub fn max_warps_per_cta(&self) -> usize {
        self.max_warps_per_cta
    }

    pub fn min_contracting_tile_size(&self) -> usize {
        self.min_contracting_tile_size
    }

    pub fn max_contracting_split(&self) -> usize {
        self.max_contracting_split
    }

    /// Largest sensible output tile given the registers available per core.
    fn max_output_tile(&self, registers_per_core: usize) -> OutputTile {
        let max_elements_per_cta = registers_per_core * REGISTER_SIZE_BITS / self.compute_bitwidth;
        let max_out_elements = (max_elements_per_cta / OUTPUT_TILE_REGISTER_DIVISOR).max(1);
        let rhs_dim = power_of_two_floor(((max_out_elements as f64).sqrt() as usize).max(1));
        let lhs_dim = power_of_two_floor((max_out_elements / rhs_dim).max(1));
        // No point in tiles larger than the problem itself.
        OutputTile {
            lhs_dim: lhs_dim
                .min(MAX_TILE_DIM)
                .min(self.lhs_parallel_size.next_power_of_two()),
            rhs_dim: rhs_dim
                .min(MAX_TILE_DIM)
                .min(self.rhs_parallel_size.next_power_of_two()),
        }
    }

    /// Number of result tiles without splitting the contracting dimension.
    fn num_result_tiles(&self, tile: OutputTile) -> usize {
        self.batch_size
            * self.lhs_parallel_size.div_ceil(tile.lhs_dim)
            * self.rhs_parallel_size.div_ceil(tile.rhs_dim)
    }

    /// Largest split_k that still helps occupying all cores with `tile`,
    /// without making the per-split contracting dimension too small.
    fn max_contracting_split_for(&self, tile: OutputTile) -> usize {
        let desired_num_ctas = (self.desired_total_warps / self.min_warps_per_cta).max(1);
        let result_tiles = self.num_result_tiles(tile);
        let split_for_occupancy = desired_num_ctas.div_ceil(result_tiles).next_power_of_two();
        let split_for_contracting_size =
            power_of_two_floor(self.contracting_size / self.min_contracting_tile_size).max(1);
        let split = split_for_occupancy.min(split_for_contracting_size);
        trace!(
            tile = %tile,
            desired_num_ctas,
            result_tiles,
            split_for_occupancy,
            split_for_contracting_size,
            split,
            "computed max split_k"
        );
        split
    }

    /// Promising split_k values: powers of two up to the sensible maximum,
    /// plus one larger split when that is the only way to give every core a
    /// tile.
    pub(crate) fn generate_contracting_split_factors(&self) -> Vec<ConfigWithNotes> {
        assert!(self.max_contracting_split >= 1);
        let mut configs: Vec<ConfigWithNotes> = power_of_two_range(1, self.max_contracting_split)
            .map(ConfigWithNotes::with_split)
            .collect();

        if let Some(split) = self.split_for_min_occupancy() {
            trace!(split, "keeping large split_k to occupy all cores");
            configs.push(ConfigWithNotes {
                keep_large_split: true,
                ..ConfigWithNotes::with_split(split)
            });
        }
        configs
    }

    fn split_for_min_occupancy(&self) -> Option<usize> {
        let tiles = self.num_result_tiles(self.min_out_tile);
        if tiles.saturating_mul(self.max_contracting_split) >= self.core_count {
            return None;
        }
        let split = self
            .core_count
            .div_ceil(tiles)
            .next_power_of_two()
            .min(power_of_two_floor(self.contracting_size));
        // A split capped by the contracting size may still leave cores idle.
        (split > self.max_contracting_split
            && tiles.saturating_mul(split) >= self.core_count)
            .then_some(split)
    }

    /// Appends every promising (block_m, block_n) for the split_k already
    /// chosen in `config`.
    pub(crate) fn add_output_tilings(
        &self,
        config: &ConfigWithNotes,
        updated_configs: &mut Vec<ConfigWithNotes>,
    ) {
        let split = config.config.split_k;
        assert!(split > 0, "need config with contracting split already set");
        let block_k = self.contracting_tile_size(split);

        for lhs_dim in power_of_two_range(self.min_out_tile.lhs_dim, self.max_out_tile.lhs_dim) {
            for rhs_dim in power_of_two_range(self.min_out_tile.rhs_dim, self.max_out_tile.rhs_dim) {
                let tile = OutputTile { lhs_dim, rhs_dim };
                // Checking the combination is simpler than deriving tile
                // limits from split_k.
                let max_split = self.max_contracting_split_for(tile);
                if split > max_split && !config.keep_large_split {
                    trace!(tile = %tile, split, max_split, "skipping config with too large split_k");
                    continue;
                }

                let mut new_config = config.clone();
                new_config.config.block_m = lhs_dim;
                new_config.config.block_n = rhs_dim;
                new_config.config.block_k = block_k;
                new_config.config.num_warps = self.num_warps_for(tile);
                new_config.config.num_stages = self.num_stages_for(tile, block_k);
                new_config.config.num_ctas = 1;
                new_config.not_enough_tiles =
                    self.num_result_tiles(tile).saturating_mul(split) < self.core_count;
                updated_configs.push(new_config);
            }
        }
    }

    /// Removes configs marked with `not_enough_tiles`. If nothing is left,
    /// keeps the config doing the most work per launch: smallest split, then
    /// largest tile.
    pub(crate) fn eliminate_low_occupancy_configs(
        &self,
        configs: Vec<ConfigWithNotes>,
    ) -> Vec<ConfigWithNotes> {
        assert!(!configs.is_empty(), "no configs to filter");
        let (kept, dropped): (Vec<_>, Vec<_>) =
            configs.into_iter().partition(|notes| !notes.not_enough_tiles);
        for notes in &dropped {
            trace!(config = %notes.config, "skipping config with fewer tiles than cores");
        }
        if !kept.is_empty() {
            return kept;
        }

        let fallback = dropped
            .into_iter()
            .min_by_key(|notes| {
                let config = &notes.config;
                (
                    config.split_k,
                    Reverse(config.block_m * config.block_n),
                    Reverse(config.block_m),
                )
            })
            .expect("partition of a non-empty list");
        debug!(config = %fallback.config, "no config occupies all cores, keeping best-effort config");
        vec![fallback]
    }

    fn contracting_tile_size(&self, split: usize) -> usize {
        self.contracting_size
            .div_ceil(split)
            .next_power_of_two()
            .min(MAX_CONTRACTING_TILE)
            .max(self.min_contracting_tile_size)
    }

    fn num_warps_for(&self, tile: OutputTile) -> usize {
        (tile.elements() / (self.warp_size * OUTPUT_ELEMENTS_PER_THREAD))
            .next_power_of_two()
            .clamp(self.min_warps_per_cta, self.max_warps_per_cta)
    }

    fn num_stages_for(&self, tile: OutputTile, block_k: usize) -> usize {
        let bytes_per_stage =
            ((tile.lhs_dim + tile.rhs_dim) * block_k * self.compute_bitwidth / 8).max(1);
        (self.shared_memory_per_core / bytes_per_stage).clamp(1, MAX_STAGES)
    }
}

impl fmt::Display for TritonDotFusionSearchSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "problem_size_BxMxNxKxE: {}x{}x{}x{}x{} \
             tile_range_SxMxN: [1-{}]x[{}-{}]x[{}-{}] \
             desired_total_warps: {} warps_per_cta: [{}-{}]",
            self.batch_size,
            self.lhs_parallel_size,
            self.rhs_parallel_size,
            self.contracting_size,
            self.compute_bitwidth,
            self.max_contracting_split,
            self.min_out_tile.lhs_dim,
            self.max_out_tile.lhs_dim,
            self.min_out_tile.rhs_dim,
            self.max_out_tile.rhs_dim,
            self.desired_total_warps,
            self.min_warps_per_cta,
            self.max_warps_per_cta
        )
    }
}

fn power_of_two_floor(value: usize) -> usize {
    if value == 0 {
        0
    } else {
        1 << value.ilog2()
    }
}

/// Powers of two from `min` up to and including `max`.
fn power_of_two_range(min: usize, max: usize) -> impl Iterator<Item = usize> {
    successors(Some(min), |dim| dim.checked_mul(2)).take_while(move |dim| *dim <= max)
}
