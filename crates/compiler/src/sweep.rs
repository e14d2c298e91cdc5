//! Search-space sweeps over a suite of dot workloads.
//!
//! Every case gets its own search space; cases are independent and are
//! built in parallel. The report records how each space was bounded and
//! what it produced, so two runs (or two heuristic revisions) can be
//! compared case by case.

use anyhow::Result;
use dotspace_autotune::TritonDotFusionSearchSpace;
use dotspace_kernels::{DataType, DeviceDescription, DotWorkload, TritonGemmConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepCase {
    pub name: String,
    pub workload: DotWorkload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_contracting_split: Option<NonZeroUsize>,
}

impl SweepCase {
    pub fn new(name: impl Into<String>, workload: DotWorkload) -> Self {
        Self {
            name: name.into(),
            workload,
            force_contracting_split: None,
        }
    }

    pub fn with_forced_split(mut self, split: NonZeroUsize) -> Self {
        self.force_contracting_split = Some(split);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub case: String,
    pub bounds: String,
    pub num_configs: usize,
    pub distinct_tiles: usize,
    pub distinct_splits: usize,
    pub max_split_k: usize,
    /// Set when no config occupies every core.
    pub low_occupancy_fallback: bool,
    pub configs: Vec<TritonGemmConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub device: String,
    pub generated_at_unix_ms: u128,
    pub cases: Vec<SweepResult>,
}

impl SweepReport {
    pub fn as_map(&self) -> BTreeMap<&str, &SweepResult> {
        self.cases
            .iter()
            .map(|case| (case.case.as_str(), case))
            .collect()
    }

    pub fn diff<'a>(&'a self, baseline: &'a SweepReport) -> BTreeMap<&'a str, SweepDelta<'a>> {
        let mut deltas = BTreeMap::new();
        let current = self.as_map();
        let previous = baseline.as_map();

        for (case, result) in current {
            if let Some(&baseline_result) = previous.get(case) {
                deltas.insert(
                    case,
                    SweepDelta {
                        current: result,
                        baseline: baseline_result,
                        num_configs_delta: result.num_configs as i64
                            - baseline_result.num_configs as i64,
                        bounds_changed: result.bounds != baseline_result.bounds,
                    },
                );
            }
        }

        deltas
    }
}

#[derive(Debug)]
pub struct SweepDelta<'a> {
    pub current: &'a SweepResult,
    pub baseline: &'a SweepResult,
    pub num_configs_delta: i64,
    pub bounds_changed: bool,
}

pub struct SweepSuite {
    cases: Vec<SweepCase>,
}

impl SweepSuite {
    pub fn new(cases: Vec<SweepCase>) -> Self {
        Self { cases }
    }

    /// Dots found in a transformer decoder block, from prefill-sized
    /// projections down to a single-token decode step.
    pub fn transformer_dots() -> Self {
        let cases = vec![
            SweepCase::new(
                "prefill_qkv_proj",
                DotWorkload::new(1024, 3 * 4096, 4096, DataType::BF16),
            ),
            SweepCase::new(
                "prefill_mlp_up_proj",
                DotWorkload::new(1024, 16384, 4096, DataType::BF16),
            ),
            SweepCase::new(
                "prefill_mlp_down_proj",
                DotWorkload::new(1024, 4096, 16384, DataType::BF16),
            ),
            SweepCase::new(
                "attention_scores",
                DotWorkload::new(1024, 1024, 128, DataType::BF16).with_batch(32),
            ),
            SweepCase::new(
                "decode_mlp_down_proj",
                DotWorkload::new(1, 4096, 16384, DataType::BF16),
            ),
            SweepCase::new(
                "decode_lm_head_fp32",
                DotWorkload::new(1, 32000, 4096, DataType::F32),
            ),
            SweepCase::new("tiny", DotWorkload::new(16, 16, 16, DataType::F16)),
        ];
        Self::new(cases)
    }

    pub fn cases(&self) -> &[SweepCase] {
        &self.cases
    }

    pub fn run(&self, device: &DeviceDescription) -> Result<SweepReport> {
        let cases = self
            .cases
            .par_iter()
            .map(|case| run_case(case, device))
            .collect::<Result<Vec<_>>>()?;

        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis();

        Ok(SweepReport {
            device: device.name.clone(),
            generated_at_unix_ms,
            cases,
        })
    }
}

fn run_case(case: &SweepCase, device: &DeviceDescription) -> Result<SweepResult> {
    let space = TritonDotFusionSearchSpace::new(device, &case.workload)?;
    let configs = space.generate_configs(case.force_contracting_split);

    let distinct_tiles = configs
        .iter()
        .map(|config| (config.block_m, config.block_n))
        .collect::<BTreeSet<_>>()
        .len();
    let distinct_splits = configs
        .iter()
        .map(|config| config.split_k)
        .collect::<BTreeSet<_>>()
        .len();
    let max_split_k = configs.iter().map(|config| config.split_k).max().unwrap_or(1);
    let low_occupancy_fallback = configs
        .iter()
        .any(|config| !occupies_all_cores(&case.workload, device, config));

    debug!(case = %case.name, configs = configs.len(), "swept search space");

    Ok(SweepResult {
        case: case.name.clone(),
        bounds: space.serialize(),
        num_configs: configs.len(),
        distinct_tiles,
        distinct_splits,
        max_split_k,
        low_occupancy_fallback,
        configs,
    })
}

/// Whether `config` launches at least one tile per core.
pub fn occupies_all_cores(
    workload: &DotWorkload,
    device: &DeviceDescription,
    config: &TritonGemmConfig,
) -> bool {
    let tiles = workload
        .batch_size
        .saturating_mul(workload.lhs_parallel_size.div_ceil(config.block_m))
        .saturating_mul(workload.rhs_parallel_size.div_ceil(config.block_n))
        .saturating_mul(config.split_k);
    tiles >= device.core_count
}
