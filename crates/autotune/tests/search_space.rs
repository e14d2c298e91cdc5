use dotspace_autotune::{SearchSpaceError, TritonDotFusionSearchSpace};
use dotspace_kernels::{DataType, DeviceDescription, DotWorkload, TritonGemmConfig};
use std::collections::HashSet;
use std::num::NonZeroUsize;

fn build(workload: DotWorkload, device: &DeviceDescription) -> TritonDotFusionSearchSpace {
    TritonDotFusionSearchSpace::new(device, &workload).expect("valid search space")
}

fn assert_within_bounds(space: &TritonDotFusionSearchSpace, configs: &[TritonGemmConfig]) {
    let (min, max) = (space.min_out_tile(), space.max_out_tile());
    for config in configs {
        assert!(
            (min.lhs_dim..=max.lhs_dim).contains(&config.block_m),
            "block_m out of range: {config}"
        );
        assert!(
            (min.rhs_dim..=max.rhs_dim).contains(&config.block_n),
            "block_n out of range: {config}"
        );
        assert!(config.num_warps <= space.max_warps_per_cta(), "too many warps: {config}");
    }
}

#[test]
fn large_square_dot_spans_tiles_and_splits() {
    let space = build(
        DotWorkload::new(1024, 1024, 4096, DataType::F16),
        &DeviceDescription::a100(),
    );
    let configs = space.generate_configs(None);

    assert!(configs.len() > 1);
    assert_within_bounds(&space, &configs);

    let tiles: HashSet<_> = configs.iter().map(|c| (c.block_m, c.block_n)).collect();
    let splits: HashSet<_> = configs.iter().map(|c| c.split_k).collect();
    assert!(tiles.len() >= 2, "expected several tile shapes, got {tiles:?}");
    assert!(splits.len() >= 2, "expected several splits, got {splits:?}");
    assert!(configs.iter().all(|c| c.num_warps <= 32));
}

#[test]
fn configs_are_unique() {
    let space = build(
        DotWorkload::new(2048, 512, 8192, DataType::BF16).with_batch(4),
        &DeviceDescription::h100(),
    );
    let configs = space.generate_configs(None);
    let unique: HashSet<_> = configs
        .iter()
        .map(|c| (c.block_m, c.block_n, c.split_k))
        .collect();
    assert_eq!(unique.len(), configs.len());
}

#[test]
fn tiny_dot_falls_back_to_single_config() {
    let space = build(
        DotWorkload::new(16, 16, 16, DataType::F16),
        &DeviceDescription::a100(),
    );
    let configs = space.generate_configs(None);

    assert_eq!(configs.len(), 1);
    let config = configs[0];
    assert_eq!((config.block_m, config.block_n, config.split_k), (16, 16, 1));
    assert_within_bounds(&space, &configs);
}

#[test]
fn forced_split_restricts_configs() {
    let space = build(
        DotWorkload::new(1024, 1024, 4096, DataType::F16),
        &DeviceDescription::a100(),
    );
    let configs = space.generate_configs(NonZeroUsize::new(4));
    assert!(!configs.is_empty());
    assert!(configs.iter().all(|c| c.split_k == 4));
    assert_within_bounds(&space, &configs);
}

#[test]
fn forced_split_beyond_maximum_keeps_all_tiles() {
    let space = build(
        DotWorkload::new(1024, 1024, 4096, DataType::F16),
        &DeviceDescription::a100(),
    );
    assert!(space.max_contracting_split() < 512);
    let configs = space.generate_configs(NonZeroUsize::new(512));
    // Every tile from 16x16 to 256x128 survives, all with the forced split.
    assert_eq!(configs.len(), 20);
    assert!(configs.iter().all(|c| c.split_k == 512));
}

#[test]
fn forced_split_on_tiny_dot_still_falls_back() {
    let space = build(
        DotWorkload::new(16, 16, 16, DataType::F16),
        &DeviceDescription::a100(),
    );
    let configs = space.generate_configs(NonZeroUsize::new(2));
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].split_k, 2);
}

#[test]
fn max_split_grows_with_core_count() {
    let workload = DotWorkload::new(512, 768, 16384, DataType::F32);
    let mut previous = 0;
    for cores in [1, 2, 8, 16, 54, 108, 132, 264, 1024, 4096] {
        let device = DeviceDescription::a100().with_core_count(cores);
        let split = build(workload, &device).max_contracting_split();
        assert!(split >= previous, "{cores} cores: {split} < {previous}");
        previous = split;
    }
}

#[test]
fn serialize_is_deterministic() {
    let space = build(
        DotWorkload::new(333, 4000, 1000, DataType::F8E4M3),
        &DeviceDescription::rtx3090(),
    );
    assert_eq!(space.serialize(), space.serialize());
    assert_eq!(space.serialize(), space.to_string());
    assert!(space.serialize().starts_with("problem_size_BxMxNxKxE: 1x333x4000x1000x8"));
}

#[test]
fn generation_is_repeatable() {
    let space = build(
        DotWorkload::new(4096, 128, 1024, DataType::F32).with_batch(8),
        &DeviceDescription::h100(),
    );
    assert_eq!(space.generate_configs(None), space.generate_configs(None));
}

#[test]
fn degenerate_inputs_rejected() {
    let device = DeviceDescription::a100();
    let result = TritonDotFusionSearchSpace::new(&device, &DotWorkload::new(0, 16, 16, DataType::F16));
    assert!(matches!(result, Err(SearchSpaceError::InvalidWorkload(_))));

    let workload = DotWorkload::new(16, 16, 16, DataType::F16);
    let result = TritonDotFusionSearchSpace::new(&device.with_core_count(0), &workload);
    let err = anyhow::Error::from(result.unwrap_err());
    // The descriptor error appears once in the chain, as the cause.
    assert_eq!(
        format!("{err:#}"),
        "invalid device description: core_count must be > 0"
    );
}
