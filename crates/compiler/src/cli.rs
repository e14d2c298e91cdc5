//! CLI wiring for the dot search space tools.

use crate::session::{resolve_device, SearchSession, SessionOptions};
use crate::sweep::{SweepReport, SweepSuite};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dotspace_kernels::{DataType, DotWorkload};
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dotspace", about = "Search spaces of Triton configs for GPU dots")]
pub struct Cli {
    /// Device preset (a100, h100, rtx3090).
    #[arg(long, default_value = "a100")]
    pub device: String,

    /// JSON device description; takes precedence over --device.
    #[arg(long)]
    pub device_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum DataTypeArg {
    F64,
    F32,
    F16,
    Bf16,
    F8e4m3,
    F8e5m2,
    S8,
}

impl From<DataTypeArg> for DataType {
    fn from(value: DataTypeArg) -> DataType {
        match value {
            DataTypeArg::F64 => DataType::F64,
            DataTypeArg::F32 => DataType::F32,
            DataTypeArg::F16 => DataType::F16,
            DataTypeArg::Bf16 => DataType::BF16,
            DataTypeArg::F8e4m3 => DataType::F8E4M3,
            DataTypeArg::F8e5m2 => DataType::F8E5M2,
            DataTypeArg::S8 => DataType::S8,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct WorkloadArgs {
    /// LHS parallel size (rows of the result).
    #[arg(long, default_value_t = 1024)]
    pub m: usize,
    /// RHS parallel size (columns of the result).
    #[arg(long, default_value_t = 1024)]
    pub n: usize,
    /// Contracting size.
    #[arg(long, default_value_t = 4096)]
    pub k: usize,
    #[arg(long, default_value_t = 1)]
    pub batch: usize,
    #[arg(long, value_enum, default_value = "f16")]
    pub dtype: DataTypeArg,
}

impl WorkloadArgs {
    pub fn workload(&self) -> DotWorkload {
        DotWorkload::new(self.m, self.n, self.k, self.dtype.into()).with_batch(self.batch)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the configs of the search space for one dot.
    Generate {
        #[command(flatten)]
        workload: WorkloadArgs,
        /// Restrict the search space to this split_k.
        #[arg(long)]
        force_split: Option<NonZeroUsize>,
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        clear_cache: bool,
    },
    /// Print the bounds of the search space for one dot.
    Bounds {
        #[command(flatten)]
        workload: WorkloadArgs,
    },
    /// Build search spaces for a suite of transformer dots and emit a JSON report.
    Sweep {
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        baseline: Option<PathBuf>,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let Cli {
        device,
        device_file,
        command,
    } = cli;
    let device = resolve_device(&device, device_file.as_deref())?;

    match command {
        Command::Generate {
            workload,
            force_split,
            json,
            cache,
            clear_cache,
        } => {
            let options = SessionOptions {
                cache_path: cache,
                clear_cache,
            };
            let mut session = SearchSession::new(device, options)?;
            let workload = workload.workload();
            let configs = session.generate(&workload, force_split)?;
            info!(
                device = %session.device().name,
                configs = configs.len(),
                forced_split = force_split.map(NonZeroUsize::get),
                "generated search space"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&configs)?);
            } else {
                for config in &configs {
                    println!("{}", config);
                }
            }
            session.shutdown()?;
        }
        Command::Bounds { workload } => {
            let session = SearchSession::new(device, SessionOptions::default())?;
            let space = session.search_space(&workload.workload())?;
            println!("{}", space.serialize());
        }
        Command::Sweep { output, baseline } => {
            let suite = SweepSuite::transformer_dots();
            let report = suite.run(&device)?;

            println!(
                "device={}, cases={}, generated_at={}",
                report.device,
                report.cases.len(),
                report.generated_at_unix_ms
            );
            for case in &report.cases {
                println!(
                    "- {}: configs={} tiles={} splits={} max_split_k={} fallback={}",
                    case.case,
                    case.num_configs,
                    case.distinct_tiles,
                    case.distinct_splits,
                    case.max_split_k,
                    case.low_occupancy_fallback
                );
            }

            if let Some(path) = baseline {
                if path.exists() {
                    let baseline_blob = fs::read_to_string(&path)?;
                    let baseline_report: SweepReport = serde_json::from_str(&baseline_blob)?;
                    for (name, delta) in report.diff(&baseline_report) {
                        println!(
                            "Δ {}: configs={:+} bounds_changed={}",
                            name, delta.num_configs_delta, delta.bounds_changed
                        );
                    }
                } else {
                    info!(path = %path.display(), "baseline report not found; skipping diff");
                }
            }

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&report)?;
                fs::write(path, json)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "dotspace",
            "--device",
            "h100",
            "generate",
            "--m",
            "512",
            "--dtype",
            "bf16",
            "--force-split",
            "4",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.device, "h100");
        match cli.command {
            Command::Generate {
                workload,
                force_split,
                json,
                ..
            } => {
                let workload = workload.workload();
                assert_eq!(workload.lhs_parallel_size, 512);
                assert_eq!(workload.rhs_parallel_size, 1024);
                assert_eq!(workload.compute_bitwidth, 16);
                assert_eq!(force_split, NonZeroUsize::new(4));
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_zero_forced_split_rejected() {
        let parsed = Cli::try_parse_from(["dotspace", "generate", "--force-split", "0"]);
        assert!(parsed.is_err());
    }
}
