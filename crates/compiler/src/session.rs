//! Search session orchestration: one target device, optional persistent cache.

use anyhow::{bail, Context, Result};
use dotspace_autotune::{SearchSpaceCache, TritonDotFusionSearchSpace};
use dotspace_kernels::{DeviceDescription, DotWorkload, TritonGemmConfig};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub cache_path: Option<PathBuf>,
    pub clear_cache: bool,
}

pub struct SearchSession {
    device: DeviceDescription,
    cache: SearchSpaceCache,
    options: SessionOptions,
}

impl SearchSession {
    pub fn new(device: DeviceDescription, options: SessionOptions) -> Result<Self> {
        device
            .validate()
            .with_context(|| format!("device '{}' is not usable", device.name))?;

        let mut cache = match &options.cache_path {
            Some(path) => SearchSpaceCache::load_from_file(path)
                .with_context(|| format!("loading search space cache {}", path.display()))?,
            None => SearchSpaceCache::new(),
        };
        if options.clear_cache {
            cache.clear();
        }

        info!(
            device = %device.name,
            cores = device.core_count,
            cached_spaces = cache.len(),
            "opened search session"
        );
        Ok(Self {
            device,
            cache,
            options,
        })
    }

    pub fn device(&self) -> &DeviceDescription {
        &self.device
    }

    pub fn search_space(&self, workload: &DotWorkload) -> Result<TritonDotFusionSearchSpace> {
        Ok(TritonDotFusionSearchSpace::new(&self.device, workload)?)
    }

    pub fn generate(
        &mut self,
        workload: &DotWorkload,
        force_contracting_split: Option<NonZeroUsize>,
    ) -> Result<Vec<TritonGemmConfig>> {
        self.cache
            .get_or_generate(workload, &self.device, force_contracting_split)
    }

    /// Writes the cache back if the session was opened with a cache path.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(path) = &self.options.cache_path {
            self.cache.save_to_file(path)?;
            info!(path = %path.display(), entries = self.cache.len(), "saved search space cache");
        }
        Ok(())
    }
}

/// Resolves the target device from a JSON description or a preset name.
pub fn resolve_device(preset: &str, file: Option<&Path>) -> Result<DeviceDescription> {
    if let Some(path) = file {
        let blob = fs::read_to_string(path)
            .with_context(|| format!("reading device description {}", path.display()))?;
        let device: DeviceDescription = serde_json::from_str(&blob)?;
        return Ok(device);
    }
    match DeviceDescription::by_name(preset) {
        Some(device) => Ok(device),
        None => bail!(
            "unknown device preset '{}' (known: {})",
            preset,
            DeviceDescription::preset_names().join(", ")
        ),
    }
}
