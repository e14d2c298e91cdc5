//! Caching of generated search spaces.

use crate::search_space::TritonDotFusionSearchSpace;
use anyhow::Result;
use dotspace_kernels::{DeviceDescription, DotWorkload, TritonGemmConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::debug;

/// Generated configs keyed by workload, device and forced split.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchSpaceCache {
    configs: BTreeMap<String, Vec<TritonGemmConfig>>,
}

impl SearchSpaceCache {
    pub fn new() -> Self {
        Self {
            configs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn clear(&mut self) {
        self.configs.clear();
    }

    pub fn get(
        &self,
        workload: &DotWorkload,
        device: &DeviceDescription,
        force_contracting_split: Option<NonZeroUsize>,
    ) -> Option<&[TritonGemmConfig]> {
        self.configs
            .get(&space_key(workload, device, force_contracting_split))
            .map(Vec::as_slice)
    }

    pub fn insert(
        &mut self,
        workload: &DotWorkload,
        device: &DeviceDescription,
        force_contracting_split: Option<NonZeroUsize>,
        configs: Vec<TritonGemmConfig>,
    ) {
        let key = space_key(workload, device, force_contracting_split);
        self.configs.insert(key, configs);
    }

    /// Returns the cached configs, building the search space on a miss.
    pub fn get_or_generate(
        &mut self,
        workload: &DotWorkload,
        device: &DeviceDescription,
        force_contracting_split: Option<NonZeroUsize>,
    ) -> Result<Vec<TritonGemmConfig>> {
        if let Some(configs) = self.get(workload, device, force_contracting_split) {
            debug!(count = configs.len(), "search space cache hit");
            return Ok(configs.to_vec());
        }

        let space = TritonDotFusionSearchSpace::new(device, workload)?;
        let configs = space.generate_configs(force_contracting_split);
        self.insert(workload, device, force_contracting_split, configs.clone());
        Ok(configs)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)?;
        let cache = serde_json::from_slice(&data)?;
        Ok(cache)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

fn space_key(
    workload: &DotWorkload,
    device: &DeviceDescription,
    force_contracting_split: Option<NonZeroUsize>,
) -> String {
    serde_json::to_string(&(workload, device, force_contracting_split))
        .unwrap_or_else(|_| "invalid-search-space".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotspace_kernels::DataType;

    #[test]
    fn test_get_or_generate_fills_cache() {
        let mut cache = SearchSpaceCache::new();
        let workload = DotWorkload::new(512, 512, 2048, DataType::F16);
        let device = DeviceDescription::a100();

        assert!(cache.get(&workload, &device, None).is_none());
        let configs = cache.get_or_generate(&workload, &device, None).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&workload, &device, None), Some(configs.as_slice()));

        // A forced split is a different search space.
        let forced = NonZeroUsize::new(2);
        assert!(cache.get(&workload, &device, forced).is_none());
    }

    #[test]
    fn test_invalid_workload_is_an_error() {
        let mut cache = SearchSpaceCache::new();
        let workload = DotWorkload::new(512, 0, 2048, DataType::F16);
        let result = cache.get_or_generate(&workload, &DeviceDescription::a100(), None);
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("search_space.json");

        let mut cache = SearchSpaceCache::new();
        let workload = DotWorkload::new(256, 1024, 512, DataType::BF16);
        let device = DeviceDescription::h100();
        let configs = cache.get_or_generate(&workload, &device, None).unwrap();
        cache.save_to_file(&path).unwrap();

        let reloaded = SearchSpaceCache::load_from_file(&path).unwrap();
        assert_eq!(reloaded.get(&workload, &device, None), Some(configs.as_slice()));
    }

    #[test]
    fn test_missing_file_gives_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SearchSpaceCache::load_from_file(&dir.path().join("absent.json")).unwrap();
        assert!(cache.is_empty());
    }
}
