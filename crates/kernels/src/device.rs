//! Target device description.

use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};

/// Hardware limits of the GPU a search space is built for.
///
/// "Core" is a streaming multiprocessor; registers are counted in 32-bit
/// units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub name: String,
    pub core_count: usize,
    pub registers_per_core: usize,
    pub shared_memory_per_core: usize,
    pub warp_size: usize,
    pub max_warps_per_cta: usize,
    pub max_warps_per_core: usize,
}

impl DeviceDescription {
    pub fn a100() -> Self {
        Self {
            name: "a100".into(),
            core_count: 108,
            registers_per_core: 64 * 1024,
            shared_memory_per_core: 164 * 1024,
            warp_size: 32,
            max_warps_per_cta: 32,
            max_warps_per_core: 64,
        }
    }

    pub fn h100() -> Self {
        Self {
            name: "h100".into(),
            core_count: 132,
            registers_per_core: 64 * 1024,
            shared_memory_per_core: 228 * 1024,
            warp_size: 32,
            max_warps_per_cta: 32,
            max_warps_per_core: 64,
        }
    }

    pub fn rtx3090() -> Self {
        Self {
            name: "rtx3090".into(),
            core_count: 82,
            registers_per_core: 64 * 1024,
            shared_memory_per_core: 100 * 1024,
            warp_size: 32,
            max_warps_per_cta: 32,
            max_warps_per_core: 48,
        }
    }

    /// Looks up a preset by name (case-insensitive).
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a100" => Some(Self::a100()),
            "h100" => Some(Self::h100()),
            "rtx3090" | "3090" => Some(Self::rtx3090()),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["a100", "h100", "rtx3090"]
    }

    pub fn with_core_count(mut self, core_count: usize) -> Self {
        self.core_count = core_count;
        self
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let limits = [
            ("core_count", self.core_count),
            ("registers_per_core", self.registers_per_core),
            ("shared_memory_per_core", self.shared_memory_per_core),
            ("warp_size", self.warp_size),
            ("max_warps_per_cta", self.max_warps_per_cta),
            ("max_warps_per_core", self.max_warps_per_core),
        ];
        if let Some((field, _)) = limits.into_iter().find(|(_, value)| *value == 0) {
            return Err(DescriptorError::ZeroField { field });
        }
        if self.max_warps_per_cta > self.max_warps_per_core {
            return Err(DescriptorError::WarpLimits {
                per_cta: self.max_warps_per_cta,
                per_core: self.max_warps_per_core,
            });
        }
        Ok(())
    }
}
