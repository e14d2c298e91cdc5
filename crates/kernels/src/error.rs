//! Validation errors for workload and device descriptors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("{field} must be > 0")]
    ZeroField { field: &'static str },

    #[error("unsupported compute bit-width {0} (expected 1..=64)")]
    UnsupportedBitwidth(usize),

    #[error("max warps per CTA {per_cta} exceeds max resident warps per core {per_core}")]
    WarpLimits { per_cta: usize, per_core: usize },
}
