//! Dot workload and Triton GEMM configuration structures.

use crate::error::DescriptorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest compute bit-width we know how to tile for.
pub const MAX_COMPUTE_BITWIDTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F64,
    F32,
    F16,
    BF16,
    F8E4M3,
    F8E5M2,
    S8,
}

impl DataType {
    pub fn bit_width(&self) -> usize {
        match self {
            DataType::F64 => 64,
            DataType::F32 => 32,
            DataType::F16 | DataType::BF16 => 16,
            DataType::F8E4M3 | DataType::F8E5M2 | DataType::S8 => 8,
        }
    }
}

/// Shape and precision of a dot operation, as handed over by the IR layer.
///
/// The parallel sizes are the products of the non-contracting, non-batch
/// dimensions of each operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotWorkload {
    pub contracting_size: usize,
    pub batch_size: usize,
    pub lhs_parallel_size: usize,
    pub rhs_parallel_size: usize,
    pub compute_bitwidth: usize,
}

impl DotWorkload {
    pub fn new(m: usize, n: usize, k: usize, dtype: DataType) -> Self {
        Self {
            contracting_size: k,
            batch_size: 1,
            lhs_parallel_size: m,
            rhs_parallel_size: n,
            compute_bitwidth: dtype.bit_width(),
        }
    }

    /// Uses the widest of the operand and result types as the compute width.
    pub fn from_dtypes(
        m: usize,
        n: usize,
        k: usize,
        lhs: DataType,
        rhs: DataType,
        out: DataType,
    ) -> Self {
        let widest = [lhs, rhs, out]
            .into_iter()
            .max_by_key(DataType::bit_width)
            .unwrap_or(out);
        Self::new(m, n, k, widest)
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch_size = batch;
        self
    }

    pub fn with_compute_bitwidth(mut self, bitwidth: usize) -> Self {
        self.compute_bitwidth = bitwidth;
        self
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let sizes = [
            ("contracting_size", self.contracting_size),
            ("batch_size", self.batch_size),
            ("lhs_parallel_size", self.lhs_parallel_size),
            ("rhs_parallel_size", self.rhs_parallel_size),
        ];
        if let Some((field, _)) = sizes.into_iter().find(|(_, size)| *size == 0) {
            return Err(DescriptorError::ZeroField { field });
        }
        if self.compute_bitwidth == 0 || self.compute_bitwidth > MAX_COMPUTE_BITWIDTH {
            return Err(DescriptorError::UnsupportedBitwidth(self.compute_bitwidth));
        }
        Ok(())
    }
}

/// A complete Triton GEMM kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TritonGemmConfig {
    /// Output tile rows (LHS parallel dimension).
    pub block_m: usize,
    /// Output tile columns (RHS parallel dimension).
    pub block_n: usize,
    /// Contracting dimension tile.
    pub block_k: usize,
    pub split_k: usize,
    pub num_stages: usize,
    pub num_warps: usize,
    pub num_ctas: usize,
}

impl Default for TritonGemmConfig {
    fn default() -> Self {
        Self {
            block_m: 0,
            block_n: 0,
            block_k: 0,
            split_k: 0,
            num_stages: 1,
            num_warps: 4,
            num_ctas: 1,
        }
    }
}

impl fmt::Display for TritonGemmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block_m: {} block_n: {} block_k: {} split_k: {} num_stages: {} num_warps: {} num_ctas: {}",
            self.block_m,
            self.block_n,
            self.block_k,
            self.split_k,
            self.num_stages,
            self.num_warps,
            self.num_ctas
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dtypes_uses_widest_type() {
        let workload =
            DotWorkload::from_dtypes(64, 64, 64, DataType::BF16, DataType::F8E4M3, DataType::F32);
        assert_eq!(workload.compute_bitwidth, 32);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let workload = DotWorkload::new(0, 16, 16, DataType::F16);
        assert!(matches!(
            workload.validate(),
            Err(DescriptorError::ZeroField {
                field: "lhs_parallel_size"
            })
        ));

        let workload = DotWorkload::new(16, 16, 16, DataType::F16).with_batch(0);
        assert!(workload.validate().is_err());
    }

    #[test]
    fn test_bitwidth_bounds() {
        let workload = DotWorkload::new(16, 16, 16, DataType::F16);
        assert!(workload.validate().is_ok());
        assert!(workload.with_compute_bitwidth(0).validate().is_err());
        assert!(workload.with_compute_bitwidth(128).validate().is_err());
    }

    #[test]
    fn test_config_display() {
        let config = TritonGemmConfig {
            block_m: 64,
            block_n: 32,
            block_k: 64,
            split_k: 2,
            num_stages: 3,
            num_warps: 4,
            num_ctas: 1,
        };
        assert_eq!(
            config.to_string(),
            "block_m: 64 block_n: 32 block_k: 64 split_k: 2 num_stages: 3 num_warps: 4 num_ctas: 1"
        );
    }
}
