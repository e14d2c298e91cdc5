//! Search spaces of promising Triton GEMM configs for dot fusions.

pub mod cache;
pub mod error;
pub mod search_space;

pub use cache::*;
pub use error::*;
pub use search_space::{OutputTile, TritonDotFusionSearchSpace};
