//! Workload, device and kernel configuration types for dot autotuning.

pub mod config;
pub mod device;
pub mod error;

pub use config::*;
pub use device::*;
pub use error::*;
