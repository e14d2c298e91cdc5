//! Errors raised while building a search space.

use dotspace_kernels::DescriptorError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchSpaceError {
    #[error("invalid dot workload")]
    InvalidWorkload(#[source] DescriptorError),

    #[error("invalid device description")]
    InvalidDevice(#[source] DescriptorError),
}
