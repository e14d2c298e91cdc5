//! Search-space sessions, sweeps and CLI for dot autotuning.

#[cfg(feature = "cli")]
pub mod cli;
pub mod session;
pub mod sweep;

#[cfg(feature = "cli")]
pub use cli::*;
pub use session::*;
pub use sweep::*;
