//! Shared types and plumbing for the tilesense workspace: pixel rectangles,
//! tile grids, payload formats, worker configuration and process-local metrics.

pub mod concurrency;
pub use concurrency::*;
pub mod config;
pub use config::*;
pub mod metrics;
pub use metrics::*;
pub mod types;
pub use types::*;
