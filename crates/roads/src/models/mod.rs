//! Road data models, configuration, and the index trait.

pub mod config;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use config::{NetworkConfig, SegmentPairing};
pub use traits::{Candidate, SpatialIndex};
pub use types::{Result, Road, RoadError, RoadInfo, UNKNOWN_ROAD_NAME};
