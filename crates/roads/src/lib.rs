//! # speedmap-roads
//!
//! Nearest road segment lookup for speed-limit tagged road polylines.
//!
//! ## Features
//!
//! - **Segment index**: Roads are split into straight segments and indexed
//!   by bounding box
//! - **Exact ranking**: Candidates are ranked by great-circle distance to the
//!   closest point on each segment
//! - **Pluggable storage**: In-memory R-tree, or SQLite R*Tree (`sqlite` feature)
//! - **Coarse buckets**: Each road is tagged with an H3 cell of its first point
//!
//! ## Example
//!
//! ```
//! use speedmap_roads::prelude::*;
//!
//! let roads = vec![Road::new(
//!     1,
//!     "Unter den Linden",
//!     "50",
//!     vec![(13.3777, 52.5163), (13.3950, 52.5175)],
//! )];
//!
//! let (network, report) =
//!     RoadNetwork::build(MemoryIndex::new(), roads, NetworkConfig::default()).unwrap();
//! assert_eq!(report.segments, 1);
//!
//! let found = network.nearest_segment(13.3860, 52.5170, 60.0).unwrap().unwrap();
//! assert_eq!(&*found.road.maxspeed, "50");
//! assert!(found.distance_m < 60.0);
//! ```

pub mod identifiers;
pub mod models;
pub mod provider;
pub mod segments;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{config::*, traits::*, types::*};
    pub use crate::provider::{IngestReport, NearestSegments, RoadNetwork, SegmentMatch};
    pub use crate::segments::Segment;
    pub use crate::spatial::{BoundingBox, MemoryIndex};
    #[cfg(feature = "sqlite")]
    pub use crate::spatial::SqliteIndex;
}

pub use prelude::*;
