//! Spatial indexing and query utilities.

pub mod bbox;
pub mod bucket;
pub mod index;
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use bbox::BoundingBox;
pub use bucket::road_cell;
pub use index::MemoryIndex;
pub use queries::{haversine_distance, point_to_segment_distance, query_bbox};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteIndex;
