//! Query engine over a spatial index.

pub mod road_network;

pub use road_network::{IngestReport, NearestSegments, RoadNetwork, SegmentMatch};
