//! Storage seam for the segment index.
//!
//! The query engine only needs bulk insert, drop/recreate and a bounding-box
//! overlap select. Implementations can be in-memory or database-backed.

use crate::identifiers::{RoadId, SegmentId};
use crate::models::types::{Result, RoadInfo};
use crate::segments::Segment;
use crate::spatial::bbox::BoundingBox;

/// Segment returned by a range query, joined with its road's metadata
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub segment: Segment,
    pub road: RoadInfo,
}

/// Bounding-box range index over road segments plus the road metadata table.
///
/// Writers and readers must not interleave: finish a load before querying.
pub trait SpatialIndex {
    /// Drop every road and segment row
    fn reset(&mut self) -> Result<()>;

    /// Store metadata rows, replacing rows with the same id
    fn insert_roads(&mut self, roads: &[RoadInfo]) -> Result<()>;

    /// Append segment rows. No deduplication; may be called repeatedly.
    fn insert(&mut self, segments: &[Segment]) -> Result<()>;

    /// Every segment whose box overlaps `bbox` under the open-interval test.
    ///
    /// A superset of the segments that matter geometrically; callers rank
    /// them with exact distance math.
    fn range_query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>>;

    fn road(&self, id: RoadId) -> Result<Option<RoadInfo>>;

    /// Remove the segments of one road whose ids are below `below`,
    /// returning how many were dropped
    fn delete_road_segments(&mut self, id: RoadId, below: SegmentId) -> Result<usize>;

    /// Remove every segment with an id of `first` or higher
    fn delete_segments_from(&mut self, first: SegmentId) -> Result<usize>;

    /// Remove metadata rows
    fn delete_roads(&mut self, ids: &[RoadId]) -> Result<()>;

    fn segment_count(&self) -> Result<usize>;

    /// Highest segment id stored, so later loads keep ids unique
    fn max_segment_id(&self) -> Result<Option<SegmentId>>;

    fn road_count(&self) -> Result<usize>;
}
