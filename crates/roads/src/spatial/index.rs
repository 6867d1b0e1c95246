//! In-memory R-tree backend.
//!
//! Segments are stored under their own bounding box. A range query walks the
//! tree with a selection function that descends into any node whose envelope
//! touches the query box, then keeps only leaves passing the open-interval
//! overlap test.

use std::collections::HashMap;

use rstar::{RTree, RTreeObject, SelectionFunction, AABB};

use crate::identifiers::{RoadId, SegmentId};
use crate::models::traits::{Candidate, SpatialIndex};
use crate::models::types::{Result, RoadInfo};
use crate::segments::Segment;
use crate::spatial::bbox::BoundingBox;

// ============================================================================
// Segment Spatial Node
// ============================================================================

#[derive(Clone, Debug)]
pub struct SegmentNode {
    pub segment: Segment,
    aabb: AABB<[f64; 2]>,
}

impl SegmentNode {
    pub fn new(segment: Segment) -> Self {
        let aabb = segment.bbox.to_aabb();
        Self { segment, aabb }
    }
}

impl RTreeObject for SegmentNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

struct OverlapSelection {
    bbox: BoundingBox,
}

impl SelectionFunction<SegmentNode> for OverlapSelection {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        BoundingBox::from_aabb(envelope).touches(&self.bbox)
    }

    fn should_unpack_leaf(&self, leaf: &SegmentNode) -> bool {
        leaf.segment.bbox.overlaps(&self.bbox)
    }
}

// ============================================================================
// Memory Index
// ============================================================================

/// Segment index held entirely in memory
#[derive(Default)]
pub struct MemoryIndex {
    tree: RTree<SegmentNode>,
    roads: HashMap<RoadId, RoadInfo>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the segments matching `keep`, returning how many were dropped
    fn retain(&mut self, keep: impl Fn(&Segment) -> bool) -> usize {
        let before = self.tree.size();
        let kept: Vec<SegmentNode> = self
            .tree
            .iter()
            .filter(|node| keep(&node.segment))
            .cloned()
            .collect();
        self.tree = RTree::bulk_load(kept);
        before - self.tree.size()
    }
}

impl SpatialIndex for MemoryIndex {
    fn reset(&mut self) -> Result<()> {
        self.tree = RTree::new();
        self.roads.clear();
        Ok(())
    }

    fn insert_roads(&mut self, roads: &[RoadInfo]) -> Result<()> {
        self.roads
            .extend(roads.iter().map(|road| (road.id, road.clone())));
        Ok(())
    }

    fn insert(&mut self, segments: &[Segment]) -> Result<()> {
        if self.tree.size() == 0 {
            self.tree = RTree::bulk_load(segments.iter().cloned().map(SegmentNode::new).collect());
        } else {
            for segment in segments {
                self.tree.insert(SegmentNode::new(segment.clone()));
            }
        }
        Ok(())
    }

    fn range_query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let candidates = self
            .tree
            .locate_with_selection_function(OverlapSelection { bbox: *bbox })
            .filter_map(|node| match self.roads.get(&node.segment.road_id) {
                Some(road) => Some(Candidate {
                    segment: node.segment.clone(),
                    road: road.clone(),
                }),
                None => {
                    tracing::warn!(
                        road_id = %node.segment.road_id,
                        "segment without road metadata skipped"
                    );
                    None
                }
            })
            .collect();
        Ok(candidates)
    }

    fn road(&self, id: RoadId) -> Result<Option<RoadInfo>> {
        Ok(self.roads.get(&id).cloned())
    }

    fn delete_road_segments(&mut self, id: RoadId, below: SegmentId) -> Result<usize> {
        Ok(self.retain(|segment| segment.road_id != id || segment.id >= below))
    }

    fn delete_segments_from(&mut self, first: SegmentId) -> Result<usize> {
        Ok(self.retain(|segment| segment.id < first))
    }

    fn delete_roads(&mut self, ids: &[RoadId]) -> Result<()> {
        for id in ids {
            self.roads.remove(id);
        }
        Ok(())
    }

    fn segment_count(&self) -> Result<usize> {
        Ok(self.tree.size())
    }

    fn max_segment_id(&self) -> Result<Option<SegmentId>> {
        Ok(self.tree.iter().map(|node| node.segment.id).max())
    }

    fn road_count(&self) -> Result<usize> {
        Ok(self.roads.len())
    }
}
