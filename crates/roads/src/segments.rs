//! Decomposition of road polylines into indexable segments.

use geo::{Coord, Line, Point};

use crate::identifiers::{RoadId, SegmentId};
use crate::models::config::SegmentPairing;
use crate::models::types::Road;
use crate::spatial::bbox::BoundingBox;

/// Straight piece between two coordinates of one road.
///
/// Derived from a [`Road`] at ingestion time and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub road_id: RoadId,
    pub line: Line<f64>,
    pub bbox: BoundingBox,
}

impl Segment {
    pub fn new(id: SegmentId, road_id: RoadId, start: Coord<f64>, end: Coord<f64>) -> Self {
        Self {
            id,
            road_id,
            line: Line::new(start, end),
            bbox: BoundingBox::from_corners(start, end),
        }
    }

    pub fn start(&self) -> Point {
        self.line.start_point()
    }

    pub fn end(&self) -> Point {
        self.line.end_point()
    }
}

/// Endpoint pairs of a road under the given pairing policy.
///
/// Empty for roads with fewer than two points.
pub fn coordinate_pairs(
    road: &Road,
    pairing: SegmentPairing,
) -> Vec<(Coord<f64>, Coord<f64>)> {
    let coords = &road.geometry.0;
    if coords.len() < 2 {
        return Vec::new();
    }

    match pairing {
        SegmentPairing::Consecutive => coords.windows(2).map(|w| (w[0], w[1])).collect(),
        SegmentPairing::WrapAround => (0..coords.len())
            .map(|i| {
                let previous = if i == 0 { coords.len() - 1 } else { i - 1 };
                (coords[i], coords[previous])
            })
            .collect(),
    }
}

/// Split a road into segments, numbering them from `first_id` upwards.
pub fn build_segments(road: &Road, pairing: SegmentPairing, first_id: SegmentId) -> Vec<Segment> {
    let mut next_id = first_id;
    coordinate_pairs(road, pairing)
        .into_iter()
        .map(|(start, end)| {
            let segment = Segment::new(next_id, road.id, start, end);
            next_id = next_id.next();
            segment
        })
        .collect()
}
