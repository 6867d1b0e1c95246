//! Distance math for nearest-segment lookups.
//!
//! Projection onto a segment happens on a locally flattened earth
//! (equirectangular around the query point), which is accurate at road
//! segment scale. Reported distances are always great-circle distances.

use geo::{HaversineDestination, HaversineDistance, Point};

use crate::models::types::{Result, RoadError};
use crate::spatial::bbox::BoundingBox;

const BEARING_SOUTH_WEST: f64 = 225.0;
const BEARING_NORTH_EAST: f64 = 45.0;

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Longitude difference `to - from` folded into `[-180, 180]`
fn lon_delta(to: f64, from: f64) -> f64 {
    let delta = to - from;
    if delta > 180.0 {
        delta - 360.0
    } else if delta < -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

/// Distance in meters from `point` to the segment `start..end`, and the
/// closest point on the segment.
///
/// A segment whose endpoints coincide behaves like a single point.
pub fn point_to_segment_distance(point: Point, start: Point, end: Point) -> (f64, Point) {
    if start == end {
        return (haversine_distance(point, start), start);
    }

    // Shrink longitude by cos(lat) so both axes are in comparable units.
    let scale = point.y().to_radians().cos();
    let dx = lon_delta(end.x(), start.x()) * scale;
    let dy = end.y() - start.y();
    let px = lon_delta(point.x(), start.x()) * scale;
    let py = point.y() - start.y();

    let length_2 = dx * dx + dy * dy;
    if length_2 == 0.0 {
        return (haversine_distance(point, start), start);
    }

    let t = (px * dx + py * dy) / length_2;
    let closest = if t <= 0.0 {
        start
    } else if t >= 1.0 {
        end
    } else {
        Point::new(
            lon_delta(start.x() + t * lon_delta(end.x(), start.x()), 0.0),
            start.y() + t * (end.y() - start.y()),
        )
    };

    (haversine_distance(point, closest), closest)
}

/// Reject coordinates outside `[-180, 180]` x `[-90, 90]`
pub fn validate_point(point: Point) -> Result<()> {
    let (lon, lat) = (point.x(), point.y());
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(RoadError::InvalidArgument(format!(
            "longitude {} outside [-180, 180]",
            lon
        )));
    }
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(RoadError::InvalidArgument(format!(
            "latitude {} outside [-90, 90]",
            lat
        )));
    }
    Ok(())
}

pub fn validate_radius(radius_m: f64) -> Result<()> {
    if radius_m.is_finite() && radius_m > 0.0 {
        Ok(())
    } else {
        Err(RoadError::InvalidArgument(format!(
            "radius must be a positive number of meters, got {}",
            radius_m
        )))
    }
}

/// Search rectangle around `point`: its corners lie `radius_m` meters away
/// along the south-west and north-east bearings.
///
/// Near the antimeridian the box is not wrapped, so `min_lon` may fall below
/// -180 or `max_lon` rise above 180. [`BoundingBox::split_antimeridian`]
/// turns it into boxes an index can search.
pub fn query_bbox(point: Point, radius_m: f64) -> Result<BoundingBox> {
    validate_point(point)?;
    validate_radius(radius_m)?;

    let mut south_west = point.haversine_destination(BEARING_SOUTH_WEST, radius_m).0;
    let mut north_east = point.haversine_destination(BEARING_NORTH_EAST, radius_m).0;
    // destinations come back normalised to [-180, 180]
    south_west.x = point.x() + lon_delta(south_west.x, point.x()).min(0.0);
    north_east.x = point.x() + lon_delta(north_east.x, point.x()).max(0.0);

    Ok(BoundingBox::from_corners(south_west, north_east))
}
