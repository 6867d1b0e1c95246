//! Axis-aligned lon/lat rectangles.

use geo::Coord;
use rstar::AABB;

/// `(min_lon, max_lon, min_lat, max_lat)` rectangle.
///
/// Always normalised: `min_lon <= max_lon` and `min_lat <= max_lat`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Componentwise min/max of two corners, in any order
    pub fn from_corners(a: Coord<f64>, b: Coord<f64>) -> Self {
        Self {
            min_lon: a.x.min(b.x),
            max_lon: a.x.max(b.x),
            min_lat: a.y.min(b.y),
            max_lat: a.y.max(b.y),
        }
    }

    /// Open-interval overlap: boxes that only share an edge do not overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
            && self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
    }

    /// Closed-interval overlap, used to decide whether a subtree may hold matches
    pub fn touches(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_lon
            && coord.x <= self.max_lon
            && coord.y >= self.min_lat
            && coord.y <= self.max_lat
    }

    /// Fold a box that runs past ±180 back into `[-180, 180]`: the part
    /// inside the range, then the overhang moved to the other side.
    pub fn split_antimeridian(&self) -> (BoundingBox, Option<BoundingBox>) {
        if self.min_lon < -180.0 {
            let west = BoundingBox { min_lon: -180.0, ..*self };
            let east = BoundingBox { min_lon: self.min_lon + 360.0, max_lon: 180.0, ..*self };
            (west, Some(east))
        } else if self.max_lon > 180.0 {
            let east = BoundingBox { max_lon: 180.0, ..*self };
            let west = BoundingBox { min_lon: -180.0, max_lon: self.max_lon - 360.0, ..*self };
            (east, Some(west))
        } else {
            (*self, None)
        }
    }

    pub fn south_west(&self) -> Coord<f64> {
        Coord { x: self.min_lon, y: self.min_lat }
    }

    pub fn north_east(&self) -> Coord<f64> {
        Coord { x: self.max_lon, y: self.max_lat }
    }

    pub fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }

    pub fn from_aabb(aabb: &AABB<[f64; 2]>) -> Self {
        let lower = aabb.lower();
        let upper = aabb.upper();
        Self {
            min_lon: lower[0],
            max_lon: upper[0],
            min_lat: lower[1],
            max_lat: upper[1],
        }
    }
}
