//! Coarse H3 bucketing of roads.
//!
//! Each road is keyed by the cell containing its first point. The bucket is
//! stored with the road metadata for grouping and export; nearest-segment
//! lookups never consult it.

use h3o::{CellIndex, LatLng, Resolution};

use crate::models::types::Road;

/// Cell of the road's first coordinate, `None` for empty or invalid geometry
pub fn road_cell(road: &Road, resolution: Resolution) -> Option<CellIndex> {
    let first = road.first_coord()?;
    match LatLng::new(first.y, first.x) {
        Ok(latlng) => Some(latlng.to_cell(resolution)),
        Err(e) => {
            tracing::debug!(road_id = %road.id, error = %e, "no bucket for road");
            None
        }
    }
}
