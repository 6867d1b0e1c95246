//! Core data types for road data.

use std::sync::Arc;

use geo::{Coord, LineString};
use h3o::CellIndex;

use crate::identifiers::*;

/// Name given to roads that carry no `name` tag
pub const UNKNOWN_ROAD_NAME: &str = "Unknown Road";

// ============================================================================
// Data Structures
// ============================================================================

/// A road polyline with its speed-limit metadata.
///
/// Geometry is ordered `(lon, lat)` coordinates. Roads are immutable once
/// ingested; a road with fewer than two points is kept for metadata lookups
/// but never produces segments.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Road {
    pub id: RoadId,
    pub name: Arc<str>,
    pub maxspeed: Arc<str>,
    pub geometry: LineString<f64>,
}

impl Road {
    pub fn new(
        id: impl Into<RoadId>,
        name: impl Into<Arc<str>>,
        maxspeed: impl Into<Arc<str>>,
        geometry: impl Into<LineString<f64>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            maxspeed: maxspeed.into(),
            geometry: geometry.into(),
        }
    }

    /// Build a road whose name may be missing in the source data
    pub fn with_optional_name(
        id: impl Into<RoadId>,
        name: Option<&str>,
        maxspeed: impl Into<Arc<str>>,
        geometry: impl Into<LineString<f64>>,
    ) -> Self {
        Self::new(id, name.unwrap_or(UNKNOWN_ROAD_NAME), maxspeed, geometry)
    }

    pub fn point_count(&self) -> usize {
        self.geometry.0.len()
    }

    /// Whether the geometry can form at least one segment
    pub fn is_indexable(&self) -> bool {
        self.point_count() >= 2
    }

    pub fn first_coord(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().copied()
    }
}

/// Road metadata row, as stored next to the segment rows.
#[derive(Clone, Debug, PartialEq)]
pub struct RoadInfo {
    pub id: RoadId,
    pub name: Arc<str>,
    pub maxspeed: Arc<str>,
    /// Coarse bucket of the road's first point
    pub cell: Option<CellIndex>,
}

impl RoadInfo {
    pub fn new(road: &Road, cell: Option<CellIndex>) -> Self {
        Self {
            id: road.id,
            name: road.name.clone(),
            maxspeed: road.maxspeed.clone(),
            cell,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Road not found: {0}")]
    RoadNotFound(RoadId),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Index is incomplete after a failed write; rebuild required")]
    RebuildRequired,

    #[error("Index holds rows this network did not load")]
    IndexNotOwned,

    #[cfg(feature = "sqlite")]
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RoadError>;
