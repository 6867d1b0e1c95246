//! Index construction and query defaults.

use h3o::Resolution;

use crate::models::types::{Result, RoadError};

/// How a road's coordinates are paired into segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SegmentPairing {
    /// `(g[i], g[i+1])` for every adjacent pair: `len - 1` segments.
    #[default]
    Consecutive,
    /// `(g[i], g[i-1])` with index 0 paired to the last point: `len` segments.
    ///
    /// Adds a closing segment from the last point back to the first even for
    /// open roads. Kept for databases built by older extract pipelines.
    WrapAround,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NetworkConfig {
    pub pairing: SegmentPairing,
    /// Search radius used by convenience lookups that take no radius
    pub default_radius_m: f64,
    /// H3 resolution of the per-road bucket
    pub bucket_resolution: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pairing: SegmentPairing::Consecutive,
            default_radius_m: 60.0,
            bucket_resolution: 5,
        }
    }
}

impl NetworkConfig {
    pub fn with_pairing(mut self, pairing: SegmentPairing) -> Self {
        self.pairing = pairing;
        self
    }

    pub fn with_default_radius(mut self, radius_m: f64) -> Self {
        self.default_radius_m = radius_m;
        self
    }

    pub fn with_bucket_resolution(mut self, resolution: u8) -> Self {
        self.bucket_resolution = resolution;
        self
    }

    pub fn resolution(&self) -> Result<Resolution> {
        Resolution::try_from(self.bucket_resolution).map_err(|e| {
            RoadError::InvalidArgument(format!(
                "bucket resolution {}: {}",
                self.bucket_resolution, e
            ))
        })
    }

    /// Reject settings that would make every later call fail
    pub fn validate(&self) -> Result<()> {
        if !(self.default_radius_m.is_finite() && self.default_radius_m > 0.0) {
            return Err(RoadError::InvalidArgument(format!(
                "default radius must be positive, got {}",
                self.default_radius_m
            )));
        }
        self.resolution().map(|_| ())
    }
}
