//! Road network with a segment index and nearest-segment queries.
//!
//! Owns the ingested road set, derives segments from it, and ranks range-query
//! candidates by exact great-circle distance.

use std::collections::HashSet;
use std::sync::Arc;

use geo::Point;
use h3o::Resolution;

use crate::identifiers::{RoadId, SegmentId};
use crate::models::config::NetworkConfig;
use crate::models::traits::{Candidate, SpatialIndex};
use crate::models::types::{Result, RoadError, Road, RoadInfo};
use crate::segments::{build_segments, Segment};
use crate::spatial::bbox::BoundingBox;
use crate::spatial::bucket::road_cell;
use crate::spatial::queries::{point_to_segment_distance, query_bbox};

/// Segments are handed to the index in chunks of this size
const INSERT_BATCH: usize = 10_000;

// ============================================================================
// Results
// ============================================================================

/// Counters from one load into the index
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub roads: usize,
    pub segments: usize,
    /// Roads with fewer than two points: stored as metadata, not indexed
    pub skipped_roads: usize,
}

/// A candidate segment with its exact distance to the query point
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentMatch {
    pub distance_m: f64,
    pub segment: Segment,
    /// Point on the segment closest to the query point
    pub closest: Point,
    pub road: RoadInfo,
}

impl SegmentMatch {
    fn measure(point: Point, candidate: Candidate) -> Self {
        let (distance_m, closest) =
            point_to_segment_distance(point, candidate.segment.start(), candidate.segment.end());
        Self {
            distance_m,
            segment: candidate.segment,
            closest,
            road: candidate.road,
        }
    }
}

/// All candidates of one query, nearest first, with the box that was searched
#[derive(Clone, Debug, PartialEq)]
pub struct NearestSegments {
    pub matches: Vec<SegmentMatch>,
    pub bbox: BoundingBox,
}

// ============================================================================
// Road Network
// ============================================================================

/// Nearest-segment lookups over a [`SpatialIndex`].
///
/// Loading and querying are separate phases: `ingest`, `rebuild` and
/// `replace_road` take `&mut self`, queries take `&self`. To refresh an index
/// that is serving queries, [`RoadNetwork::build`] a new one and swap it in.
///
/// A failed write is undone before the error is returned. If undoing fails
/// too, queries return [`RoadError::RebuildRequired`] until
/// [`RoadNetwork::rebuild`] succeeds.
pub struct RoadNetwork<I: SpatialIndex> {
    index: I,
    config: NetworkConfig,
    resolution: Resolution,
    roads: Vec<Arc<Road>>,
    next_segment_id: SegmentId,
    /// Index held rows before this network loaded anything
    adopted: bool,
    needs_rebuild: bool,
}

/// Metadata rows a write may overwrite, as they were before it
type RoadSnapshot = Vec<(RoadId, Option<RoadInfo>)>;

impl<I: SpatialIndex> RoadNetwork<I> {
    /// Wrap an index as-is. Rows already in the index stay queryable, but the
    /// network cannot re-derive them, so `rebuild` is refused; use
    /// [`RoadNetwork::build`] to start from a clean index.
    pub fn new(index: I, config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        let resolution = config.resolution()?;
        let max_id = index.max_segment_id()?;
        let adopted = max_id.is_some() || index.road_count()? > 0;

        Ok(Self {
            index,
            config,
            resolution,
            roads: Vec::new(),
            next_segment_id: max_id.map_or(SegmentId::new(0), SegmentId::next),
            adopted,
            needs_rebuild: false,
        })
    }

    /// Clear `index` and load `roads` into it
    pub fn build(
        index: I,
        roads: impl IntoIterator<Item = Road>,
        config: NetworkConfig,
    ) -> Result<(Self, IngestReport)> {
        let mut network = Self::new(index, config)?;
        network.index.reset()?;
        network.next_segment_id = SegmentId::new(0);
        network.adopted = false;
        let report = network.ingest(roads)?;
        Ok((network, report))
    }

    /// Add roads to the index.
    ///
    /// If the index rejects a write, the rows this call wrote are removed and
    /// overwritten metadata restored before the error is returned.
    pub fn ingest(&mut self, roads: impl IntoIterator<Item = Road>) -> Result<IngestReport> {
        let roads: Vec<Arc<Road>> = roads.into_iter().map(Arc::new).collect();
        let report = self.write(&roads, &[])?;
        self.roads.extend(roads);
        Ok(report)
    }

    /// Drop every row and re-derive the index from the held road set
    pub fn rebuild(&mut self) -> Result<IngestReport> {
        if self.adopted {
            return Err(RoadError::IndexNotOwned);
        }

        self.needs_rebuild = true;
        self.index.reset()?;
        self.next_segment_id = SegmentId::new(0);
        let roads = self.roads.clone();
        let report = self.load(&roads)?;
        self.needs_rebuild = false;
        Ok(report)
    }

    /// Swap one road's geometry and metadata, re-deriving only its segments.
    ///
    /// The old segments are removed only once the new ones are stored, so a
    /// failed replacement leaves the previous road in place.
    pub fn replace_road(&mut self, road: Road) -> Result<IngestReport> {
        let road = Arc::new(road);
        let report = self.write(std::slice::from_ref(&road), &[road.id])?;

        self.roads.retain(|held| held.id != road.id);
        self.roads.push(road);
        Ok(report)
    }

    /// Load `roads`, then drop the older segments of every `superseded` road.
    /// Undoes its own rows on failure.
    fn write(&mut self, roads: &[Arc<Road>], superseded: &[RoadId]) -> Result<IngestReport> {
        self.ensure_complete()?;
        let first_id = self.next_segment_id;
        let snapshot = self.snapshot(roads)?;

        let written = self.load(roads).and_then(|report| {
            for &id in superseded {
                let removed = self.index.delete_road_segments(id, first_id)?;
                tracing::debug!(road_id = %id, removed, "dropped superseded segments");
            }
            Ok(report)
        });

        written.map_err(|error| {
            tracing::warn!(%error, "index write failed, undoing partial write");
            if let Err(undo_error) = self.undo(first_id, &snapshot) {
                tracing::warn!(error = %undo_error, "could not undo partial write, rebuild required");
                self.needs_rebuild = true;
            }
            error
        })
    }

    fn snapshot(&self, roads: &[Arc<Road>]) -> Result<RoadSnapshot> {
        let mut ids: Vec<RoadId> = roads.iter().map(|road| road.id).collect();
        ids.sort_unstable();
        ids.dedup();

        if self.index.road_count()? == 0 {
            return Ok(ids.into_iter().map(|id| (id, None)).collect());
        }
        ids.into_iter()
            .map(|id| Ok((id, self.index.road(id)?)))
            .collect()
    }

    fn undo(&mut self, first_id: SegmentId, snapshot: &[(RoadId, Option<RoadInfo>)]) -> Result<()> {
        let removed = self.index.delete_segments_from(first_id)?;
        self.next_segment_id = first_id;

        let added: Vec<RoadId> = snapshot
            .iter()
            .filter(|(_, prior)| prior.is_none())
            .map(|(id, _)| *id)
            .collect();
        self.index.delete_roads(&added)?;

        let restored: Vec<RoadInfo> = snapshot.iter().filter_map(|(_, prior)| prior.clone()).collect();
        self.index.insert_roads(&restored)?;

        tracing::debug!(removed, restored = restored.len(), "undid partial write");
        Ok(())
    }

    fn load(&mut self, roads: &[Arc<Road>]) -> Result<IngestReport> {
        let infos: Vec<RoadInfo> = roads
            .iter()
            .map(|road| RoadInfo::new(road, road_cell(road, self.resolution)))
            .collect();
        self.index.insert_roads(&infos)?;

        let mut report = IngestReport {
            roads: roads.len(),
            ..Default::default()
        };
        let mut pending: Vec<Segment> = Vec::new();

        for road in roads {
            if !road.is_indexable() {
                report.skipped_roads += 1;
                tracing::debug!(
                    road_id = %road.id,
                    points = road.point_count(),
                    "road too short to form a segment"
                );
                continue;
            }

            let segments = build_segments(road, self.config.pairing, self.next_segment_id);
            self.next_segment_id = SegmentId::new(self.next_segment_id.get() + segments.len() as i64);
            pending.extend(segments);

            if pending.len() >= INSERT_BATCH {
                self.index.insert(&pending)?;
                report.segments += pending.len();
                pending.clear();
            }
        }

        if !pending.is_empty() {
            self.index.insert(&pending)?;
            report.segments += pending.len();
        }

        tracing::info!(
            roads = report.roads,
            segments = report.segments,
            skipped = report.skipped_roads,
            "loaded roads into index"
        );
        Ok(report)
    }

    fn ensure_complete(&self) -> Result<()> {
        if self.needs_rebuild {
            Err(RoadError::RebuildRequired)
        } else {
            Ok(())
        }
    }

    // ---- Queries ----

    /// Every candidate near `(lon, lat)` sorted by distance, nearest first.
    ///
    /// Equal distances keep the order the index returned them in.
    pub fn nearest_segments(&self, lon: f64, lat: f64, radius_m: f64) -> Result<NearestSegments> {
        let point = Point::new(lon, lat);
        let bbox = query_bbox(point, radius_m)?;
        self.ensure_complete()?;

        let mut matches: Vec<SegmentMatch> = self
            .candidates(&bbox)?
            .into_iter()
            .map(|candidate| SegmentMatch::measure(point, candidate))
            .collect();
        matches.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        Ok(NearestSegments { matches, bbox })
    }

    /// Closest segment to `(lon, lat)`, or `None` when nothing lies in the
    /// search box. The first of several equally close candidates wins.
    pub fn nearest_segment(&self, lon: f64, lat: f64, radius_m: f64) -> Result<Option<SegmentMatch>> {
        let point = Point::new(lon, lat);
        let bbox = query_bbox(point, radius_m)?;
        self.ensure_complete()?;

        let mut best: Option<SegmentMatch> = None;
        for candidate in self.candidates(&bbox)? {
            let candidate = SegmentMatch::measure(point, candidate);
            if best
                .as_ref()
                .map_or(true, |best| candidate.distance_m < best.distance_m)
            {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// Range query that searches both sides of the antimeridian when the box
    /// runs past it
    fn candidates(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let (main, overhang) = bbox.split_antimeridian();
        let mut candidates = self.index.range_query(&main)?;

        if let Some(overhang) = overhang {
            let seen: HashSet<SegmentId> = candidates.iter().map(|c| c.segment.id).collect();
            candidates.extend(
                self.index
                    .range_query(&overhang)?
                    .into_iter()
                    .filter(|c| !seen.contains(&c.segment.id)),
            );
        }
        Ok(candidates)
    }

    /// `maxspeed` of the nearest road within the configured default radius
    pub fn speed_limit_at(&self, lon: f64, lat: f64) -> Result<Option<Arc<str>>> {
        Ok(self
            .nearest_segment(lon, lat, self.config.default_radius_m)?
            .map(|found| found.road.maxspeed))
    }

    // ---- Lookups ----

    pub fn road(&self, id: RoadId) -> Result<Option<RoadInfo>> {
        self.ensure_complete()?;
        self.index.road(id)
    }

    /// Like [`RoadNetwork::road`], but a missing road is an error
    pub fn require_road(&self, id: RoadId) -> Result<RoadInfo> {
        self.road(id)?.ok_or(RoadError::RoadNotFound(id))
    }

    /// Roads ingested through this network
    pub fn roads(&self) -> &[Arc<Road>] {
        &self.roads
    }

    pub fn len(&self) -> usize {
        self.roads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }

    pub fn segment_count(&self) -> Result<usize> {
        self.index.segment_count()
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn into_index(self) -> I {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::SegmentPairing;
    use crate::spatial::index::MemoryIndex;
    use approx::assert_abs_diff_eq;
    use geo::LineString;

    fn memory_network(roads: Vec<Road>) -> RoadNetwork<MemoryIndex> {
        RoadNetwork::build(MemoryIndex::new(), roads, NetworkConfig::default())
            .unwrap()
            .0
    }

    /// A few streets around Alexanderplatz
    fn city_roads() -> Vec<Road> {
        vec![
            Road::new(
                100,
                "Karl-Liebknecht-Straße",
                "50",
                vec![(13.4080, 52.5200), (13.4110, 52.5220), (13.4140, 52.5240)],
            ),
            Road::new(
                200,
                "Alexanderstraße",
                "50",
                vec![(13.4150, 52.5210), (13.4170, 52.5180)],
            ),
            Road::new(
                300,
                "Rathausstraße",
                "30",
                vec![(13.4060, 52.5190), (13.4100, 52.5180), (13.4130, 52.5170)],
            ),
        ]
    }

    #[test]
    fn test_single_segment_scenario() {
        let network = memory_network(vec![Road::new(1, "Test", "50", vec![(0.0, 0.0), (0.0, 1.0)])]);
        assert_eq!(network.segment_count().unwrap(), 1);

        let found = network.nearest_segment(0.0, 0.5, 100.0).unwrap().unwrap();
        assert_abs_diff_eq!(found.distance_m, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(found.closest.x(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(found.closest.y(), 0.5, epsilon = 1e-9);
        assert_eq!(found.road.id, RoadId::new(1));
        assert_eq!(
            found.segment.bbox,
            BoundingBox { min_lon: 0.0, max_lon: 0.0, min_lat: 0.0, max_lat: 1.0 }
        );
    }

    #[test]
    fn test_far_away_query_finds_nothing() {
        let network = memory_network(city_roads());
        assert!(network.nearest_segment(-73.99, 40.75, 100.0).unwrap().is_none());

        let all = network.nearest_segments(-73.99, 40.75, 100.0).unwrap();
        assert!(all.matches.is_empty());
        assert!(all.bbox.contains(Point::new(-73.99, 40.75).0));
    }

    #[test]
    fn test_zero_radius_is_invalid() {
        let network = memory_network(city_roads());
        assert!(matches!(
            network.nearest_segment(13.41, 52.52, 0.0),
            Err(RoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            network.nearest_segments(13.41, 52.52, -1.0),
            Err(RoadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_malformed_coordinates_are_invalid() {
        let network = memory_network(city_roads());
        assert!(matches!(
            network.nearest_segment(200.0, 52.52, 50.0),
            Err(RoadError::InvalidArgument(_))
        ));
        assert!(network.nearest_segments(13.41, -95.0, 50.0).is_err());
    }

    #[test]
    fn test_nearest_is_first_of_sorted() {
        let network = memory_network(city_roads());

        for (lon, lat) in [(13.4105, 52.5205), (13.4160, 52.5195), (13.4090, 52.5186)] {
            let all = network.nearest_segments(lon, lat, 400.0).unwrap();
            assert!(!all.matches.is_empty());
            assert!(all
                .matches
                .windows(2)
                .all(|pair| pair[0].distance_m <= pair[1].distance_m));

            let nearest = network.nearest_segment(lon, lat, 400.0).unwrap();
            assert_eq!(nearest.as_ref(), all.matches.first());
        }
    }

    #[test]
    fn test_picks_closest_road() {
        let network = memory_network(city_roads());

        // a few meters off Rathausstraße's first segment
        let found = network.nearest_segment(13.4080, 52.51855, 150.0).unwrap().unwrap();
        assert_eq!(found.road.id, RoadId::new(300));
        assert_eq!(&*found.road.name, "Rathausstraße");
        assert!(found.distance_m < 10.0, "got {}", found.distance_m);
    }

    #[test]
    fn test_speed_limit_at() {
        let network = memory_network(city_roads());
        assert_eq!(network.speed_limit_at(13.4080, 52.51855).unwrap().as_deref(), Some("30"));
        assert_eq!(network.speed_limit_at(0.0, 0.0).unwrap(), None);
    }

    #[test]
    fn test_short_roads_are_counted_not_indexed() {
        let roads = vec![
            Road::new(1, "Ok", "50", vec![(0.0, 0.0), (0.001, 0.0)]),
            Road::new(2, "Single", "50", vec![(0.0, 0.0)]),
            Road::new(3, "Empty", "30", LineString::<f64>::new(vec![])),
        ];
        let (network, report) =
            RoadNetwork::build(MemoryIndex::new(), roads, NetworkConfig::default()).unwrap();

        assert_eq!(report, IngestReport { roads: 3, segments: 1, skipped_roads: 2 });
        // metadata of skipped roads is still retrievable
        assert_eq!(&*network.require_road(RoadId::new(3)).unwrap().name, "Empty");
        assert!(matches!(
            network.require_road(RoadId::new(4)),
            Err(RoadError::RoadNotFound(_))
        ));
    }

    #[test]
    fn test_wrap_around_pairing() {
        let config = NetworkConfig::default().with_pairing(SegmentPairing::WrapAround);
        let (network, report) = RoadNetwork::build(MemoryIndex::new(), city_roads(), config).unwrap();

        // one segment per point
        assert_eq!(report.segments, 8);
        assert_eq!(network.segment_count().unwrap(), 8);
    }

    #[test]
    fn test_rebuild_is_order_independent() {
        fn segment_set(network: &RoadNetwork<MemoryIndex>) -> Vec<(i64, [u64; 4])> {
            let everything = BoundingBox { min_lon: -180.0, max_lon: 180.0, min_lat: -90.0, max_lat: 90.0 };
            let mut set: Vec<(i64, [u64; 4])> = network
                .index()
                .range_query(&everything)
                .unwrap()
                .into_iter()
                .map(|c| {
                    let b = c.segment.bbox;
                    (
                        c.segment.road_id.get(),
                        [b.min_lon.to_bits(), b.max_lon.to_bits(), b.min_lat.to_bits(), b.max_lat.to_bits()],
                    )
                })
                .collect();
            set.sort_unstable();
            set
        }

        let mut forward = memory_network(city_roads());
        let mut reversed_roads = city_roads();
        reversed_roads.reverse();
        let mut backward = memory_network(reversed_roads);

        let first = segment_set(&forward);
        forward.rebuild().unwrap();
        forward.rebuild().unwrap();
        backward.rebuild().unwrap();

        assert_eq!(segment_set(&forward), first);
        assert_eq!(segment_set(&backward), first);
        assert_eq!(forward.segment_count().unwrap(), 5);
    }

    #[test]
    fn test_incremental_ingest_keeps_ids_unique() {
        let mut network = memory_network(city_roads());
        network
            .ingest(vec![Road::new(400, "Neue Str", "20", vec![(13.0, 52.0), (13.001, 52.0)])])
            .unwrap();

        let everything = BoundingBox { min_lon: -180.0, max_lon: 180.0, min_lat: -90.0, max_lat: 90.0 };
        let mut ids: Vec<i64> = network
            .index()
            .range_query(&everything)
            .unwrap()
            .iter()
            .map(|c| c.segment.id.get())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(network.len(), 4);
    }

    #[test]
    fn test_replace_road() {
        let mut network = memory_network(city_roads());

        let report = network
            .replace_road(Road::new(
                200,
                "Alexanderstraße",
                "30",
                vec![(13.4150, 52.5210), (13.4160, 52.5195), (13.4170, 52.5180)],
            ))
            .unwrap();

        assert_eq!(report.segments, 2);
        assert_eq!(network.segment_count().unwrap(), 6);
        assert_eq!(&*network.require_road(RoadId::new(200)).unwrap().maxspeed, "30");
        assert_eq!(network.roads().len(), 3);
    }

    #[test]
    fn test_roads_are_bucketed() {
        let network = memory_network(city_roads());
        let info = network.require_road(RoadId::new(100)).unwrap();
        let cell = info.cell.unwrap();
        assert_eq!(cell.resolution(), Resolution::Five);
    }

    #[test]
    fn test_equal_distances_keep_index_order() {
        // two identical roads: both candidates tie exactly
        let roads = vec![
            Road::new(1, "Twin A", "50", vec![(8.0, 50.0), (8.001, 50.0)]),
            Road::new(2, "Twin B", "70", vec![(8.0, 50.0), (8.001, 50.0)]),
        ];
        let network = memory_network(roads);

        let all = network.nearest_segments(8.0005, 50.0001, 100.0).unwrap();
        assert_eq!(all.matches.len(), 2);
        assert_eq!(all.matches[0].distance_m, all.matches[1].distance_m);

        let nearest = network.nearest_segment(8.0005, 50.0001, 100.0).unwrap().unwrap();
        assert_eq!(nearest.segment.id, all.matches[0].segment.id);
    }

    #[test]
    fn test_query_across_antimeridian() {
        let roads = vec![
            Road::new(1, "Dateline West", "40", vec![(-179.9998, -0.001), (-179.9998, 0.001)]),
            Road::new(2, "Dateline East", "60", vec![(179.9990, -0.001), (179.9990, 0.001)]),
        ];
        let network = memory_network(roads);

        let all = network.nearest_segments(179.9999, 0.0, 200.0).unwrap();
        assert!(all.bbox.max_lon > 180.0);
        let ids: Vec<RoadId> = all.matches.iter().map(|m| m.road.id).collect();
        assert_eq!(ids, vec![RoadId::new(1), RoadId::new(2)]);
        assert!((all.matches[0].distance_m - 33.4).abs() < 0.5, "got {}", all.matches[0].distance_m);

        // same answer from the other side
        let found = network.nearest_segment(-179.9999, 0.0, 200.0).unwrap().unwrap();
        assert_eq!(found.road.id, RoadId::new(1));
        assert_eq!(network.speed_limit_at(179.9999, 0.0).unwrap().as_deref(), Some("40"));
    }

    /// Index wrapper that refuses segment writes or deletes on demand
    #[derive(Default)]
    struct FlakyIndex<I> {
        inner: I,
        fail_inserts: bool,
        fail_deletes: bool,
    }

    impl<I> FlakyIndex<I> {
        fn wrap(inner: I) -> Self {
            Self { inner, fail_inserts: false, fail_deletes: false }
        }

        fn check_delete(&self) -> Result<()> {
            if self.fail_deletes {
                return Err(RoadError::InvalidData("database is locked".into()));
            }
            Ok(())
        }
    }

    impl<I: SpatialIndex> SpatialIndex for FlakyIndex<I> {
        fn reset(&mut self) -> Result<()> {
            self.inner.reset()
        }
        fn insert_roads(&mut self, roads: &[RoadInfo]) -> Result<()> {
            self.inner.insert_roads(roads)
        }
        fn insert(&mut self, segments: &[Segment]) -> Result<()> {
            if self.fail_inserts {
                return Err(RoadError::InvalidData("disk full".into()));
            }
            self.inner.insert(segments)
        }
        fn range_query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
            self.inner.range_query(bbox)
        }
        fn road(&self, id: RoadId) -> Result<Option<RoadInfo>> {
            self.inner.road(id)
        }
        fn delete_road_segments(&mut self, id: RoadId, below: SegmentId) -> Result<usize> {
            self.check_delete()?;
            self.inner.delete_road_segments(id, below)
        }
        fn delete_segments_from(&mut self, first: SegmentId) -> Result<usize> {
            self.check_delete()?;
            self.inner.delete_segments_from(first)
        }
        fn delete_roads(&mut self, ids: &[RoadId]) -> Result<()> {
            self.check_delete()?;
            self.inner.delete_roads(ids)
        }
        fn segment_count(&self) -> Result<usize> {
            self.inner.segment_count()
        }
        fn max_segment_id(&self) -> Result<Option<SegmentId>> {
            self.inner.max_segment_id()
        }
        fn road_count(&self) -> Result<usize> {
            self.inner.road_count()
        }
    }

    fn flaky_network() -> RoadNetwork<FlakyIndex<MemoryIndex>> {
        RoadNetwork::build(FlakyIndex::default(), city_roads(), NetworkConfig::default())
            .unwrap()
            .0
    }

    fn new_street() -> Road {
        Road::new(400, "Neue Str", "20", vec![(13.0, 52.0), (13.001, 52.0)])
    }

    #[test]
    fn test_failed_ingest_discards_partial_rows() {
        let mut network = flaky_network();

        network.index.fail_inserts = true;
        let result = network.ingest(vec![new_street()]);
        assert!(matches!(result, Err(RoadError::InvalidData(_))));
        assert_eq!(network.roads().len(), 3);

        // earlier roads keep serving, the new one left nothing behind
        assert_eq!(network.segment_count().unwrap(), 5);
        assert_eq!(network.index().road_count().unwrap(), 3);
        assert!(network.road(RoadId::new(400)).unwrap().is_none());
        assert_eq!(network.speed_limit_at(13.4080, 52.51855).unwrap().as_deref(), Some("30"));

        network.index.fail_inserts = false;
        network.ingest(vec![new_street()]).unwrap();
        assert_eq!(network.index().max_segment_id().unwrap(), Some(SegmentId::new(5)));
    }

    #[test]
    fn test_failed_replace_keeps_previous_road() {
        let mut network = flaky_network();
        let before = network.nearest_segment(13.4110, 52.5221, 100.0).unwrap().unwrap();
        assert_eq!(before.road.id, RoadId::new(100));

        network.index.fail_inserts = true;
        let result = network.replace_road(Road::new(
            100,
            "Karl-Liebknecht-Straße",
            "30",
            vec![(13.3000, 52.5000), (13.3010, 52.5000)],
        ));
        assert!(matches!(result, Err(RoadError::InvalidData(_))));

        let check = |network: &RoadNetwork<FlakyIndex<MemoryIndex>>| {
            assert_eq!(&*network.require_road(RoadId::new(100)).unwrap().maxspeed, "50");
            let found = network.nearest_segment(13.4110, 52.5221, 100.0).unwrap().unwrap();
            assert_eq!(found.road.id, RoadId::new(100));
            assert_eq!(found.segment, before.segment);
            let held = network.roads().iter().find(|r| r.id == RoadId::new(100)).unwrap();
            assert_eq!(held.point_count(), 3);
            assert_eq!(network.segment_count().unwrap(), 5);
        };
        check(&network);

        network.index.fail_inserts = false;
        network.rebuild().unwrap();
        check(&network);
    }

    #[test]
    fn test_replace_drops_old_segments_after_insert() {
        let mut network = flaky_network();
        network
            .replace_road(Road::new(200, "Alexanderstraße", "30", vec![(13.0, 52.0), (13.001, 52.0)]))
            .unwrap();

        assert!(network.nearest_segment(13.4160, 52.5195, 50.0).unwrap().is_none());
        let found = network.nearest_segment(13.0005, 52.0, 50.0).unwrap().unwrap();
        assert_eq!(found.road.id, RoadId::new(200));
        assert_eq!(found.segment.id, SegmentId::new(5));
        assert_eq!(network.segment_count().unwrap(), 5);
    }

    #[test]
    fn test_failed_ingest_on_adopted_index_keeps_rows() {
        let index = FlakyIndex::wrap(memory_network(city_roads()).into_index());
        let mut network = RoadNetwork::new(index, NetworkConfig::default()).unwrap();

        network.index.fail_inserts = true;
        assert!(network.ingest(vec![new_street()]).is_err());

        assert_eq!(network.segment_count().unwrap(), 5);
        assert_eq!(network.index().road_count().unwrap(), 3);
        assert!(network.speed_limit_at(13.4080, 52.51855).unwrap().is_some());

        // the network only knows the roads it loaded itself
        assert!(matches!(network.rebuild(), Err(RoadError::IndexNotOwned)));
        assert_eq!(network.segment_count().unwrap(), 5);
    }

    #[test]
    fn test_failed_undo_blocks_queries_until_rebuild() {
        let mut network = flaky_network();

        network.index.fail_inserts = true;
        network.index.fail_deletes = true;
        assert!(matches!(
            network.ingest(vec![new_street()]),
            Err(RoadError::InvalidData(_))
        ));

        assert!(matches!(
            network.nearest_segment(13.4080, 52.51855, 100.0),
            Err(RoadError::RebuildRequired)
        ));
        assert!(matches!(
            network.nearest_segments(13.4080, 52.51855, 100.0),
            Err(RoadError::RebuildRequired)
        ));
        assert!(matches!(
            network.speed_limit_at(13.4080, 52.51855),
            Err(RoadError::RebuildRequired)
        ));
        assert!(matches!(network.road(RoadId::new(100)), Err(RoadError::RebuildRequired)));
        assert!(matches!(
            network.ingest(vec![new_street()]),
            Err(RoadError::RebuildRequired)
        ));

        // a rebuild that fails keeps the flag
        network.index.fail_deletes = false;
        assert!(network.rebuild().is_err());
        assert!(network.speed_limit_at(13.4080, 52.51855).is_err());

        network.index.fail_inserts = false;
        network.rebuild().unwrap();
        assert_eq!(network.speed_limit_at(13.4080, 52.51855).unwrap().as_deref(), Some("30"));
        assert_eq!(network.segment_count().unwrap(), 5);
        assert!(network.road(RoadId::new(400)).unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NetworkConfig::default().with_default_radius(0.0);
        assert!(matches!(
            RoadNetwork::new(MemoryIndex::new(), config),
            Err(RoadError::InvalidArgument(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    mod sqlite_backend {
        use super::*;
        use crate::spatial::sqlite::SqliteIndex;

        fn sqlite_network(roads: Vec<Road>) -> RoadNetwork<SqliteIndex> {
            RoadNetwork::build(SqliteIndex::in_memory().unwrap(), roads, NetworkConfig::default())
                .unwrap()
                .0
        }

        #[test]
        fn test_single_segment_scenario() {
            let network =
                sqlite_network(vec![Road::new(1, "Test", "50", vec![(0.0, 0.0), (0.0, 1.0)])]);

            let found = network.nearest_segment(0.0, 0.5, 100.0).unwrap().unwrap();
            assert_abs_diff_eq!(found.distance_m, 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(found.closest.y(), 0.5, epsilon = 1e-9);
            assert_eq!(&*found.road.name, "Test");
            assert!(network.nearest_segment(10.0, 10.0, 100.0).unwrap().is_none());
        }

        #[test]
        fn test_agrees_with_memory_backend() {
            let memory = memory_network(city_roads());
            let sqlite = sqlite_network(city_roads());

            for (lon, lat) in [(13.4105, 52.5205), (13.4160, 52.5195), (13.4080, 52.51855)] {
                let a = memory.nearest_segments(lon, lat, 300.0).unwrap();
                let b = sqlite.nearest_segments(lon, lat, 300.0).unwrap();
                assert_eq!(a.matches.len(), b.matches.len());
                for (x, y) in a.matches.iter().zip(&b.matches) {
                    assert_abs_diff_eq!(x.distance_m, y.distance_m, epsilon = 1e-9);
                }
            }
        }

        #[test]
        fn test_reopened_index_continues_segment_ids() {
            let index = sqlite_network(city_roads()).into_index();
            let mut network = RoadNetwork::new(index, NetworkConfig::default()).unwrap();

            // rows loaded earlier stay queryable
            assert!(network.speed_limit_at(13.4080, 52.51855).unwrap().is_some());

            network
                .ingest(vec![Road::new(400, "Neue Str", "20", vec![(13.0, 52.0), (13.001, 52.0)])])
                .unwrap();
            assert_eq!(network.segment_count().unwrap(), 6);
            assert_eq!(network.index().max_segment_id().unwrap(), Some(SegmentId::new(5)));
            assert!(matches!(network.rebuild(), Err(RoadError::IndexNotOwned)));
        }

        #[test]
        fn test_failed_ingest_on_reopened_index_keeps_rows() {
            let index = FlakyIndex::wrap(sqlite_network(city_roads()).into_index());
            let mut network = RoadNetwork::new(index, NetworkConfig::default()).unwrap();

            network.index.fail_inserts = true;
            assert!(network.ingest(vec![new_street()]).is_err());

            assert_eq!(network.segment_count().unwrap(), 5);
            assert_eq!(network.index().road_count().unwrap(), 3);
            assert!(network.road(RoadId::new(400)).unwrap().is_none());
            assert_eq!(network.speed_limit_at(13.4080, 52.51855).unwrap().as_deref(), Some("30"));
        }

        #[test]
        fn test_failed_replace_keeps_previous_road() {
            let index = FlakyIndex::wrap(SqliteIndex::in_memory().unwrap());
            let (mut network, _) =
                RoadNetwork::build(index, city_roads(), NetworkConfig::default()).unwrap();

            network.index.fail_inserts = true;
            assert!(network
                .replace_road(Road::new(300, "Rathausstraße", "50", vec![(13.0, 52.0), (13.001, 52.0)]))
                .is_err());

            assert_eq!(&*network.require_road(RoadId::new(300)).unwrap().maxspeed, "30");
            assert_eq!(network.speed_limit_at(13.4080, 52.51855).unwrap().as_deref(), Some("30"));
            assert_eq!(network.segment_count().unwrap(), 5);
        }
    }
}
