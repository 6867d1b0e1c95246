//! SQLite backend using an R*Tree virtual table.
//!
//! ## Schema
//!
//! - `roads`: one metadata row per road (`id`, `name`, `maxspeed`, `h3`)
//! - `road_segments`: R*Tree keyed by `(min_lon, max_lon, min_lat, max_lat)`
//!   with the parent road id and full-precision endpoints as auxiliary columns
//!
//! R*Tree stores box coordinates as 32-bit floats rounded outwards, so the SQL
//! predicate can only return extra rows. Those are dropped again by re-running
//! the overlap test on the exact endpoints.

use std::path::Path;
use std::sync::Arc;

use geo::Coord;
use h3o::CellIndex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::identifiers::{RoadId, SegmentId};
use crate::models::traits::{Candidate, SpatialIndex};
use crate::models::types::{Result, RoadInfo};
use crate::segments::Segment;
use crate::spatial::bbox::BoundingBox;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS roads (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        maxspeed TEXT NOT NULL,
        h3 INTEGER
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS road_segments USING rtree(
        id,
        min_lon, max_lon,
        min_lat, max_lat,
        +road_id INTEGER,
        +start_lon REAL,
        +start_lat REAL,
        +end_lon REAL,
        +end_lat REAL
    );
"#;

const RANGE_QUERY: &str = r#"
    SELECT s.id, s.road_id, s.start_lon, s.start_lat, s.end_lon, s.end_lat,
           r.name, r.maxspeed, r.h3
    FROM road_segments s
    JOIN roads r ON s.road_id = r.id
    WHERE s.min_lon < ?1 AND s.max_lon > ?2
      AND s.min_lat < ?3 AND s.max_lat > ?4
    ORDER BY s.id
"#;

/// Segment index persisted in a SQLite database
pub struct SqliteIndex {
    conn: Connection,
}

impl SqliteIndex {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

fn cell_to_sql(cell: Option<CellIndex>) -> Option<i64> {
    cell.map(|cell| u64::from(cell) as i64)
}

fn cell_from_sql(raw: Option<i64>) -> Option<CellIndex> {
    raw.and_then(|raw| CellIndex::try_from(raw as u64).ok())
}

fn road_from_row(row: &Row<'_>) -> rusqlite::Result<RoadInfo> {
    Ok(RoadInfo {
        id: RoadId::new(row.get(0)?),
        name: Arc::from(row.get::<_, String>(1)?),
        maxspeed: Arc::from(row.get::<_, String>(2)?),
        cell: cell_from_sql(row.get(3)?),
    })
}

impl SpatialIndex for SqliteIndex {
    fn reset(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS road_segments;
             DROP TABLE IF EXISTS roads;",
        )?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn insert_roads(&mut self, roads: &[RoadInfo]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO roads (id, name, maxspeed, h3) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for road in roads {
                stmt.execute(params![
                    road.id.get(),
                    &*road.name,
                    &*road.maxspeed,
                    cell_to_sql(road.cell),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert(&mut self, segments: &[Segment]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO road_segments
                     (id, min_lon, max_lon, min_lat, max_lat,
                      road_id, start_lon, start_lat, end_lon, end_lat)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for segment in segments {
                let bbox = &segment.bbox;
                let (start, end) = (segment.line.start, segment.line.end);
                stmt.execute(params![
                    segment.id.get(),
                    bbox.min_lon,
                    bbox.max_lon,
                    bbox.min_lat,
                    bbox.max_lat,
                    segment.road_id.get(),
                    start.x,
                    start.y,
                    end.x,
                    end.y,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn range_query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let mut stmt = self.conn.prepare_cached(RANGE_QUERY)?;
        let rows = stmt.query_map(
            params![bbox.max_lon, bbox.min_lon, bbox.max_lat, bbox.min_lat],
            |row| {
                let road_id = RoadId::new(row.get(1)?);
                let start = Coord { x: row.get(2)?, y: row.get(3)? };
                let end = Coord { x: row.get(4)?, y: row.get(5)? };
                let road = RoadInfo {
                    id: road_id,
                    name: Arc::from(row.get::<_, String>(6)?),
                    maxspeed: Arc::from(row.get::<_, String>(7)?),
                    cell: cell_from_sql(row.get(8)?),
                };
                Ok(Candidate {
                    segment: Segment::new(SegmentId::new(row.get(0)?), road_id, start, end),
                    road,
                })
            },
        )?;

        let mut candidates = Vec::new();
        for candidate in rows {
            let candidate = candidate?;
            if candidate.segment.bbox.overlaps(bbox) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    fn road(&self, id: RoadId) -> Result<Option<RoadInfo>> {
        let road = self
            .conn
            .query_row(
                "SELECT id, name, maxspeed, h3 FROM roads WHERE id = ?1",
                params![id.get()],
                road_from_row,
            )
            .optional()?;
        Ok(road)
    }

    fn delete_road_segments(&mut self, id: RoadId, below: SegmentId) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM road_segments WHERE road_id = ?1 AND id < ?2",
            params![id.get(), below.get()],
        )?;
        Ok(deleted)
    }

    fn delete_segments_from(&mut self, first: SegmentId) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM road_segments WHERE id >= ?1", params![first.get()])?;
        Ok(deleted)
    }

    fn delete_roads(&mut self, ids: &[RoadId]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM roads WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id.get()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn segment_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM road_segments", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn max_segment_id(&self) -> Result<Option<SegmentId>> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(id) FROM road_segments", [], |row| row.get(0))?;
        Ok(max.map(SegmentId::new))
    }

    fn road_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM roads", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
