use anyhow::{Context, Result};
use geo::Point;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use std::path::Path;

use speedmap_roads::{BoundingBox, NearestSegments, SegmentMatch};

/// Convert a query box to a closed GeoJSON ring, counter-clockwise from the
/// south-west corner
fn bbox_to_geojson(bbox: &BoundingBox) -> Value {
    let (sw, ne) = (bbox.south_west(), bbox.north_east());
    let ring = vec![
        vec![sw.x, sw.y],
        vec![ne.x, sw.y],
        vec![ne.x, ne.y],
        vec![sw.x, ne.y],
        vec![sw.x, sw.y],
    ];
    Value::Polygon(vec![ring])
}

fn line_to_geojson(from: Point, to: Point) -> Value {
    Value::LineString(vec![vec![from.x(), from.y()], vec![to.x(), to.y()]])
}

fn feature(value: Value, properties: serde_json::Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Segment feature carrying the road's metadata
fn segment_to_feature(found: &SegmentMatch, rank: usize) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("feature_type".to_string(), serde_json::json!("segment"));
    properties.insert("rank".to_string(), serde_json::json!(rank));
    properties.insert("segment_id".to_string(), serde_json::json!(found.segment.id.get()));
    properties.insert("road_id".to_string(), serde_json::json!(found.road.id.get()));
    properties.insert("name".to_string(), serde_json::json!(&*found.road.name));
    properties.insert("maxspeed".to_string(), serde_json::json!(&*found.road.maxspeed));
    properties.insert("distance_m".to_string(), serde_json::json!(found.distance_m));

    feature(line_to_geojson(found.segment.start(), found.segment.end()), properties)
}

/// Line from the query point to the closest point on a segment
fn connector_to_feature(point: Point, found: &SegmentMatch, rank: usize) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("feature_type".to_string(), serde_json::json!("connector"));
    properties.insert("rank".to_string(), serde_json::json!(rank));
    properties.insert("distance_m".to_string(), serde_json::json!(found.distance_m));

    feature(line_to_geojson(point, found.closest), properties)
}

/// Build the debugging view of one query: search box, query point, every
/// candidate segment and its connector line
pub fn query_to_geojson(point: Point, result: &NearestSegments) -> FeatureCollection {
    let mut features = Vec::with_capacity(2 + 2 * result.matches.len());

    let mut properties = serde_json::Map::new();
    properties.insert("feature_type".to_string(), serde_json::json!("query_bbox"));
    features.push(feature(bbox_to_geojson(&result.bbox), properties));

    let mut properties = serde_json::Map::new();
    properties.insert("feature_type".to_string(), serde_json::json!("query_point"));
    features.push(feature(Value::Point(vec![point.x(), point.y()]), properties));

    for (rank, found) in result.matches.iter().enumerate() {
        features.push(segment_to_feature(found, rank));
        features.push(connector_to_feature(point, found, rank));
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write a query's debugging view to a GeoJSON file
pub fn write_query_geojson(point: Point, result: &NearestSegments, output_path: &Path) -> Result<()> {
    log::info!(
        "Writing {} candidate segments to {}",
        result.matches.len(),
        output_path.display()
    );

    let geojson = GeoJson::from(query_to_geojson(point, result));
    let json_string = serde_json::to_string_pretty(&geojson)
        .context("Failed to serialize GeoJSON")?;

    std::fs::write(output_path, json_string)
        .with_context(|| format!("Failed to write GeoJSON to {}", output_path.display()))?;

    Ok(())
}
