use anyhow::{Context, Result};
use geo::Coord;
use hashbrown::HashMap;
use indicatif::{ProgressBar, ProgressStyle};
use osmpbf::{Element, ElementReader};
use std::path::Path;

use speedmap_roads::UNKNOWN_ROAD_NAME;

use crate::records::RoadRecord;

/// Node ID to coordinate mapping
pub struct NodeCache {
    nodes: HashMap<i64, Coord<f64>>,
}

impl NodeCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, id: i64, coord: Coord<f64>) {
        self.nodes.insert(id, coord);
    }

    pub fn get(&self, id: i64) -> Option<&Coord<f64>> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// A speed-limited road way with node references (before coordinate resolution)
#[derive(Clone, Debug)]
pub struct WayRef {
    pub id: i64,
    pub node_refs: Vec<i64>,
    pub name: Option<String>,
    pub maxspeed: String,
}

/// All extracted elements from PBF
pub struct ExtractedRoads {
    pub nodes: NodeCache,
    pub ways: Vec<WayRef>,
}

/// Tag storage type
pub type Tags = HashMap<String, String>;

/// Speed limit of a highway way: `maxspeed`, else `zone:maxspeed`.
///
/// `None` for non-highway ways and highways without a limit.
pub fn road_speed_limit(tags: &Tags) -> Option<&str> {
    if !tags.contains_key("highway") {
        return None;
    }
    ["maxspeed", "zone:maxspeed"]
        .iter()
        .filter_map(|key| tags.get(*key))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

fn way_ref(way: &osmpbf::Way<'_>) -> Option<WayRef> {
    let tags: Tags = way
        .tags()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let maxspeed = road_speed_limit(&tags)?.to_string();

    Some(WayRef {
        id: way.id(),
        node_refs: way.refs().collect(),
        name: tags.get("name").cloned(),
        maxspeed,
    })
}

/// Collect node coordinates and speed-limited highway ways from a PBF file
pub fn extract_roads(path: &Path) -> Result<ExtractedRoads> {
    log::info!("Reading PBF file: {}", path.display());

    let reader = ElementReader::from_path(path)
        .with_context(|| format!("Failed to open PBF file: {}", path.display()))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Reading elements...");

    let mut nodes = NodeCache::with_capacity(10_000_000);
    let mut ways = Vec::new();

    let mut node_count = 0u64;
    let mut way_count = 0u64;

    reader.for_each(|element| match element {
        Element::Node(node) => {
            nodes.insert(node.id(), Coord { x: node.lon(), y: node.lat() });
            node_count += 1;
            if node_count % 1_000_000 == 0 {
                pb.set_message(format!("Processed {} nodes...", node_count));
            }
        }
        Element::DenseNode(node) => {
            nodes.insert(node.id(), Coord { x: node.lon(), y: node.lat() });
            node_count += 1;
            if node_count % 1_000_000 == 0 {
                pb.set_message(format!("Processed {} nodes...", node_count));
            }
        }
        Element::Way(way) => {
            if let Some(road) = way_ref(&way) {
                ways.push(road);
            }

            way_count += 1;
            if way_count % 100_000 == 0 {
                pb.set_message(format!(
                    "Processed {} nodes, {} ways ({} roads)...",
                    node_count,
                    way_count,
                    ways.len()
                ));
            }
        }
        Element::Relation(_) => {}
    })?;

    pb.finish_with_message(format!(
        "Processed {} nodes, {} ways",
        node_count, way_count
    ));

    log::info!("Node cache: {} nodes", nodes.len());
    log::info!("Roads with a speed limit: {}", ways.len());

    Ok(ExtractedRoads { nodes, ways })
}

/// Resolve node references to coordinates, keeping way order
pub fn resolve_way(way_ref: &WayRef, nodes: &NodeCache) -> Option<RoadRecord> {
    let geometry: Option<Vec<[f64; 2]>> = way_ref
        .node_refs
        .iter()
        .map(|&id| nodes.get(id).map(|c| [c.x, c.y]))
        .collect();

    geometry.map(|geometry| RoadRecord {
        id: way_ref.id,
        name: Some(
            way_ref
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_ROAD_NAME.to_string()),
        ),
        maxspeed: way_ref.maxspeed.clone(),
        geometry,
    })
}

/// Resolve multiple ways, dropping those with missing nodes
pub fn resolve_ways(way_refs: &[WayRef], nodes: &NodeCache) -> Vec<RoadRecord> {
    let mut resolved = Vec::with_capacity(way_refs.len());
    let mut missing = 0;

    for way_ref in way_refs {
        if let Some(record) = resolve_way(way_ref, nodes) {
            resolved.push(record);
        } else {
            missing += 1;
        }
    }

    if missing > 0 {
        log::warn!("{} ways could not be resolved (missing nodes)", missing);
    }

    resolved
}
