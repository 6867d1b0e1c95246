use anyhow::{Context, Result};
use geo::LineString;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use speedmap_roads::Road;

/// One road as written by `extract` and read by `build`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadRecord {
    pub id: i64,
    /// Older extracts carry no name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub maxspeed: String,
    /// `[lon, lat]` pairs in way order
    pub geometry: Vec<[f64; 2]>,
}

impl RoadRecord {
    pub fn into_road(self) -> Road {
        let geometry: LineString<f64> = self
            .geometry
            .into_iter()
            .map(|[lon, lat]| (lon, lat))
            .collect();
        Road::with_optional_name(self.id, self.name.as_deref(), self.maxspeed, geometry)
    }
}

pub fn write_records(records: &[RoadRecord], output_path: &Path) -> Result<()> {
    log::info!("Writing {} roads to {}", records.len(), output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)
        .context("Failed to serialize road records")?;
    writer.flush()?;

    Ok(())
}

pub fn read_records(input_path: &Path) -> Result<Vec<RoadRecord>> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?;
    let records: Vec<RoadRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse road records from {}", input_path.display()))?;

    log::info!("Read {} roads from {}", records.len(), input_path.display());
    Ok(records)
}
