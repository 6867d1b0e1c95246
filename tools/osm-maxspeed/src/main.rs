use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geo::Point;
use std::path::{Path, PathBuf};

mod download;
mod output;
mod pbf;
mod records;

use download::{download_pbf, DEFAULT_PBF_URL};
use output::write_query_geojson;
use pbf::{extract_roads, resolve_ways};
use records::{read_records, write_records};
use speedmap_roads::{NetworkConfig, RoadNetwork, SegmentMatch, SegmentPairing, SqliteIndex};

#[derive(Parser, Debug)]
#[command(
    name = "osm-maxspeed",
    author,
    version,
    about = "Extract speed-limit tagged roads from OpenStreetMap PBF data",
    long_about = "Downloads an OSM PBF extract, pulls out every highway way carrying a \
                  maxspeed (or zone:maxspeed) tag, loads the roads into a SQLite R*Tree \
                  segment index, and answers nearest-road queries against it.\n\n\
                  Typical run: download, extract, build, then query as often as needed."
)]
struct Args {
    /// Verbose output (show debug messages)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a PBF extract (skipped when the file already exists)
    Download {
        #[arg(long, default_value = DEFAULT_PBF_URL)]
        url: String,

        /// Output PBF file
        #[arg(short, long)]
        output: PathBuf,

        /// Extra attempts after a transient failure
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },

    /// Extract speed-limited roads from a PBF file into JSON
    Extract {
        /// Input OSM PBF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load extracted roads into a SQLite segment index
    Build {
        /// Input JSON file written by `extract`
        #[arg(short, long)]
        input: PathBuf,

        /// SQLite database (replaced if it exists)
        #[arg(long)]
        db: PathBuf,

        /// Also pair each road's first point with its last
        #[arg(long)]
        wrap_around: bool,
    },

    /// Find the road nearest to a coordinate
    Query {
        /// SQLite database written by `build`
        #[arg(long)]
        db: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Search radius in meters
        #[arg(short, long, default_value_t = 60.0)]
        radius: f64,

        /// Print every candidate, not just the nearest
        #[arg(long)]
        all: bool,

        /// Write the search box, candidates and connector lines to this GeoJSON file
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .init();

    match args.command {
        Command::Download { url, output, retries } => download_pbf(&url, &output, retries),
        Command::Extract { input, output } => run_extract(&input, &output),
        Command::Build { input, db, wrap_around } => run_build(&input, &db, wrap_around),
        Command::Query { db, lon, lat, radius, all, geojson } => {
            run_query(&db, Point::new(lon, lat), radius, all, geojson.as_deref())
        }
    }
}

fn run_extract(input: &Path, output: &Path) -> Result<()> {
    log::info!("=== OSM Maxspeed Extract ===");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", output.display());

    if !input.exists() {
        bail!("Input file does not exist: {}", input.display());
    }

    let extracted = extract_roads(input).context("Failed to extract roads from PBF")?;
    let records = resolve_ways(&extracted.ways, &extracted.nodes);
    log::info!("Resolved {} roads", records.len());

    write_records(&records, output).context("Failed to write road JSON")?;
    log::info!("Done!");
    Ok(())
}

fn run_build(input: &Path, db: &Path, wrap_around: bool) -> Result<()> {
    log::info!("=== OSM Maxspeed Build ===");
    log::info!("Input: {}", input.display());
    log::info!("Database: {}", db.display());

    let records = read_records(input)?;
    let roads = records.into_iter().map(|record| record.into_road());

    let pairing = if wrap_around {
        SegmentPairing::WrapAround
    } else {
        SegmentPairing::Consecutive
    };
    let config = NetworkConfig::default().with_pairing(pairing);

    let index = SqliteIndex::open(db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let (_, report) =
        RoadNetwork::build(index, roads, config).context("Failed to build segment index")?;

    log::info!("");
    log::info!("Roads: {}", report.roads);
    log::info!("Segments: {}", report.segments);
    if report.skipped_roads > 0 {
        log::warn!("{} roads had fewer than two points and were not indexed", report.skipped_roads);
    }
    log::info!("Done!");
    Ok(())
}

fn print_match(found: &SegmentMatch) {
    println!(
        "{:>8.1} m  {} ({})  maxspeed={}  closest=({:.6}, {:.6})",
        found.distance_m,
        found.road.name,
        found.road.id,
        found.road.maxspeed,
        found.closest.x(),
        found.closest.y()
    );
}

fn run_query(db: &Path, point: Point, radius: f64, all: bool, geojson: Option<&Path>) -> Result<()> {
    if !db.exists() {
        bail!("Database does not exist: {}", db.display());
    }

    let index = SqliteIndex::open(db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let network = RoadNetwork::new(index, NetworkConfig::default().with_default_radius(radius))?;

    let result = network.nearest_segments(point.x(), point.y(), radius)?;
    log::debug!("{} candidates in {:?}", result.matches.len(), result.bbox);

    match result.matches.first() {
        None => println!("No road within {} m", radius),
        Some(nearest) if !all => print_match(nearest),
        Some(_) => result.matches.iter().for_each(print_match),
    }

    if let Some(path) = geojson {
        write_query_geojson(point, &result, path).context("Failed to write query GeoJSON")?;
    }

    Ok(())
}
