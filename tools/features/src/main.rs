/// Single-point terrain descriptor dump, for inspecting what the classifier sees.
/// Prints the 16-feature vector and the dominance score of the DEM cell
/// containing the given point as pretty JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::{io, path::PathBuf};
use summit_core::{describe_point, DemRaster, DemSource, ErrorCode, LatLon, SnapParams};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "features", about = "Print terrain descriptors for one DEM location")]
struct Args {
    /// Elevation raster in JSON form.
    #[arg(short, long)]
    dem: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Feature window radius, metres.
    #[arg(short, long, default_value_t = 50.0)]
    radius: f64,

    /// Reference point for dist_to_seed.
    #[arg(long, allow_hyphen_values = true, requires = "seed_lon")]
    seed_lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true, requires = "seed_lat")]
    seed_lon: Option<f64>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: ErrorCode,
    message: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let raster = DemRaster::from_json_file(&args.dem).with_context(|| format!("reading DEM {}", args.dem.display()))?;
    let source = DemSource::new(raster).context("DEM coordinate reference system")?;

    let point = LatLon::new(args.lat, args.lon);
    let seed = args.seed_lat.zip(args.seed_lon).map(|(lat, lon)| LatLon::new(lat, lon));
    debug!(?point, ?seed, radius = args.radius, "describing point");

    let json = match describe_point(&source, point, args.radius, seed, &SnapParams::default()) {
        Ok(desc) => serde_json::to_string_pretty(&desc)?,
        Err(e) => serde_json::to_string_pretty(&ErrorOutput { error: e.code(), message: e.to_string() })?,
    };
    println!("{json}");
    Ok(())
}
