//! Batch summit snapping: JSONL seed records in, JSONL results out.
//!
//! Stdout carries only result lines; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
};
use summit_core::{load_model, DemRaster, DemSource, DetectionStrategy, SnapParams, SummitDetector};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "snapper", about = "Snap seed coordinates to nearby DEM summits")]
struct Args {
    /// Elevation raster in JSON form.
    #[arg(short, long)]
    dem: PathBuf,

    /// Classifier model JSON (logistic or forest). Without it candidates are
    /// ranked by dominance confidence.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Run parameters JSON; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSONL input (stdin when absent).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSONL output (stdout when absent).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Default search radius, metres.
    #[arg(long)]
    radius: Option<f64>,

    /// Default number of summits per record.
    #[arg(long)]
    top_k: Option<usize>,

    /// Default minimum separation between summits, metres.
    #[arg(long)]
    min_separation: Option<f64>,

    /// Descriptor window radius, metres.
    #[arg(long)]
    feature_radius: Option<f64>,

    /// Rank every cell by elevation instead of detecting local maxima.
    #[arg(long)]
    highest: bool,

    /// Skip the dominance confidence score.
    #[arg(long)]
    no_confidence: bool,

    /// Among equally confident candidates, prefer the nearest.
    #[arg(long)]
    prefer_nearest: bool,

    /// Records answered per flush; 1 for line-at-a-time callers.
    #[arg(long, default_value_t = summit_core::batch::DEFAULT_CHUNK_LINES)]
    chunk_size: usize,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn build_params(args: &Args) -> Result<SnapParams> {
    let mut params = match &args.config {
        Some(path) => SnapParams::from_json_file(path).with_context(|| format!("reading config {}", path.display()))?,
        None => SnapParams::default(),
    };
    if let Some(r) = args.radius {
        params.radius_m = r;
    }
    if let Some(k) = args.top_k {
        params.top_k = k;
    }
    if let Some(s) = args.min_separation {
        params.min_separation_m = s;
    }
    if let Some(f) = args.feature_radius {
        params.feature_radius_m = f;
    }
    if args.highest {
        params.detection = DetectionStrategy::TopN { n: None };
        params.use_confidence = false;
    }
    if args.no_confidence {
        params.use_confidence = false;
    }
    if args.prefer_nearest {
        params.prefer_nearest = true;
    }
    Ok(params)
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose)?;

    let params = build_params(&args)?;
    let raster = DemRaster::from_json_file(&args.dem).with_context(|| format!("reading DEM {}", args.dem.display()))?;
    info!(width = raster.width, height = raster.height, "loaded DEM {}", args.dem.display());
    let source = DemSource::new(raster).context("DEM coordinate reference system")?;

    let mut detector = SummitDetector::new(source, params);
    if let Some(path) = &args.model {
        // A model that cannot be loaded would fail every record: abort the run.
        let model = load_model(path).context("loading classifier")?;
        detector = detector.with_classifier(model);
        info!("classifier loaded from {}", path.display());
    }

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = summit_core::batch::process_stream_chunked(reader, writer, &detector, args.chunk_size)
        .context("batch run aborted")?;
    if summary.failed > 0 {
        info!(failed = summary.failed, "some records produced error lines");
    }
    Ok(())
}
