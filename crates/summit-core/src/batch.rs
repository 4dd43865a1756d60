//! JSONL batch driver: one output line per non-blank input line, in order.
//!
//! Input record: `{"peak_id": .., "lat": .., "lon": .., "radius_m"?, "top_k"?,
//! "min_separation_m"?, "seed_lat"?, "seed_lon"?}`. A failed record becomes
//! `{"peak_id": .., "error": "<code>", "message": ".."}` and the batch goes on.
use std::io::{BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::coords::LatLon;
use crate::engine::{SnapParams, SnapReport, SnapRequest, SummitDetector};
use crate::error::{ErrorCode, Result, SummitError};
use crate::raster::WindowProvider;

#[derive(Debug, Clone, Deserialize)]
struct BatchInput {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    radius_m: Option<f64>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    min_separation_m: Option<f64>,
    #[serde(default)]
    seed_lat: Option<f64>,
    #[serde(default)]
    seed_lon: Option<f64>,
}

impl BatchInput {
    fn into_request(self, params: &SnapParams) -> Result<SnapRequest> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(SummitError::InvalidInput("missing lat/lon".into()));
        };
        let seed = match (self.seed_lat, self.seed_lon) {
            (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
            (None, None) => None,
            _ => return Err(SummitError::InvalidInput("seed_lat and seed_lon must be given together".into())),
        };
        let mut request = SnapRequest::new(LatLon::new(lat, lon), params);
        request.seed = seed;
        request.radius_m = self.radius_m.unwrap_or(params.radius_m);
        request.top_k = self.top_k.unwrap_or(params.top_k);
        request.min_separation_m = self.min_separation_m.unwrap_or(params.min_separation_m);
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
struct SuccessRecord<'a> {
    peak_id: &'a Value,
    #[serde(flatten)]
    report: &'a SnapReport,
}

#[derive(Debug, Serialize)]
struct ErrorRecord<'a> {
    peak_id: &'a Value,
    error: ErrorCode,
    message: String,
}

/// Outcome of one input line.
#[derive(Debug)]
pub struct LineOutcome {
    pub json: String,
    pub ok: bool,
}

/// Counts reported after a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub records: usize,
    pub succeeded: usize,
    pub failed: usize,
}

fn error_line(peak_id: &Value, code: ErrorCode, message: String) -> Result<LineOutcome> {
    let json = serde_json::to_string(&ErrorRecord { peak_id, error: code, message })?;
    Ok(LineOutcome { json, ok: false })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while processing record".to_string()
    }
}

/// Process one JSONL line into its output line.
///
/// Per-record failures become error lines; only a fatal error is returned.
pub fn process_line<P: WindowProvider>(line: &str, detector: &SummitDetector<P>) -> Result<LineOutcome> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return error_line(&Value::Null, ErrorCode::InvalidInput, format!("malformed JSON: {e}")),
    };
    let peak_id = value.get("peak_id").cloned().unwrap_or(Value::Null);

    let input: BatchInput = match serde_json::from_value(value) {
        Ok(i) => i,
        Err(e) => return error_line(&peak_id, ErrorCode::InvalidInput, e.to_string()),
    };
    let request = match input.into_request(detector.params()) {
        Ok(r) => r,
        Err(e) => return error_line(&peak_id, e.code(), e.to_string()),
    };

    match catch_unwind(AssertUnwindSafe(|| detector.snap(&request))) {
        Ok(Ok(report)) => {
            let json = serde_json::to_string(&SuccessRecord { peak_id: &peak_id, report: &report })?;
            Ok(LineOutcome { json, ok: true })
        }
        Ok(Err(e)) if e.is_fatal() => Err(e),
        Ok(Err(e)) => {
            debug!(peak_id = %peak_id, error = %e, "record failed");
            error_line(&peak_id, e.code(), e.to_string())
        }
        Err(payload) => error_line(&peak_id, ErrorCode::Internal, panic_message(payload.as_ref())),
    }
}

/// Default number of records processed together between flushes.
pub const DEFAULT_CHUNK_LINES: usize = 256;

/// A non-blank input line awaiting processing, or the outcome of one that
/// never reached the JSON parser.
enum Pending {
    Record(String),
    Done(LineOutcome),
}

impl Pending {
    fn from_bytes(bytes: &[u8]) -> Result<Option<Self>> {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                let text = text.trim();
                Ok((!text.is_empty()).then(|| Pending::Record(text.to_string())))
            }
            Err(e) => {
                debug!(error = %e, "undecodable input line");
                let outcome = error_line(&Value::Null, ErrorCode::InvalidInput, format!("line is not valid UTF-8: {e}"))?;
                Ok(Some(Pending::Done(outcome)))
            }
        }
    }

    fn run<P: WindowProvider>(self, detector: &SummitDetector<P>) -> Result<LineOutcome> {
        match self {
            Pending::Record(line) => process_line(&line, detector),
            Pending::Done(outcome) => Ok(outcome),
        }
    }
}

#[cfg(feature = "threading")]
fn process_all<P: WindowProvider>(chunk: Vec<Pending>, detector: &SummitDetector<P>) -> Vec<Result<LineOutcome>> {
    use rayon::prelude::*;
    chunk.into_par_iter().map(|p| p.run(detector)).collect()
}

#[cfg(not(feature = "threading"))]
fn process_all<P: WindowProvider>(chunk: Vec<Pending>, detector: &SummitDetector<P>) -> Vec<Result<LineOutcome>> {
    chunk.into_iter().map(|p| p.run(detector)).collect()
}

/// Records held before a flush. Without the thread pool there is nothing to
/// gain from batching, so every record is answered as soon as it is read.
fn chunk_limit(requested: usize) -> usize {
    if cfg!(feature = "threading") { requested.max(1) } else { 1 }
}

fn write_chunk<W: Write, P: WindowProvider>(
    chunk: Vec<Pending>,
    writer: &mut W,
    detector: &SummitDetector<P>,
    summary: &mut BatchSummary,
) -> Result<()> {
    for outcome in process_all(chunk, detector) {
        let outcome = outcome?;
        summary.records += 1;
        if outcome.ok {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        writeln!(writer, "{}", outcome.json)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read JSONL records from `reader` and write one result line per record to
/// `writer`, preserving input order. See [`process_stream_chunked`].
pub fn process_stream<R: BufRead, W: Write, P: WindowProvider>(
    reader: R,
    writer: W,
    detector: &SummitDetector<P>,
) -> Result<BatchSummary> {
    process_stream_chunked(reader, writer, detector, DEFAULT_CHUNK_LINES)
}

/// Like [`process_stream`], answering at most `chunk_lines` records at a time.
///
/// Each chunk's results are written and flushed before the next chunk is
/// read, so a caller feeding one line at a time gets its answer without
/// closing the input. A line that is not valid UTF-8 becomes an
/// `invalid_input` error line. Only I/O failures and fatal errors end the
/// run, after every earlier chunk has been written.
pub fn process_stream_chunked<R: BufRead, W: Write, P: WindowProvider>(
    mut reader: R,
    mut writer: W,
    detector: &SummitDetector<P>,
    chunk_lines: usize,
) -> Result<BatchSummary> {
    let limit = chunk_limit(chunk_lines);
    let mut summary = BatchSummary::default();
    let mut buf = Vec::new();
    let mut chunk = Vec::with_capacity(limit);
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n > 0 {
            if let Some(pending) = Pending::from_bytes(&buf)? {
                chunk.push(pending);
            }
        }
        if chunk.len() >= limit || (n == 0 && !chunk.is_empty()) {
            write_chunk(std::mem::take(&mut chunk), &mut writer, detector, &mut summary)?;
        }
        if n == 0 {
            break;
        }
    }

    info!(records = summary.records, succeeded = summary.succeeded, failed = summary.failed, "batch complete");
    Ok(summary)
}
