//! Log file importer.
//!
//! Reads a whole logger file, decodes every line and inserts each reading
//! into its sensor's table. The table of the sensor named by the first
//! decodable line is created if needed; readings naming any other sensor go
//! to that sensor's table when the catalog already has it. Bad lines and
//! failed inserts are logged and skipped; only failures that affect the
//! whole file (unreadable file, table creation) are returned as errors.

use crate::codec::{self, DecodeError};
use crate::error::{Result, TemplogError};
use crate::store::{InsertOutcome, SensorStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// What happened to the lines of one imported file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub path: PathBuf,

    /// Target sensor table, if any line decoded
    pub sensor_id: Option<String>,

    /// Non-blank lines seen
    pub lines: usize,
    pub decoded: usize,
    pub malformed: usize,
    pub bad_timestamps: usize,

    /// Readings naming a different sensor than the file's first reading
    pub mismatched: usize,

    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl ImportReport {
    fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), ..Default::default() }
    }
}

/// Import every reading of the file at `path` into `store`.
///
/// Importing the same file again only reports duplicates.
#[instrument(skip(store, path), fields(path = %path.as_ref().display()))]
pub async fn import_file(store: &SensorStore, path: impl AsRef<Path>) -> Result<ImportReport> {
    let path = path.as_ref();
    let started = Instant::now();

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| TemplogError::FileReadError { path: path.to_path_buf(), source: e })?;

    let mut report = ImportReport::new(path);
    let mut records = Vec::new();

    for (index, line) in data.split(|b| *b == b'\n').enumerate() {
        match codec::decode(line) {
            Ok(record) => {
                report.lines += 1;
                records.push(record);
            }
            Err(DecodeError::Empty) => {}
            Err(e) => {
                report.lines += 1;
                report.malformed += 1;
                metrics::counter!("templog_lines_rejected_total", "reason" => "malformed")
                    .increment(1);
                warn!(line = index + 1, "Skipping line: {}", e);
            }
        }
    }
    report.decoded = records.len();

    let Some(first) = records.first() else {
        info!(lines = report.lines, "No readings decoded; nothing to import");
        return Ok(report);
    };
    let sensor_id = first.sensor_id.clone();
    report.sensor_id = Some(sensor_id.clone());

    store.ensure_table(&sensor_id).await?;

    for record in &records {
        let reading = match record.canonicalize() {
            Ok(reading) => reading,
            Err(e) => {
                report.bad_timestamps += 1;
                metrics::counter!("templog_lines_rejected_total", "reason" => "timestamp")
                    .increment(1);
                warn!("Skipping reading: {}", e);
                continue;
            }
        };

        if reading.sensor_id != sensor_id {
            report.mismatched += 1;
            debug!(
                expected = %sensor_id,
                found = %reading.sensor_id,
                "Reading for another sensor"
            );
        }

        match store.insert(&reading.sensor_id, &reading).await {
            Ok(InsertOutcome::Inserted) => {
                report.inserted += 1;
                let sensor = reading.sensor_id.clone();
                metrics::counter!("templog_readings_inserted_total", "sensor" => sensor).increment(1);
            }
            Ok(InsertOutcome::Duplicate) => {
                report.duplicates += 1;
                let sensor = reading.sensor_id.clone();
                metrics::counter!("templog_readings_duplicate_total", "sensor" => sensor).increment(1);
            }
            Err(TemplogError::TableNotFound { .. }) => {
                report.failed += 1;
                metrics::counter!("templog_lines_rejected_total", "reason" => "unknown_sensor")
                    .increment(1);
                warn!(sensor = %reading.sensor_id, ts = reading.timestamp, "No table for sensor");
            }
            Err(e) => {
                report.failed += 1;
                warn!(ts = reading.timestamp, "Insert failed: {}", e);
            }
        }
    }

    metrics::histogram!("templog_import_duration_seconds")
        .record(started.elapsed().as_secs_f64());

    debug!(?report, "Import finished");
    info!(
        sensor = %sensor_id,
        inserted = report.inserted,
        duplicates = report.duplicates,
        skipped = report.malformed + report.bad_timestamps + report.failed,
        "Imported log file"
    );

    Ok(report)
}
