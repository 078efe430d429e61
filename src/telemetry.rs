//! Append-only per-frame gameplay log.
//!
//! Format: comma-delimited, one header row written when the store is empty,
//! then one row per active frame. Booleans are `0`/`1`, missing values are
//! empty cells.

use crate::features::{feature_row, FeatureRow, FEATURE_COLUMNS, LABEL_COLUMN, TIMESTAMP_COLUMN};
use crate::snapshot::GameStateSnapshot;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp_ms: u64,
    pub features: FeatureRow,
    pub fired: bool,
}

impl TelemetryRecord {
    pub fn from_snapshot(snapshot: &GameStateSnapshot, fired: bool) -> Self {
        Self {
            timestamp_ms: snapshot.timestamp_ms,
            features: feature_row(snapshot),
            fired,
        }
    }
}

pub fn header_line() -> String {
    let mut line = String::from(TIMESTAMP_COLUMN);
    for column in FEATURE_COLUMNS {
        line.push(',');
        line.push_str(column);
    }
    line.push(',');
    line.push_str(LABEL_COLUMN);
    line.push('\n');
    line
}

pub fn format_row(record: &TelemetryRecord) -> String {
    let mut line = record.timestamp_ms.to_string();
    for value in &record.features {
        line.push(',');
        if let Some(v) = value.filter(|v| v.is_finite()) {
            line.push_str(&format!("{v}"));
        }
    }
    line.push(',');
    line.push(if record.fired { '1' } else { '0' });
    line.push('\n');
    line
}

pub struct TelemetryRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    rows_written: u64,
    consecutive_failures: u32,
}

impl TelemetryRecorder {
    /// Never fails: an unopenable store is retried on every `record` call.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let writer = match open_store(&path) {
            Ok(writer) => Some(writer),
            Err(err) => {
                tracing::warn!(path = %path.display(), "telemetry store unavailable: {err}");
                None
            }
        };
        Self {
            path,
            writer,
            rows_written: 0,
            consecutive_failures: 0,
        }
    }

    /// Rows appended by this recorder instance.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one row. I/O failures are logged and the frame is skipped.
    pub fn record(&mut self, record: &TelemetryRecord) {
        match self.try_record(record) {
            Ok(()) => {
                self.rows_written += 1;
                self.consecutive_failures = 0;
            }
            Err(err) => {
                self.writer = None;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures == 1 {
                    tracing::warn!(
                        path = %self.path.display(),
                        timestamp_ms = record.timestamp_ms,
                        "telemetry write failed, frame not recorded: {err}"
                    );
                } else {
                    tracing::debug!(
                        path = %self.path.display(),
                        failures = self.consecutive_failures,
                        "telemetry write still failing: {err}"
                    );
                }
            }
        }
    }

    fn try_record(&mut self, record: &TelemetryRecord) -> io::Result<()> {
        if self.writer.is_none() {
            self.writer = Some(open_store(&self.path)?);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "telemetry writer unavailable"));
        };
        writer.write_all(format_row(record).as_bytes())?;
        writer.flush()
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush().and_then(|_| writer.get_ref().sync_data()) {
                tracing::debug!(path = %self.path.display(), "telemetry close failed: {err}");
            }
        }
    }
}

fn open_store(path: &Path) -> io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let len = file.metadata()?.len();
    // A crash mid-row leaves an unterminated line; close it before appending.
    let torn = len > 0 && {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        last[0] != b'\n'
    };
    let mut writer = BufWriter::new(file);
    if len == 0 {
        writer.write_all(header_line().as_bytes())?;
        writer.flush()?;
    } else if torn {
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(writer)
}
