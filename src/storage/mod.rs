//! # Storage Module - Reading Log
//!
//! Accepted readings are appended to a CSV file, one row per frame. The file is
//! the hand-off point to the offline analytics scripts, which only rely on the
//! header and column formats below.
//!
//! ```text
//! Timestamp,Temperature (°C),Humidity (%),CH4 (ppm),CO2 (ppm)
//! 2024-01-01 12:00:00,25,60,1.50,450.00
//! ```
//!
//! ## Guarantees
//!
//! - **Header**: written once when the file is created (or found empty).
//! - **Append-only**: the file is never truncated or rewritten.
//! - **Whole rows**: an append formats and writes a complete row while holding
//!   an in-process mutex and an `fs2` exclusive file lock, so concurrent
//!   connections (or a second process on the same file) never interleave.
//! - **No silent loss**: IO failures are returned to the caller.
//!
//! ## Configuration
//!
//! ```toml
//! [storage]
//! csv_path = "data_log.csv"
//! timestamp_zone = "local"   # or "utc"
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, TimeZone, Utc};
use fs2::FileExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::StorageError;
use crate::protocol::SensorPacket;

/// Header row shared with the analytics tooling.
pub const CSV_HEADER: &str = "Timestamp,Temperature (°C),Humidity (%),CH4 (ppm),CO2 (ppm)";

/// strftime pattern of the timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zone used to render the timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampZone {
    /// The server's local zone (what the existing log files contain).
    #[default]
    Local,
    Utc,
}

impl TimestampZone {
    pub fn format(&self, unix_secs: i64) -> Result<String, StorageError> {
        let formatted = match self {
            TimestampZone::Local => Local
                .timestamp_opt(unix_secs, 0)
                .earliest()
                .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string()),
            TimestampZone::Utc => DateTime::<Utc>::from_timestamp(unix_secs, 0)
                .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string()),
        };
        formatted.ok_or(StorageError::InvalidTimestamp(unix_secs))
    }
}

/// One persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub timestamp: String,
    pub temperature: i32,
    pub humidity: i32,
    pub ch4: f32,
    pub co2: f32,
}

impl ReadingRecord {
    pub fn from_packet(packet: &SensorPacket, zone: TimestampZone) -> Result<Self, StorageError> {
        Ok(Self {
            timestamp: zone.format(packet.timestamp)?,
            temperature: packet.temperature,
            humidity: packet.humidity,
            ch4: packet.ch4,
            co2: packet.co2,
        })
    }

    /// CSV row including the trailing newline. Gas readings carry two decimals.
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{:.2},{:.2}\n",
            self.timestamp,
            self.temperature,
            self.humidity,
            f64::from(self.ch4),
            f64::from(self.co2)
        )
    }
}

#[derive(Debug, Default)]
struct AppendState {
    appended: u64,
}

/// Append-only CSV log of accepted readings.
#[derive(Debug)]
pub struct ReadingLog {
    path: PathBuf,
    zone: TimestampZone,
    state: Mutex<AppendState>,
}

impl ReadingLog {
    /// Open (creating if needed) the log at `path`, writing the header row when
    /// the file is new or empty.
    pub fn open(path: impl AsRef<Path>, zone: TimestampZone) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
            file.flush()?;
            info!("Created reading log {} with header", path.display());
        }
        // Lock is released when the handle drops.
        drop(file);

        Ok(Self {
            path,
            zone,
            state: Mutex::new(AppendState::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn zone(&self) -> TimestampZone {
        self.zone
    }

    /// Format and append one reading. The whole operation is a single
    /// critical section.
    pub fn append(&self, packet: &SensorPacket) -> Result<ReadingRecord, StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let record = ReadingRecord::from_packet(packet, self.zone)?;
        let line = record.to_csv_line();

        // Synchronous IO: fs2 locks have no async counterpart.
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        drop(file);

        state.appended += 1;
        debug!("Appended reading #{} to {}", state.appended, self.path.display());
        Ok(record)
    }

    /// Rows appended through this handle since it was opened.
    pub fn appended(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).appended
    }

    /// Data rows currently in the file.
    pub fn record_count(&self) -> Result<u64, StorageError> {
        let _guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        count_records(&self.path)
    }
}

/// Count data rows (excluding the header) in the log at `path`. A missing file
/// has zero rows.
pub fn count_records(path: &Path) -> Result<u64, StorageError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut count = 0u64;
    for line in BufReader::new(file).lines().skip(1) {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}
