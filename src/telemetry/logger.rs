//! # Telemetry Logger
//!
//! Writes received payloads to JSON Lines files.
//!
//! A new file is started after `max_records_per_file` records and only the
//! newest `max_files_to_keep` files are retained in the log directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::payload::Payload;
use crate::error::Result;

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

#[derive(Serialize)]
struct LogLine<'a> {
    received_at: String,
    #[serde(flatten)]
    payload: &'a Payload,
}

/// Rotating JSONL telemetry writer
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files_opened: u32,
}

impl TelemetryLogger {
    /// Create a logger writing into `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        info!("Telemetry log directory: {}", dir.as_ref().display());

        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// Append one payload as a JSON line
    pub fn log(&mut self, payload: &Payload) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = LogLine {
            received_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload,
        };

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Close the current file, open the next one and prune old files
    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S%3f"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        debug!("Opening telemetry log {}", path.display());

        self.writer = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.files_opened += 1;

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let mut files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Telemetry files currently in the log directory, unsorted
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION))
                .unwrap_or(false);
            if matches {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl Drop for TelemetryLogger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
