//! Rolling CSV sample log.
//!
//! Promoted from "external collaborator" in the distilled spec to a fully
//! specified ambient component (see `SPEC_FULL.md` §1A). Rotation discipline
//! is grounded on the teacher's `broker/ring_buffer.rs` "never exceed a
//! configured bound" posture, applied to file bytes instead of buffer bytes;
//! file handling (permissions, directory creation) follows `config.rs`.

use crate::constants::CSV_ROTATE_BYTES;
use crate::error::{Error, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One sample record to append to the rolling CSV.
#[derive(Debug, Clone, Copy)]
pub struct SampleRecord {
    /// Host wall-clock time in milliseconds, only used in debug verbosity.
    pub host_timestamp_ms: u64,
    /// Device-side tick counter.
    pub device_timestamp: u32,
    /// Converted microvolt value.
    pub microvolts: f64,
    /// Whether this sample was classified as seizure-like.
    pub seizure_detected: bool,
    /// Whether therapy is currently active.
    pub therapy_on: bool,
}

impl SampleRecord {
    fn to_line(self, debug: bool) -> String {
        if debug {
            format!(
                "{},{},{},{},{}\n",
                self.host_timestamp_ms,
                self.device_timestamp,
                self.microvolts,
                self.seizure_detected,
                self.therapy_on
            )
        } else {
            format!(
                "{},{},{},{}\n",
                self.device_timestamp, self.microvolts, self.seizure_detected, self.therapy_on
            )
        }
    }
}

/// A rolling CSV writer: rotates to a new `YYYYMMDD-HHMMSS-N.csv` file once
/// the current file exceeds [`CSV_ROTATE_BYTES`].
pub struct RollingCsvLog {
    dir: PathBuf,
    debug: bool,
    session_stamp: String,
    index: u32,
    file: Option<File>,
    bytes_written: u64,
}

impl RollingCsvLog {
    /// Build a writer rooted at `dir`, not yet opened. Call [`Self::open`]
    /// on `StartStream` acknowledgement per spec §6.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            dir: dir.into(),
            debug,
            session_stamp: Local::now().format("%Y%m%d-%H%M%S").to_string(),
            index: 0,
            file: None,
            bytes_written: 0,
        }
    }

    /// Open the first file of this session. Idempotent if already open.
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(Error::Io)?;
        self.open_current_index()
    }

    fn current_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}-{}.csv", self.session_stamp, self.index))
    }

    fn open_current_index(&mut self) -> Result<()> {
        let path = self.current_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        self.bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(file);
        Ok(())
    }

    /// Append one record, rotating to a new file first if the current one
    /// has exceeded [`CSV_ROTATE_BYTES`].
    pub fn append(&mut self, record: SampleRecord) -> Result<()> {
        if self.file.is_none() {
            self.open()?;
        }
        if self.bytes_written >= CSV_ROTATE_BYTES {
            self.index += 1;
            self.open_current_index()?;
        }
        let line = record.to_line(self.debug);
        if let Some(file) = self.file.as_mut() {
            file.write_all(line.as_bytes()).map_err(Error::Io)?;
            self.bytes_written += line.len() as u64;
        }
        Ok(())
    }

    /// Close the current file. Called on `StopStream` acknowledgement and on
    /// shutdown.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Path of the file currently being written, if open.
    #[must_use]
    pub fn current_file_path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|_| self.current_path())
    }

    /// Directory this log writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(device_timestamp: u32) -> SampleRecord {
        SampleRecord {
            host_timestamp_ms: 0,
            device_timestamp,
            microvolts: 1.5,
            seizure_detected: false,
            therapy_on: false,
        }
    }

    #[test]
    fn open_creates_directory_and_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs");
        let mut log = RollingCsvLog::new(&path, false);
        log.open().unwrap();
        assert!(log.current_file_path().unwrap().exists());
    }

    #[test]
    fn append_writes_normal_format_without_host_timestamp() {
        let dir = tempdir().unwrap();
        let mut log = RollingCsvLog::new(dir.path(), false);
        log.open().unwrap();
        log.append(record(42)).unwrap();
        let path = log.current_file_path().unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "42,1.5,false,false\n");
    }

    #[test]
    fn append_writes_debug_format_with_host_timestamp() {
        let dir = tempdir().unwrap();
        let mut log = RollingCsvLog::new(dir.path(), true);
        log.open().unwrap();
        log.append(record(42)).unwrap();
        let path = log.current_file_path().unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "0,42,1.5,false,false\n");
    }

    #[test]
    fn rotates_to_new_index_past_size_threshold() {
        let dir = tempdir().unwrap();
        let mut log = RollingCsvLog::new(dir.path(), false);
        log.open().unwrap();
        log.bytes_written = CSV_ROTATE_BYTES; // force rotation on next append
        log.append(record(1)).unwrap();
        assert_eq!(log.index, 1);
    }

    #[test]
    fn close_then_append_reopens_a_file() {
        let dir = tempdir().unwrap();
        let mut log = RollingCsvLog::new(dir.path(), false);
        log.open().unwrap();
        log.close();
        assert!(log.current_file_path().is_none());
        log.append(record(7)).unwrap();
        assert!(log.current_file_path().is_some());
    }
}
