use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::pipeline::attendance_recorder::{AttendanceEvent, AttendanceRecorder};

/// Appends one JSON object per sighting to a file.
///
/// Existing content is kept, so several sessions can share one log.
/// Timestamps are RFC 3339 in UTC.
pub struct JsonLinesAttendanceRecorder {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesAttendanceRecorder {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AttendanceRecorder for JsonLinesAttendanceRecorder {
    fn record(&mut self, event: &AttendanceEvent) -> Result<(), Box<dyn std::error::Error>> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.out.flush()?;
        Ok(())
    }
}
