use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::image_writer::ImageWriter;

/// Overwrites a single image file with every `every`-th annotated frame.
///
/// Lets an external viewer (a browser refreshing the file, a kiosk
/// display) follow a headless session. Each snapshot is written to a
/// `.part.<ext>` sibling and renamed over the target, so readers never see
/// a half-written image.
pub struct SnapshotSink {
    writer: Box<dyn ImageWriter>,
    path: PathBuf,
    every: usize,
    seen: usize,
}

impl SnapshotSink {
    pub fn new(writer: Box<dyn ImageWriter>, path: impl Into<PathBuf>, every: usize) -> Self {
        Self {
            writer,
            path: path.into(),
            every: every.max(1),
            seen: 0,
        }
    }

    fn partial_path(&self) -> PathBuf {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        self.path.with_extension(format!("part.{ext}"))
    }

    fn replace(&self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let partial = self.partial_path();
        self.writer.write(&partial, frame, None)?;
        std::fs::rename(&partial, &self.path)?;
        Ok(())
    }
}

impl FrameSink for SnapshotSink {
    fn open(&mut self, _metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
        self.seen = 0;
        Ok(())
    }

    fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let due = self.seen % self.every == 0;
        self.seen += 1;
        if due {
            self.replace(frame)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
