use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::detection::domain::face_locator::FaceLocator;
use crate::enrollment::enrollment_builder::is_image;
use crate::shared::constants::{DEFAULT_CAPTURE_COUNT, DEFAULT_CROP_SIZE};
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};
use crate::video::domain::image_writer::ImageWriter;

const CROP_PREFIX: &str = "face_";
const CROP_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("invalid person name {0:?}")]
    InvalidLabel(String),
    #[error(transparent)]
    FrameSourceUnavailable(#[from] FrameSourceError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to save {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStop {
    /// The person's folder reached the requested number of photos.
    Quota,
    SourceExhausted,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureReport {
    pub directory: PathBuf,
    pub saved: usize,
    pub total_in_folder: usize,
    pub frames_read: usize,
    pub stop: CaptureStop,
}

/// Grows a person's enrollment folder with face crops from a live source.
///
/// Every accepted candidate on every frame is saved as a square crop under
/// `<corpus>/<label>/face_<n>.jpg`. Numbering continues after the highest
/// existing `face_<n>`; capture stops once the folder holds `max_count`
/// images. The known-face model is not rebuilt.
pub struct CaptureFacesUseCase {
    source: Box<dyn FrameSource>,
    locator: FaceLocator,
    writer: Box<dyn ImageWriter>,
    crop_size: u32,
    max_count: usize,
    on_progress: Option<Box<dyn Fn(usize, usize) + Send>>,
}

impl CaptureFacesUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        locator: FaceLocator,
        writer: Box<dyn ImageWriter>,
        on_progress: Option<Box<dyn Fn(usize, usize) + Send>>,
    ) -> Self {
        Self {
            source,
            locator,
            writer,
            crop_size: DEFAULT_CROP_SIZE,
            max_count: DEFAULT_CAPTURE_COUNT,
            on_progress,
        }
    }

    pub fn with_crop_size(mut self, crop_size: u32) -> Self {
        self.crop_size = crop_size.max(1);
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn execute(
        &mut self,
        corpus_root: &Path,
        label: &str,
        cancel: &AtomicBool,
    ) -> Result<CaptureReport, CaptureError> {
        validate_label(label)?;
        let directory = corpus_root.join(label);
        if directory.is_dir() {
            log::info!("Adding photos to existing folder {}", directory.display());
        }
        fs::create_dir_all(&directory).map_err(|source| CaptureError::Io {
            path: directory.clone(),
            source,
        })?;
        let (existing, mut next_number) = scan_folder(&directory)?;

        if let Err(e) = self.source.open() {
            self.source.release();
            return Err(e.into());
        }
        let result = self.capture_loop(&directory, existing, &mut next_number, cancel);
        self.source.release();

        let report = result?;
        log::info!(
            "Captured {} new photos of {label} ({} in folder); rebuild the model to use them",
            report.saved,
            report.total_in_folder
        );
        Ok(report)
    }

    fn capture_loop(
        &mut self,
        directory: &Path,
        existing: usize,
        next_number: &mut usize,
        cancel: &AtomicBool,
    ) -> Result<CaptureReport, CaptureError> {
        let mut report = CaptureReport {
            directory: directory.to_path_buf(),
            saved: 0,
            total_in_folder: existing,
            frames_read: 0,
            stop: CaptureStop::Quota,
        };
        if existing >= self.max_count {
            log::info!("Folder already holds {existing} photos");
            return Ok(report);
        }
        log::info!("Starting capture ({existing} photos already present)");

        loop {
            if cancel.load(Ordering::Relaxed) {
                report.stop = CaptureStop::Cancelled;
                return Ok(report);
            }
            let frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    report.stop = CaptureStop::SourceExhausted;
                    return Ok(report);
                }
                Err(e) => {
                    log::warn!("Skipping frame: {e}");
                    continue;
                }
            };
            report.frames_read += 1;

            for candidate in self.locator.locate(&frame) {
                let path = directory.join(format!("{CROP_PREFIX}{next_number}.{CROP_EXTENSION}"));
                self.writer
                    .write(
                        &path,
                        &frame.crop(&candidate),
                        Some((self.crop_size, self.crop_size)),
                    )
                    .map_err(|e| CaptureError::Write {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                *next_number += 1;
                report.saved += 1;
                report.total_in_folder += 1;
                if let Some(ref callback) = self.on_progress {
                    callback(report.total_in_folder, self.max_count);
                }
                if report.total_in_folder >= self.max_count {
                    report.stop = CaptureStop::Quota;
                    return Ok(report);
                }
            }
        }
    }
}

fn validate_label(label: &str) -> Result<(), CaptureError> {
    let trimmed = label.trim();
    let bad = trimmed.is_empty()
        || trimmed != label
        || label == "."
        || label == ".."
        || label.contains(['/', '\\']);
    if bad {
        return Err(CaptureError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

/// Number of images already in the folder and the next free crop number.
fn scan_folder(directory: &Path) -> Result<(usize, usize), CaptureError> {
    let io_err = |source| CaptureError::Io {
        path: directory.to_path_buf(),
        source,
    };
    let mut images = 0;
    let mut next = 0;
    for entry in fs::read_dir(directory).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() || !is_image(&path) {
            continue;
        }
        images += 1;
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(CROP_PREFIX))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(n) = number {
            next = next.max(n + 1);
        }
    }
    Ok((images, next))
}
