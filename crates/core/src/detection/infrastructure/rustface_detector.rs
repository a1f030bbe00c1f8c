use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::detection::domain::cascade_detector::{CascadeDetector, RawDetection};
use crate::shared::constants::DEFAULT_MIN_FACE_SIZE;

/// Tuning for the SeetaFace funnel cascade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    /// Smallest face side, in pixels, the pyramid searches for.
    pub min_face_size: u32,
    /// Score a window must reach to count as a face. Higher is stricter.
    pub score_thresh: f64,
    /// Ratio between successive pyramid levels, in (0, 1).
    pub pyramid_scale_factor: f32,
    pub window_step: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            score_thresh: 2.0,
            // One pyramid level per 15% scale step.
            pyramid_scale_factor: 0.87,
            window_step: 4,
        }
    }
}

/// Cascade backed by the `rustface` crate (SeetaFace engine).
///
/// The model is parsed once; a detector is instantiated per call because
/// `rustface` detectors are not `Send`.
pub struct RustfaceDetector {
    model: rustface::Model,
    params: CascadeParams,
}

impl RustfaceDetector {
    pub fn new(model_path: &Path, params: CascadeParams) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(model_path)
            .map_err(|e| format!("cannot open cascade model {}: {e}", model_path.display()))?;
        let model = rustface::read_model(BufReader::new(file))?;
        log::debug!("Loaded cascade model {}", model_path.display());
        Ok(Self { model, params })
    }
}

impl CascadeDetector for RustfaceDetector {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        if gray.len() != width as usize * height as usize {
            return Err(format!(
                "luma buffer is {} bytes, expected {}x{}",
                gray.len(),
                width,
                height
            )
            .into());
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.params.min_face_size);
        detector.set_score_thresh(self.params.score_thresh);
        detector.set_pyramid_scale_factor(self.params.pyramid_scale_factor);
        detector.set_slide_window_step(self.params.window_step, self.params.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));
        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                RawDetection {
                    x: bbox.x() as i64,
                    y: bbox.y() as i64,
                    width: bbox.width() as i64,
                    height: bbox.height() as i64,
                    score: face.score(),
                }
            })
            .collect())
    }
}
