use crate::detection::domain::cascade_detector::{CascadeDetector, RawDetection};
use crate::shared::constants::*;
use crate::shared::face_candidate::FaceCandidate;
use crate::shared::frame::Frame;
use crate::shared::settings::Settings;

/// Geometric acceptance rules applied to raw cascade output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatorParams {
    pub min_face_size: u32,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub margin_fraction: f64,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            min_aspect_ratio: DEFAULT_MIN_ASPECT_RATIO,
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
            margin_fraction: DEFAULT_MARGIN_FRACTION,
        }
    }
}

impl From<&Settings> for LocatorParams {
    fn from(s: &Settings) -> Self {
        Self {
            min_face_size: s.min_face_size,
            min_aspect_ratio: s.min_aspect_ratio,
            max_aspect_ratio: s.max_aspect_ratio,
            margin_fraction: s.margin_fraction,
        }
    }
}

// Tolerance for ratios that land exactly on a bound.
const ASPECT_EPSILON: f64 = 1e-9;

/// Finds plausible frontal faces in a frame.
///
/// Wraps a cascade and drops rectangles that are too small or whose
/// width/height ratio is implausible, then pads each survivor by a margin
/// proportional to its width and clamps it to the frame.
pub struct FaceLocator {
    cascade: Box<dyn CascadeDetector>,
    params: LocatorParams,
}

impl FaceLocator {
    pub fn new(cascade: Box<dyn CascadeDetector>, params: LocatorParams) -> Self {
        Self { cascade, params }
    }

    /// Candidates in `frame` coordinates. Never fails: a cascade error is
    /// logged and treated as "no faces".
    pub fn locate(&mut self, frame: &Frame) -> Vec<FaceCandidate> {
        if frame.is_empty() {
            return Vec::new();
        }
        let gray = frame.to_grayscale();
        let raw = match self.cascade.detect(&gray, frame.width(), frame.height()) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Cascade failed on frame {}: {e}", frame.index());
                return Vec::new();
            }
        };

        raw.iter()
            .filter(|r| self.accepts(r))
            .map(|r| self.pad(r, frame.width(), frame.height()))
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn accepts(&self, r: &RawDetection) -> bool {
        let min = self.params.min_face_size as i64;
        if r.width < min || r.height < min {
            return false;
        }
        let ratio = r.width as f64 / r.height as f64;
        ratio >= self.params.min_aspect_ratio - ASPECT_EPSILON
            && ratio <= self.params.max_aspect_ratio + ASPECT_EPSILON
    }

    fn pad(&self, r: &RawDetection, frame_width: u32, frame_height: u32) -> FaceCandidate {
        let margin = (r.width as f64 * self.params.margin_fraction) as i64;
        FaceCandidate::from_xywh(
            r.x - margin,
            r.y - margin,
            r.width + 2 * margin,
            r.height + 2 * margin,
            frame_width,
            frame_height,
        )
    }
}
