use serde::{Deserialize, Serialize};

/// Axis-aligned face box in pixel coordinates of the frame it was found in.
///
/// Edges are half-open: rows `top..bottom`, columns `left..right`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceCandidate {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Build from a signed `(x, y, w, h)` rectangle, clamped to the frame.
    pub fn from_xywh(x: i64, y: i64, w: i64, h: i64, frame_width: u32, frame_height: u32) -> Self {
        let clamp = |v: i64, max: u32| v.clamp(0, max as i64) as u32;
        Self {
            top: clamp(y, frame_height),
            right: clamp(x + w, frame_width),
            bottom: clamp(y + h, frame_height),
            left: clamp(x, frame_width),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn clamped(&self, frame_width: u32, frame_height: u32) -> Self {
        let right = self.right.min(frame_width);
        let bottom = self.bottom.min(frame_height);
        Self {
            top: self.top.min(bottom),
            right,
            bottom,
            left: self.left.min(right),
        }
    }

    /// Map a box found on a resampled frame back to the full frame.
    ///
    /// `sx`/`sy` are the per-axis inverse of the downscale (2.0 for a 0.5
    /// downscale of an even-sized frame).
    pub fn rescaled(&self, sx: f64, sy: f64, frame_width: u32, frame_height: u32) -> Self {
        let x = |v: u32| (v as f64 * sx).round() as i64;
        let y = |v: u32| (v as f64 * sy).round() as i64;
        let (left, top) = (x(self.left), y(self.top));
        Self::from_xywh(
            left,
            top,
            x(self.right) - left,
            y(self.bottom) - top,
            frame_width,
            frame_height,
        )
    }
}
