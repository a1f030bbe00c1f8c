/// Raw rectangle reported by a cascade, before any geometric filtering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub score: f64,
}

impl RawDetection {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            score: 0.0,
        }
    }
}

/// Domain interface for a frontal-face cascade running on luma pixels.
///
/// `gray` holds `width * height` bytes in row-major order.
pub trait CascadeDetector: Send {
    fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>>;
}
