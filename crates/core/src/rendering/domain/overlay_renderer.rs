use crate::recognition::domain::detection_result::DetectionResult;
use crate::shared::frame::Frame;

/// Domain interface for annotating a frame with detection results.
///
/// Implementations draw in place (`&mut Frame`) to avoid allocation.
pub trait OverlayRenderer: Send {
    fn render(
        &self,
        frame: &mut Frame,
        results: &[DetectionResult],
    ) -> Result<(), Box<dyn std::error::Error>>;
}
