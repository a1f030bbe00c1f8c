use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single frame to an image file; the format follows the
/// path's extension.
pub trait ImageWriter: Send {
    /// Writes a frame to `path`, optionally resampled to `size`, creating
    /// parent directories as needed.
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
