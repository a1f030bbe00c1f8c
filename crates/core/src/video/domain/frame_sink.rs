use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Receives annotated frames for display or recording.
pub trait FrameSink: Send {
    fn open(&mut self, metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>>;

    fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// Discards every frame. Used for headless attendance runs.
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn open(&mut self, _metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }

    fn show(&mut self, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
