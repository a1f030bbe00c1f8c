/// Properties of an opened frame source.
///
/// Live sources report `total_frames == 0` since their length is unknown.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source: String,
}

impl VideoMetadata {
    pub fn is_live(&self) -> bool {
        self.total_frames == 0
    }
}
