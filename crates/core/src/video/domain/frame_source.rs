use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    /// The source could not be opened at all.
    #[error("frame source {source_id} unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },
    /// A single read failed; later reads may succeed.
    #[error("transient read failure: {0}")]
    Transient(String),
    #[error("frame source read before open")]
    NotOpened,
}

/// Where frames come from: a local camera, a file, or a network stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceId {
    Camera(u32),
    File(PathBuf),
    Url(String),
}

impl SourceId {
    /// Bare integers name a camera, `scheme://` strings a stream, anything
    /// else a file path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(index) = raw.parse::<u32>() {
            return SourceId::Camera(index);
        }
        if raw.contains("://") {
            return SourceId::Url(raw.to_string());
        }
        SourceId::File(PathBuf::from(raw))
    }

    pub fn is_live(&self) -> bool {
        !matches!(self, SourceId::File(_))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Camera(i) => write!(f, "camera {i}"),
            SourceId::File(p) => write!(f, "{}", p.display()),
            SourceId::Url(u) => f.write_str(u),
        }
    }
}

/// Pull-based frame acquisition.
///
/// `read` may block until the next frame arrives. `Ok(None)` marks the end
/// of a finite source. `release` is idempotent.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<VideoMetadata, FrameSourceError>;

    fn read(&mut self) -> Result<Option<Frame>, FrameSourceError>;

    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", SourceId::Camera(0))]
    #[case(" 2 ", SourceId::Camera(2))]
    #[case("rtsp://10.0.0.5/stream", SourceId::Url("rtsp://10.0.0.5/stream".into()))]
    #[case("clips/lobby.mp4", SourceId::File(PathBuf::from("clips/lobby.mp4")))]
    #[case("-1", SourceId::File(PathBuf::from("-1")))]
    fn test_parse(#[case] raw: &str, #[case] expected: SourceId) {
        assert_eq!(SourceId::parse(raw), expected);
    }

    #[test]
    fn test_liveness() {
        assert!(SourceId::Camera(0).is_live());
        assert!(SourceId::Url("http://x/y".into()).is_live());
        assert!(!SourceId::File(PathBuf::from("a.mp4")).is_live());
    }
}
