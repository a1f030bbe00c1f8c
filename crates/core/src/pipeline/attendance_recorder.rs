use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::recognition::domain::known_identity_set::IdentityLabel;
use crate::shared::face_candidate::FaceCandidate;

/// One sighting of a known person, in full-frame coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttendanceEvent {
    pub label: IdentityLabel,
    pub timestamp: DateTime<Utc>,
    pub frame_index: usize,
    pub location: FaceCandidate,
    pub distance: f64,
}

/// Receives every resolved, non-Unknown detection.
///
/// Storage and deduplication are up to the implementation.
pub trait AttendanceRecorder: Send {
    fn record(&mut self, event: &AttendanceEvent) -> Result<(), Box<dyn std::error::Error>>;

    /// Flush buffered events. Called once when the session stops.
    fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}

/// Recorder that drops every event.
pub struct NullAttendanceRecorder;

impl AttendanceRecorder for NullAttendanceRecorder {
    fn record(&mut self, _event: &AttendanceEvent) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
