use crate::pipeline::attendance_recorder::{AttendanceEvent, AttendanceRecorder};

/// Writes one `info` line per sighting through the `log` facade.
#[derive(Default)]
pub struct LogAttendanceRecorder {
    recorded: usize,
}

impl LogAttendanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl AttendanceRecorder for LogAttendanceRecorder {
    fn record(&mut self, event: &AttendanceEvent) -> Result<(), Box<dyn std::error::Error>> {
        let b = &event.location;
        log::info!(
            "Attendance: {} at {} (frame {}, box t={} r={} b={} l={}, distance {:.3})",
            event.label,
            event.timestamp.to_rfc3339(),
            event.frame_index,
            b.top,
            b.right,
            b.bottom,
            b.left,
            event.distance
        );
        self.recorded += 1;
        Ok(())
    }
}
