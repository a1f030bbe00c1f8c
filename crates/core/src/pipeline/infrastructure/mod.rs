pub mod json_lines_attendance_recorder;
pub mod log_attendance_recorder;
