pub mod attendance_recorder;
pub mod frame_recognizer;
pub mod frame_scheduler;
pub mod infrastructure;
pub mod pipeline_logger;
pub mod realtime_pipeline;
pub mod recognition_job;
