pub mod ffmpeg_frame_source;
pub mod ffmpeg_video_sink;
pub mod image_file_reader;
pub mod image_file_writer;
pub mod snapshot_sink;
