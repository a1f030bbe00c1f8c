use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, FrameSourceError, SourceId};

/// Pulls RGB frames from a camera, video file, or network stream via
/// ffmpeg-next (libavformat + libavdevice + libavcodec).
pub struct FfmpegFrameSource {
    source_id: SourceId,
    state: Option<DecodeState>,
}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    flushing: bool,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            state: None,
        }
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    fn unavailable(&self, reason: impl ToString) -> FrameSourceError {
        FrameSourceError::Unavailable {
            source_id: self.source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    fn open_input(&self) -> Result<ffmpeg_next::format::context::Input, FrameSourceError> {
        match &self.source_id {
            SourceId::File(path) => {
                if !path.exists() {
                    return Err(self.unavailable("no such file"));
                }
                ffmpeg_next::format::input(path).map_err(|e| self.unavailable(e))
            }
            SourceId::Url(url) => {
                ffmpeg_next::format::network::init();
                ffmpeg_next::format::input(url).map_err(|e| self.unavailable(e))
            }
            SourceId::Camera(index) => self.open_camera(*index),
        }
    }

    fn open_camera(&self, index: u32) -> Result<ffmpeg_next::format::context::Input, FrameSourceError> {
        ffmpeg_next::device::register_all();
        let (format_name, device) = camera_device(index);
        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == format_name)
            .ok_or_else(|| self.unavailable(format!("{format_name} capture not available")))?;

        let context = ffmpeg_next::format::open_with(
            &device,
            &format,
            ffmpeg_next::Dictionary::new(),
        )
        .map_err(|e| self.unavailable(e))?;
        match context {
            ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
            ffmpeg_next::format::context::Context::Output(_) => {
                Err(self.unavailable("device opened as output"))
            }
        }
    }
}

/// Capture backend and device path for a camera index on this platform.
fn camera_device(index: u32) -> (&'static str, String) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", format!("{index}"))
    }
    #[cfg(target_os = "windows")]
    {
        ("vfwcap", format!("{index}"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("video4linux2,v4l2", format!("/dev/video{index}"))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<VideoMetadata, FrameSourceError> {
        ffmpeg_next::init().map_err(|e| self.unavailable(e))?;
        let ictx = self.open_input()?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| self.unavailable("no video stream"))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.unavailable(e))?;
        let decoder = codec_ctx.decoder().video().map_err(|e| self.unavailable(e))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = if self.source_id.is_live() {
            0
        } else {
            stream.frames().max(0) as usize
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| self.unavailable(e))?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source: self.source_id.to_string(),
        };
        log::info!(
            "Opened {} ({}x{} @ {:.1} fps)",
            metadata.source,
            width,
            height,
            fps
        );

        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
        });
        Ok(metadata)
    }

    fn read(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let state = self.state.as_mut().ok_or(FrameSourceError::NotOpened)?;
        state.next_frame()
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Released {}", self.source_id);
        }
    }
}

impl DecodeState {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    continue;
                }
                Err(e) => return Err(FrameSourceError::Transient(e.to_string())),
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                return Err(FrameSourceError::Transient(e.to_string()));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| FrameSourceError::Transient(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row padding ffmpeg may add.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    /// Encode `num_frames` solid-gray MPEG-4 frames to `path`.
    pub(crate) fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32) {
        ffmpeg_next::init().unwrap();
        let fps = 25;
        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg_next::codec::encoder::video::Encoder,
                     octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = ((i * 40) % 256) as u8;
            rgb.data_mut(0).fill(value);
            let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            drain(&mut encoder, &mut octx);
        }
        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn video(dir: &Path, frames: usize) -> PathBuf {
        let path = dir.join("clip.mp4");
        create_test_video(&path, frames, 160, 120);
        path
    }

    #[test]
    fn test_open_file_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = video(dir.path(), 5);
        let mut source = FfmpegFrameSource::new(SourceId::File(path.clone()));
        let meta = source.open().unwrap();
        assert_eq!((meta.width, meta.height), (160, 120));
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source, path.display().to_string());
    }

    #[test]
    fn test_reads_every_frame_then_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FfmpegFrameSource::new(SourceId::File(video(dir.path(), 5)));
        source.open().unwrap();

        let mut indices = Vec::new();
        while let Some(frame) = source.read().unwrap() {
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let mut source = FfmpegFrameSource::new(SourceId::File("/nonexistent/clip.mp4".into()));
        assert!(matches!(
            source.open(),
            Err(FrameSourceError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_absent_camera_is_unavailable() {
        let mut source = FfmpegFrameSource::new(SourceId::Camera(250));
        assert!(matches!(
            source.open(),
            Err(FrameSourceError::Unavailable { .. })
        ));
        assert!(matches!(source.read(), Err(FrameSourceError::NotOpened)));
    }

    #[test]
    fn test_read_before_open_errors() {
        let mut source = FfmpegFrameSource::new(SourceId::Camera(0));
        assert!(matches!(source.read(), Err(FrameSourceError::NotOpened)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FfmpegFrameSource::new(SourceId::File(video(dir.path(), 1)));
        source.open().unwrap();
        source.release();
        source.release();
        assert!(matches!(source.read(), Err(FrameSourceError::NotOpened)));
    }
}
