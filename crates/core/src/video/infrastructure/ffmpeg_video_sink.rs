use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_sink::FrameSink;

// Live sources often report no frame rate.
const FALLBACK_FPS: i32 = 30;

/// Records annotated frames to an MPEG-4 video file via ffmpeg-next.
///
/// Frames are encoded into a `.part.<ext>` sibling which replaces the
/// output on `close`, so the output path only ever holds a finished file.
pub struct FfmpegVideoSink {
    output_path: PathBuf,
    encoding: Option<Encoding>,
}

struct Encoding {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    fps: i32,
    frame_count: usize,
    partial_path: PathBuf,
}

// Safety: FfmpegVideoSink is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegVideoSink {}

impl FfmpegVideoSink {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            encoding: None,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Sibling the encoder writes to; keeps the extension so ffmpeg still
    /// picks the container from it.
    fn partial_path(&self) -> PathBuf {
        let ext = self
            .output_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        self.output_path.with_extension(format!("part.{ext}"))
    }
}

impl FrameSink for FfmpegVideoSink {
    fn open(&mut self, metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let partial_path = self.partial_path();
        let mut octx = ffmpeg_next::format::output(&partial_path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost = octx.add_stream(Some(codec))?;
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        let fps = match metadata.fps.round() as i32 {
            f if f > 0 => f,
            _ => FALLBACK_FPS,
        };
        encoder_ctx.set_width(metadata.width);
        encoder_ctx.set_height(metadata.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            metadata.width,
            metadata.height,
            ffmpeg_next::format::Pixel::YUV420P,
            metadata.width,
            metadata.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!("Recording annotated video to {}", self.output_path.display());
        self.encoding = Some(Encoding {
            octx,
            encoder,
            scaler,
            width: metadata.width,
            height: metadata.height,
            fps,
            frame_count: 0,
            partial_path,
        });
        Ok(())
    }

    fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let enc = self.encoding.as_mut().ok_or("FfmpegVideoSink: not opened")?;
        if frame.width() != enc.width || frame.height() != enc.height {
            return Err(format!(
                "frame is {}x{}, sink expects {}x{}",
                frame.width(),
                frame.height(),
                enc.width,
                enc.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            enc.width,
            enc.height,
        );
        let stride = rgb_frame.stride(0);
        let row_bytes = enc.width as usize * 3;
        let dst = rgb_frame.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_bytes).enumerate() {
            dst[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        enc.scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(enc.frame_count as i64));
        enc.encoder.send_frame(&yuv_frame)?;
        enc.write_pending_packets()?;
        enc.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(mut enc) = self.encoding.take() else {
            return Ok(());
        };
        enc.encoder.send_eof()?;
        enc.write_pending_packets()?;
        enc.octx.write_trailer()?;
        drop(enc.octx);
        std::fs::rename(&enc.partial_path, &self.output_path)?;
        log::info!(
            "Wrote {} frames to {}",
            enc.frame_count,
            self.output_path.display()
        );
        Ok(())
    }
}

impl Encoding {
    fn write_pending_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let ost_time_base = self
            .octx
            .stream(0)
            .ok_or("output stream missing")?
            .time_base();
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, self.fps), ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}
