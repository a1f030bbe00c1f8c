use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use rollcall_core::detection::domain::face_locator::{FaceLocator, LocatorParams};
use rollcall_core::detection::infrastructure::rustface_detector::{CascadeParams, RustfaceDetector};
use rollcall_core::enrollment::capture_faces_use_case::CaptureFacesUseCase;
use rollcall_core::enrollment::enrollment_builder::EnrollmentBuilder;
use rollcall_core::pipeline::attendance_recorder::AttendanceRecorder;
use rollcall_core::pipeline::frame_recognizer::{FrameRecognizer, RecognizerParams};
use rollcall_core::pipeline::frame_scheduler::FrameScheduler;
use rollcall_core::pipeline::infrastructure::json_lines_attendance_recorder::JsonLinesAttendanceRecorder;
use rollcall_core::pipeline::infrastructure::log_attendance_recorder::LogAttendanceRecorder;
use rollcall_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use rollcall_core::pipeline::realtime_pipeline::RealtimePipeline;
use rollcall_core::pipeline::recognition_job::{JobMessage, RecognitionJob};
use rollcall_core::recognition::domain::embedding_provider::EmbeddingProvider;
use rollcall_core::recognition::domain::identity_matcher::IdentityMatcher;
use rollcall_core::recognition::infrastructure::onnx_embedding_provider::OnnxEmbeddingProvider;
use rollcall_core::rendering::infrastructure::box_overlay_renderer::BoxOverlayRenderer;
use rollcall_core::rendering::infrastructure::label_font::find_label_font;
use rollcall_core::shared::constants::{
    CASCADE_MODEL_NAME, CASCADE_MODEL_URL, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL,
};
use rollcall_core::shared::model_resolver::ModelResolver;
use rollcall_core::shared::settings::Settings;
use rollcall_core::storage::model_store::{Freshness, ModelStore};
use rollcall_core::video::domain::frame_sink::{FrameSink, NullFrameSink};
use rollcall_core::video::domain::frame_source::SourceId;
use rollcall_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use rollcall_core::video::infrastructure::ffmpeg_video_sink::FfmpegVideoSink;
use rollcall_core::video::infrastructure::image_file_reader::ImageFileReader;
use rollcall_core::video::infrastructure::image_file_writer::ImageFileWriter;
use rollcall_core::video::infrastructure::snapshot_sink::SnapshotSink;

/// Face enrollment and realtime attendance recognition.
#[derive(Parser)]
#[command(name = "rollcall")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding bundled model weights, checked before downloading.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the known-face model from the enrollment corpus.
    Enroll,

    /// Recognize faces from a camera index, video file or stream URL.
    Recognize {
        /// Camera index (e.g. 0), file path, or stream URL.
        #[arg(default_value = "0")]
        source: String,

        /// Write the annotated stream to this video file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Keep the latest annotated frame in this image file.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Refresh the snapshot every N frames.
        #[arg(long, default_value = "30")]
        snapshot_every: usize,

        /// Append sightings to this JSON Lines file instead of the log.
        #[arg(long)]
        attendance: Option<PathBuf>,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<usize>,

        /// Stop after this many consecutive failed reads.
        #[arg(long)]
        max_read_failures: Option<usize>,
    },

    /// Save face crops of one person from a camera into the corpus.
    Capture {
        /// Name of the person; becomes the folder name.
        name: String,

        /// Camera index (e.g. 0), file path, or stream URL.
        #[arg(default_value = "0")]
        source: String,

        /// Stop once the person's folder holds this many photos.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show what the stored model contains and whether it is out of date.
    Inspect,

    /// Print the effective settings as JSON.
    Config {
        /// Also write them to the settings file.
        #[arg(long)]
        save: bool,
    },
}

/// Per-run overrides for values in the settings file.
#[derive(Args)]
struct Overrides {
    /// Enrollment corpus directory.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Known-face model file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Maximum distance accepted as a match.
    #[arg(long, global = true)]
    tolerance: Option<f64>,

    /// Distance above which a candidate is dropped as noise.
    #[arg(long, global = true)]
    rejection_ceiling: Option<f64>,

    /// Run full recognition every Nth frame.
    #[arg(long, global = true)]
    skip_interval: Option<usize>,

    /// Scale applied to frames before recognition (0-1].
    #[arg(long, global = true)]
    downscale: Option<f64>,

    /// Smallest accepted face side in pixels.
    #[arg(long, global = true)]
    min_face_size: Option<u32>,

    /// Font file for overlay labels.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.corpus {
            settings.corpus_dir = Some(v.clone());
        }
        if let Some(v) = &self.model {
            settings.artifact_path = Some(v.clone());
        }
        if let Some(v) = self.tolerance {
            settings.tolerance = v;
        }
        if let Some(v) = self.rejection_ceiling {
            settings.rejection_ceiling = v;
        }
        if let Some(v) = self.skip_interval {
            settings.skip_interval = v;
        }
        if let Some(v) = self.downscale {
            settings.downscale = v;
        }
        if let Some(v) = self.min_face_size {
            settings.min_face_size = v;
        }
        if let Some(v) = &self.font {
            settings.font_path = Some(v.clone());
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    cli.overrides.apply(&mut settings);
    settings.validate()?;

    let mut resolver = ModelResolver::platform_default()?;
    if let Some(dir) = &cli.models_dir {
        resolver = resolver.with_bundled_dir(dir);
    }

    match cli.command {
        Command::Enroll => run_enroll(&settings, &resolver),
        Command::Recognize {
            source,
            output,
            snapshot,
            snapshot_every,
            attendance,
            max_frames,
            max_read_failures,
        } => {
            if output.is_some() && snapshot.is_some() {
                return Err("--output and --snapshot are mutually exclusive".into());
            }
            if snapshot_every == 0 {
                return Err("--snapshot-every must be at least 1".into());
            }
            let sink: Box<dyn FrameSink> = match (output, snapshot) {
                (Some(path), _) => Box::new(FfmpegVideoSink::new(path)),
                (None, Some(path)) => Box::new(SnapshotSink::new(
                    Box::new(ImageFileWriter::new()),
                    path,
                    snapshot_every,
                )),
                (None, None) => Box::new(NullFrameSink),
            };
            let recorder: Box<dyn AttendanceRecorder> = match attendance {
                Some(path) => Box::new(JsonLinesAttendanceRecorder::open(&path)?),
                None => Box::new(LogAttendanceRecorder::new()),
            };
            run_recognize(
                &settings,
                &resolver,
                SourceId::parse(&source),
                sink,
                recorder,
                max_frames,
                max_read_failures,
            )
        }
        Command::Capture {
            name,
            source,
            count,
        } => run_capture(
            &settings,
            &resolver,
            SourceId::parse(&source),
            &name,
            count.unwrap_or(settings.capture_count),
        ),
        Command::Inspect => run_inspect(&settings),
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if save {
                let path = match &cli.config {
                    Some(path) => {
                        settings.save_to(path)?;
                        path.clone()
                    }
                    None => settings.save()?,
                };
                log::info!("Settings saved to {}", path.display());
            }
            Ok(())
        }
    }
}

fn run_enroll(settings: &Settings, resolver: &ModelResolver) -> Result<(), Box<dyn std::error::Error>> {
    let corpus = corpus_dir(settings)?;
    let store = ModelStore::new(artifact_path(settings)?);

    let locator = build_locator(settings, resolver)?;
    let provider = build_provider(resolver)?;
    let mut builder = EnrollmentBuilder::new(locator, provider, Box::new(ImageFileReader::new()));

    log::info!("Enrolling faces from {}", corpus.display());
    let (set, report) = builder.build_with_report(&corpus)?;
    for skipped in &report.skipped {
        log::warn!(
            "Skipped {} ({}): {:?}",
            skipped.path.display(),
            skipped.label,
            skipped.reason
        );
    }
    store.save(&set)?;
    log::info!(
        "Model written to {} ({} embeddings, {} people, {}/{} images used)",
        store.path().display(),
        set.embedding_count(),
        set.unique_label_count(),
        report.embedded,
        report.images_scanned
    );
    Ok(())
}

fn run_recognize(
    settings: &Settings,
    resolver: &ModelResolver,
    source: SourceId,
    sink: Box<dyn FrameSink>,
    recorder: Box<dyn AttendanceRecorder>,
    max_frames: Option<usize>,
    max_read_failures: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = ModelStore::new(artifact_path(settings)?);
    if let Ok(corpus) = corpus_dir(settings) {
        warn_if_stale(&store, &corpus);
    }
    let known = store.load()?;

    let recognizer = FrameRecognizer::new(
        build_locator(settings, resolver)?,
        build_provider(resolver)?,
        IdentityMatcher::from(settings),
        RecognizerParams::from(settings),
    );
    let pipeline = RealtimePipeline::new(
        Box::new(FfmpegFrameSource::new(source)),
        recognizer,
        Box::new(
            BoxOverlayRenderer::default().with_font(find_label_font(settings.font_path.as_deref())),
        ),
        FrameScheduler::new(settings.skip_interval)?,
    )
    .with_sink(sink)
    .with_recorder(recorder)
    .with_logger(Box::new(StdoutPipelineLogger::default()))
    .with_max_frames(max_frames)
    .with_max_consecutive_failures(max_read_failures);

    let job = RecognitionJob::start(pipeline, known)?;
    let quit = watch_stdin_for_quit();

    loop {
        if quit.load(Ordering::Relaxed) {
            job.cancel();
        }
        match job.messages().recv_timeout(Duration::from_millis(100)) {
            Ok(JobMessage::Started(metadata)) => {
                log::info!("Reading {} (type q + Enter to stop)", metadata.source);
            }
            Ok(JobMessage::Finished(_)) | Ok(JobMessage::Error(_)) => break,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let report = job.join()?;
    log::info!(
        "Stopped ({:?}): {} frames, {} recognized, {} sightings, {} read failures",
        report.stop_reason,
        report.frames_read,
        report.frames_processed,
        report.detections_emitted,
        report.read_failures
    );
    Ok(())
}

fn run_capture(
    settings: &Settings,
    resolver: &ModelResolver,
    source: SourceId,
    name: &str,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let corpus = corpus_dir(settings)?;
    let progress: Box<dyn Fn(usize, usize) + Send> = Box::new(|current, total| {
        eprint!("\rCaptured {current}/{total}");
    });
    let mut capture = CaptureFacesUseCase::new(
        Box::new(FfmpegFrameSource::new(source)),
        build_locator(settings, resolver)?,
        Box::new(ImageFileWriter::new()),
        Some(progress),
    )
    .with_crop_size(settings.crop_size)
    .with_max_count(count);

    log::info!("Capturing {name} (type q + Enter to stop early)");
    let quit = watch_stdin_for_quit();
    let report = capture.execute(&corpus, name, &quit)?;
    eprintln!();
    log::info!(
        "Saved {} photos to {} ({:?}); run `rollcall enroll` to update the model",
        report.saved,
        report.directory.display(),
        report.stop
    );
    Ok(())
}

fn run_inspect(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = ModelStore::new(artifact_path(settings)?);
    let summary = store.describe()?;

    println!("Model:      {}", summary.path.display());
    println!("Created:    {}", summary.created_at.to_rfc3339());
    println!("Size:       {} bytes", summary.file_size);
    println!("Embeddings: {}", summary.embedding_count);
    println!("People:     {}", summary.unique_label_count);
    match summary.dimension {
        Some(d) => println!("Dimension:  {d}"),
        None => println!("Dimension:  -"),
    }
    for (label, count) in &summary.labels {
        println!("  {label}: {count}");
    }

    if let Ok(corpus) = corpus_dir(settings) {
        match store.freshness(&corpus)? {
            Freshness::Stale { newer_files } => {
                println!("Status:     stale ({newer_files} corpus files changed since enrollment)")
            }
            _ => println!("Status:     up to date"),
        }
    }
    Ok(())
}

fn build_locator(
    settings: &Settings,
    resolver: &ModelResolver,
) -> Result<FaceLocator, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {CASCADE_MODEL_NAME}");
    let path = resolver.resolve(
        CASCADE_MODEL_NAME,
        CASCADE_MODEL_URL,
        Some(Box::new(|d: u64, t: u64| download_progress("face detection", d, t))),
    )?;
    let cascade = RustfaceDetector::new(
        &path,
        CascadeParams {
            min_face_size: settings.min_face_size,
            ..CascadeParams::default()
        },
    )?;
    Ok(FaceLocator::new(Box::new(cascade), LocatorParams::from(settings)))
}

fn build_provider(
    resolver: &ModelResolver,
) -> Result<Box<dyn EmbeddingProvider>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let path = resolver.resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        Some(Box::new(|d: u64, t: u64| download_progress("face embedding", d, t))),
    )?;
    Ok(Box::new(OnnxEmbeddingProvider::new(&path)?))
}

fn warn_if_stale(store: &ModelStore, corpus: &Path) {
    match store.freshness(corpus) {
        Ok(Freshness::Stale { newer_files }) => log::warn!(
            "{newer_files} corpus files changed since the model was built; run `rollcall enroll`"
        ),
        Ok(_) => {}
        Err(e) => log::debug!("Could not check model freshness: {e}"),
    }
}

/// Raises the returned flag when the user types `q` on stdin.
fn watch_stdin_for_quit() -> Arc<AtomicBool> {
    let quit = Arc::new(AtomicBool::new(false));
    let quit_clone = quit.clone();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                quit_clone.store(true, Ordering::Relaxed);
                break;
            }
        }
    });
    quit
}

fn artifact_path(settings: &Settings) -> Result<PathBuf, Box<dyn std::error::Error>> {
    settings
        .resolved_artifact_path()
        .ok_or_else(|| "Could not determine model location; pass --model".into())
}

fn corpus_dir(settings: &Settings) -> Result<PathBuf, Box<dyn std::error::Error>> {
    settings
        .resolved_corpus_dir()
        .ok_or_else(|| "Could not determine corpus location; pass --corpus".into())
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}
