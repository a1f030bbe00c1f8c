use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;

use crate::pipeline::attendance_recorder::{
    AttendanceEvent, AttendanceRecorder, NullAttendanceRecorder,
};
use crate::pipeline::frame_recognizer::FrameRecognizer;
use crate::pipeline::frame_scheduler::FrameScheduler;
use crate::pipeline::pipeline_logger::{
    NullPipelineLogger, PipelineLogger, STAGE_EMIT, STAGE_READ, STAGE_RENDER,
};
use crate::recognition::domain::detection_result::DetectionResult;
use crate::recognition::domain::identity_matcher::Identity;
use crate::recognition::domain::known_identity_set::KnownIdentitySet;
use crate::rendering::domain::overlay_renderer::OverlayRenderer;
use crate::shared::video_metadata::VideoMetadata;
use crate::storage::model_store::{ModelStore, ModelStoreError};
use crate::video::domain::frame_sink::{FrameSink, NullFrameSink};
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot load known faces: {0}")]
    Model(#[from] ModelStoreError),
    #[error(transparent)]
    FrameSourceUnavailable(FrameSourceError),
    #[error("pipeline already started")]
    AlreadyStarted,
    #[error("pipeline not running")]
    NotRunning,
    #[error("frame sink failed: {0}")]
    Sink(String),
    #[error("recognition worker panicked")]
    WorkerPanicked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// Terminal. The frame source has been released.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SourceExhausted,
    FrameLimit,
    ReadFailures,
}

/// Counters for one finished session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub frames_read: usize,
    pub frames_processed: usize,
    pub read_failures: usize,
    pub detections_emitted: usize,
    pub stop_reason: StopReason,
}

/// The frame loop: acquire, recognize every N-th frame, render, emit.
///
/// Lifecycle is `Idle -> Running -> Stopped`. [`start`](Self::start) opens
/// the source and takes the known set for the whole session;
/// [`run`](Self::run) loops until cancelled or the source runs dry and
/// always leaves the pipeline `Stopped` with the source released.
pub struct RealtimePipeline {
    source: Box<dyn FrameSource>,
    recognizer: FrameRecognizer,
    renderer: Box<dyn OverlayRenderer>,
    sink: Box<dyn FrameSink>,
    recorder: Box<dyn AttendanceRecorder>,
    logger: Box<dyn PipelineLogger>,
    scheduler: FrameScheduler,
    state: PipelineState,
    known: Option<KnownIdentitySet>,
    metadata: Option<VideoMetadata>,
    last_results: Vec<DetectionResult>,
    max_frames: Option<usize>,
    max_consecutive_failures: Option<usize>,
}

impl RealtimePipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        recognizer: FrameRecognizer,
        renderer: Box<dyn OverlayRenderer>,
        scheduler: FrameScheduler,
    ) -> Self {
        Self {
            source,
            recognizer,
            renderer,
            sink: Box::new(NullFrameSink),
            recorder: Box::new(NullAttendanceRecorder),
            logger: Box::new(NullPipelineLogger),
            scheduler,
            state: PipelineState::Idle,
            known: None,
            metadata: None,
            last_results: Vec::new(),
            max_frames: None,
            max_consecutive_failures: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn AttendanceRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Stop after this many frames have been read.
    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Stop once this many reads in a row have failed. Unlimited by default.
    pub fn with_max_consecutive_failures(mut self, limit: Option<usize>) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    /// Load the known set from `store`, then [`start`](Self::start).
    ///
    /// A missing or corrupt artifact keeps the pipeline `Idle`.
    pub fn start_from_store(&mut self, store: &ModelStore) -> Result<VideoMetadata, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyStarted);
        }
        let known = store.load()?;
        self.start(known)
    }

    /// Open the frame source and sink and enter `Running`.
    pub fn start(&mut self, known: KnownIdentitySet) -> Result<VideoMetadata, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyStarted);
        }
        let metadata = match self.source.open() {
            Ok(m) => m,
            Err(e) => {
                self.source.release();
                return Err(PipelineError::FrameSourceUnavailable(e));
            }
        };
        if let Err(e) = self.sink.open(&metadata) {
            self.source.release();
            return Err(PipelineError::Sink(e.to_string()));
        }

        log::info!(
            "Recognizing {} ({}x{} @ {:.1} fps) against {} embeddings of {} people",
            metadata.source,
            metadata.width,
            metadata.height,
            metadata.fps,
            known.embedding_count(),
            known.unique_label_count()
        );
        if known.is_empty() {
            log::warn!("Known face set is empty; every face will be reported as Unknown");
        }

        self.known = Some(known);
        self.metadata = Some(metadata.clone());
        self.scheduler.reset();
        self.last_results.clear();
        self.state = PipelineState::Running;
        Ok(metadata)
    }

    /// Run until `cancel` is set, the source is exhausted, or a limit is hit.
    ///
    /// `cancel` is checked before every read. Transient read failures skip
    /// the iteration. The pipeline is `Stopped` on return, error or not.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<SessionReport, PipelineError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning);
        }
        let mut report = SessionReport {
            frames_read: 0,
            frames_processed: 0,
            read_failures: 0,
            detections_emitted: 0,
            stop_reason: StopReason::Cancelled,
        };
        let outcome = self.run_loop(cancel, &mut report);
        self.stop();

        let stop_reason = outcome?;
        report.stop_reason = stop_reason;
        log::info!(
            "Session stopped ({stop_reason:?}): {} frames read, {} processed, {} sightings",
            report.frames_read,
            report.frames_processed,
            report.detections_emitted
        );
        Ok(report)
    }

    fn run_loop(
        &mut self,
        cancel: &AtomicBool,
        report: &mut SessionReport,
    ) -> Result<StopReason, PipelineError> {
        let Some(known) = self.known.as_ref() else {
            return Err(PipelineError::NotRunning);
        };
        let total = self.metadata.as_ref().map_or(0, |m| m.total_frames);
        let mut consecutive_failures = 0;

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(StopReason::Cancelled);
            }
            if self.max_frames.is_some_and(|max| report.frames_read >= max) {
                return Ok(StopReason::FrameLimit);
            }

            let t_read = Instant::now();
            let mut frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(StopReason::SourceExhausted),
                Err(e) => {
                    report.read_failures += 1;
                    consecutive_failures += 1;
                    log::warn!("Skipping frame: {e}");
                    if self
                        .max_consecutive_failures
                        .is_some_and(|limit| consecutive_failures >= limit)
                    {
                        log::error!("Giving up after {consecutive_failures} failed reads");
                        return Ok(StopReason::ReadFailures);
                    }
                    continue;
                }
            };
            consecutive_failures = 0;
            self.logger
                .timing(STAGE_READ, t_read.elapsed().as_secs_f64() * 1000.0);
            report.frames_read += 1;
            self.logger.progress(report.frames_read, total);

            let is_process_frame = self.scheduler.advance();
            if is_process_frame {
                self.last_results =
                    self.recognizer
                        .recognize(&frame, known, self.logger.as_mut());
                report.frames_processed += 1;
                if self.last_results.is_empty() {
                    log::debug!("Frame {}: no faces", frame.index());
                }
            }

            let t_render = Instant::now();
            if let Err(e) = self.renderer.render(&mut frame, &self.last_results) {
                log::warn!("Frame {}: overlay failed: {e}", frame.index());
            }
            self.sink
                .show(&frame)
                .map_err(|e| PipelineError::Sink(e.to_string()))?;
            self.logger
                .timing(STAGE_RENDER, t_render.elapsed().as_secs_f64() * 1000.0);

            if is_process_frame {
                let t_emit = Instant::now();
                report.detections_emitted +=
                    emit(self.recorder.as_mut(), &self.last_results, frame.index());
                self.logger
                    .timing(STAGE_EMIT, t_emit.elapsed().as_secs_f64() * 1000.0);
            }
        }
    }

    /// Release the source and close the sink. Idempotent.
    fn stop(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.source.release();
        if self.state == PipelineState::Running {
            if let Err(e) = self.sink.close() {
                log::warn!("Failed to close frame sink: {e}");
            }
            if let Err(e) = self.recorder.flush() {
                log::warn!("Failed to flush attendance records: {e}");
            }
            self.logger.summary();
        }
        self.known = None;
        self.state = PipelineState::Stopped;
    }
}

impl Drop for RealtimePipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            self.stop();
        }
    }
}

/// Forward known identities to the recorder. Returns how many were accepted.
fn emit(
    recorder: &mut dyn AttendanceRecorder,
    results: &[DetectionResult],
    frame_index: usize,
) -> usize {
    let timestamp = Utc::now();
    let mut emitted = 0;
    for result in results {
        let Identity::Known(label) = &result.identity else {
            continue;
        };
        let event = AttendanceEvent {
            label: label.clone(),
            timestamp,
            frame_index,
            location: result.candidate,
            distance: result.distance,
        };
        match recorder.record(&event) {
            Ok(()) => emitted += 1,
            Err(e) => log::warn!("Failed to record sighting of {label}: {e}"),
        }
    }
    emitted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detection::domain::cascade_detector::RawDetection;
    use crate::detection::domain::face_locator::{FaceLocator, LocatorParams};
    use crate::pipeline::frame_recognizer::tests::{
        known_set, textured_frame, FixedCascade, FixedProvider,
    };
    use crate::pipeline::frame_recognizer::RecognizerParams;
    use crate::recognition::domain::identity_matcher::IdentityMatcher;
    use crate::rendering::infrastructure::box_overlay_renderer::{
        BoxOverlayRenderer, KNOWN_COLOR, UNKNOWN_COLOR,
    };
    use crate::shared::frame::Frame;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    pub(crate) enum Step {
        Frame(Frame),
        Fail,
    }

    pub(crate) struct ScriptedSource {
        pub steps: VecDeque<Step>,
        pub open_fails: bool,
        pub released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        pub(crate) fn frames(count: usize) -> Self {
            Self::new(
                (0..count)
                    .map(|i| Step::Frame(textured_frame(400, 400, i)))
                    .collect(),
            )
        }

        pub(crate) fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                open_fails: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn open(&mut self) -> Result<VideoMetadata, FrameSourceError> {
            if self.open_fails {
                return Err(FrameSourceError::Unavailable {
                    source_id: "camera 9".into(),
                    reason: "no such device".into(),
                });
            }
            Ok(VideoMetadata {
                width: 400,
                height: 400,
                fps: 30.0,
                total_frames: self.steps.len(),
                codec: "raw".into(),
                source: "scripted".into(),
            })
        }

        fn read(&mut self) -> Result<Option<Frame>, FrameSourceError> {
            match self.steps.pop_front() {
                Some(Step::Frame(f)) => Ok(Some(f)),
                Some(Step::Fail) => Err(FrameSourceError::Transient("glitch".into())),
                None => Ok(None),
            }
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Keeps every shown frame; optionally raises `cancel` after N frames.
    struct RecordingSink {
        shown: Arc<Mutex<Vec<Frame>>>,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
        closed: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                shown: Arc::new(Mutex::new(Vec::new())),
                cancel_after: None,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn open(&mut self, _metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }

        fn show(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            let mut shown = self.shown.lock().unwrap();
            shown.push(frame.clone());
            if let Some((n, flag)) = &self.cancel_after {
                if shown.len() >= *n {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn open(&mut self, _metadata: &VideoMetadata) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }

        fn show(&mut self, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("disk full".into())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingRecorder {
        pub events: Arc<Mutex<Vec<AttendanceEvent>>>,
        pub flushed: Arc<AtomicBool>,
    }

    impl AttendanceRecorder for RecordingRecorder {
        fn record(&mut self, event: &AttendanceEvent) -> Result<(), Box<dyn std::error::Error>> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // --- Helpers ---

    pub(crate) fn pipeline_with(
        source: impl FrameSource + 'static,
        provider: FixedProvider,
        skip_interval: usize,
    ) -> RealtimePipeline {
        let locator = FaceLocator::new(
            Box::new(FixedCascade(vec![RawDetection::new(50, 50, 80, 80)])),
            LocatorParams::default(),
        );
        let recognizer = FrameRecognizer::new(
            locator,
            Box::new(provider),
            IdentityMatcher::new(0.5, 0.8),
            RecognizerParams::default(),
        );
        RealtimePipeline::new(
            Box::new(source),
            recognizer,
            Box::new(BoxOverlayRenderer::default()),
            FrameScheduler::new(skip_interval).unwrap(),
        )
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let offset = ((y * frame.width() + x) * 3) as usize;
        let d = frame.data();
        [d[offset], d[offset + 1], d[offset + 2]]
    }

    fn not_cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    // --- Tests ---

    #[test]
    fn test_process_frames_follow_skip_interval_and_results_carry_forward() {
        let provider = FixedProvider::returning(&[0.1, 0.0]);
        let calls = provider.calls.clone();
        let sink = RecordingSink::new();
        let shown = sink.shown.clone();
        let recorder = RecordingRecorder::default();
        let events = recorder.events.clone();

        let mut pipeline = pipeline_with(ScriptedSource::frames(7), provider, 3)
            .with_sink(Box::new(sink))
            .with_recorder(Box::new(recorder));
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(report.frames_read, 7);
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.detections_emitted, 2);
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let shown = shown.lock().unwrap();
        assert_eq!(shown.len(), 7);
        // box top edge at y=84; nothing before the first process frame
        assert_ne!(pixel(&shown[0], 100, 84), KNOWN_COLOR);
        assert_ne!(pixel(&shown[1], 100, 84), KNOWN_COLOR);
        for frame in &shown[2..] {
            assert_eq!(pixel(frame, 100, 84), KNOWN_COLOR);
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].label, "Ana");
        assert_eq!(events[0].frame_index, 2);
        assert_eq!(events[1].frame_index, 5);
    }

    #[test]
    fn test_unknown_faces_are_drawn_but_never_emitted() {
        let sink = RecordingSink::new();
        let shown = sink.shown.clone();
        let recorder = RecordingRecorder::default();
        let events = recorder.events.clone();

        let mut pipeline = pipeline_with(
            ScriptedSource::frames(3),
            FixedProvider::returning(&[1.5, 0.0]),
            1,
        )
        .with_sink(Box::new(sink))
        .with_recorder(Box::new(recorder));
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(report.detections_emitted, 0);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(pixel(&shown.lock().unwrap()[0], 100, 84), UNKNOWN_COLOR);
    }

    #[test]
    fn test_transient_read_failure_skips_iteration() {
        let source = ScriptedSource::new(vec![
            Step::Frame(textured_frame(400, 400, 0)),
            Step::Fail,
            Step::Frame(textured_frame(400, 400, 1)),
        ]);
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1);
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(report.frames_read, 2);
        assert_eq!(report.read_failures, 1);
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.stop_reason, StopReason::SourceExhausted);
    }

    #[test]
    fn test_consecutive_failure_limit_stops_session() {
        let source = ScriptedSource::new(vec![Step::Fail, Step::Fail, Step::Fail, Step::Fail]);
        let released = source.released.clone();
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1)
            .with_max_consecutive_failures(Some(3));
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(report.stop_reason, StopReason::ReadFailures);
        assert_eq!(report.read_failures, 3);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let source = ScriptedSource::frames(5);
        let released = source.released.clone();
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1);
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&AtomicBool::new(true)).unwrap();

        assert_eq!(report.frames_read, 0);
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_is_observed_at_next_frame_boundary() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut sink = RecordingSink::new();
        sink.cancel_after = Some((2, cancel.clone()));
        let closed = sink.closed.clone();

        let mut pipeline = pipeline_with(
            ScriptedSource::frames(10),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        )
        .with_sink(Box::new(sink));
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&cancel).unwrap();

        assert_eq!(report.frames_read, 2);
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_frame_limit() {
        let mut pipeline = pipeline_with(
            ScriptedSource::frames(10),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        )
        .with_max_frames(Some(4));
        pipeline.start(known_set()).unwrap();
        let report = pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(report.frames_read, 4);
        assert_eq!(report.stop_reason, StopReason::FrameLimit);
    }

    #[test]
    fn test_sink_failure_stops_and_releases_source() {
        let source = ScriptedSource::frames(3);
        let released = source.released.clone();
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1)
            .with_sink(Box::new(FailingSink));
        pipeline.start(known_set()).unwrap();

        let err = pipeline.run(&not_cancelled()).unwrap_err();
        assert!(matches!(err, PipelineError::Sink(_)));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unopenable_source_keeps_pipeline_idle() {
        let mut source = ScriptedSource::frames(1);
        source.open_fails = true;
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1);

        let err = pipeline.start(known_set()).unwrap_err();
        assert!(matches!(err, PipelineError::FrameSourceUnavailable(_)));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_missing_model_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("absent.rkm"));
        let mut pipeline = pipeline_with(
            ScriptedSource::frames(1),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        );

        let err = pipeline.start_from_store(&store).unwrap_err();
        assert!(matches!(err, PipelineError::Model(ModelStoreError::NotFound(_))));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_start_from_store_uses_saved_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("known.rkm"));
        store.save(&known_set()).unwrap();
        let recorder = RecordingRecorder::default();
        let events = recorder.events.clone();

        let mut pipeline = pipeline_with(
            ScriptedSource::frames(1),
            FixedProvider::returning(&[2.9, 0.0]),
            1,
        )
        .with_recorder(Box::new(recorder));
        pipeline.start_from_store(&store).unwrap();
        pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(events.lock().unwrap()[0].label, "Luis");
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut pipeline = pipeline_with(
            ScriptedSource::frames(1),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        );
        pipeline.start(known_set()).unwrap();
        assert!(matches!(
            pipeline.start(known_set()),
            Err(PipelineError::AlreadyStarted)
        ));
        pipeline.run(&not_cancelled()).unwrap();
        assert!(matches!(
            pipeline.start(known_set()),
            Err(PipelineError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_run_before_start_errors() {
        let mut pipeline = pipeline_with(
            ScriptedSource::frames(1),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        );
        assert!(matches!(
            pipeline.run(&not_cancelled()),
            Err(PipelineError::NotRunning)
        ));
    }

    #[test]
    fn test_recorder_flushed_on_stop() {
        let recorder = RecordingRecorder::default();
        let flushed = recorder.flushed.clone();
        let mut pipeline = pipeline_with(
            ScriptedSource::frames(2),
            FixedProvider::returning(&[0.0, 0.0]),
            1,
        )
        .with_recorder(Box::new(recorder));
        pipeline.start(known_set()).unwrap();
        pipeline.run(&not_cancelled()).unwrap();
        assert!(flushed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_while_running_releases_source() {
        let source = ScriptedSource::frames(2);
        let released = source.released.clone();
        let mut pipeline = pipeline_with(source, FixedProvider::returning(&[0.0, 0.0]), 1);
        pipeline.start(known_set()).unwrap();
        drop(pipeline);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_empty_known_set_emits_nothing() {
        let recorder = RecordingRecorder::default();
        let events = recorder.events.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut provider = FixedProvider::returning(&[0.0, 0.0]);
        provider.calls = calls.clone();

        let mut pipeline = pipeline_with(ScriptedSource::frames(2), provider, 1)
            .with_recorder(Box::new(recorder));
        pipeline.start(KnownIdentitySet::empty()).unwrap();
        pipeline.run(&not_cancelled()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(events.lock().unwrap().is_empty());
    }
}
