use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::pipeline::realtime_pipeline::{PipelineError, RealtimePipeline, SessionReport};
use crate::recognition::domain::known_identity_set::KnownIdentitySet;
use crate::shared::video_metadata::VideoMetadata;

/// Status updates sent from the worker thread.
#[derive(Debug, Clone)]
pub enum JobMessage {
    Started(VideoMetadata),
    Finished(SessionReport),
    Error(String),
}

/// A realtime session running on its own thread.
///
/// The owner holds the handle; there is no global job state. Dropping the
/// handle cancels the session and waits for the worker.
pub struct RecognitionJob {
    cancelled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    messages: Receiver<JobMessage>,
    handle: Option<JoinHandle<Result<SessionReport, PipelineError>>>,
}

impl RecognitionJob {
    /// Start `pipeline` on the calling thread, then hand the loop to a worker.
    ///
    /// Startup failures (unopenable source, sink) are returned here rather
    /// than through the channel.
    pub fn start(
        mut pipeline: RealtimePipeline,
        known: KnownIdentitySet,
    ) -> Result<Self, PipelineError> {
        let metadata = pipeline.start(known)?;

        let (tx, rx) = crossbeam_channel::unbounded::<JobMessage>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let cancelled_clone = cancelled.clone();
        let running_clone = running.clone();

        let _ = tx.send(JobMessage::Started(metadata));
        let handle = thread::spawn(move || {
            let result = pipeline.run(&cancelled_clone);
            drop(pipeline);
            match &result {
                Ok(report) => {
                    let _ = tx.send(JobMessage::Finished(report.clone()));
                }
                Err(e) => {
                    let _ = tx.send(JobMessage::Error(e.to_string()));
                }
            }
            running_clone.store(false, Ordering::SeqCst);
            result
        });

        Ok(Self {
            cancelled,
            running,
            messages: rx,
            handle: Some(handle),
        })
    }

    /// Ask the session to stop at the next frame boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> &Receiver<JobMessage> {
        &self.messages
    }

    /// Wait for the worker and return its session report.
    pub fn join(mut self) -> Result<SessionReport, PipelineError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(PipelineError::WorkerPanicked)),
            None => Err(PipelineError::NotRunning),
        }
    }
}

impl Drop for RecognitionJob {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel();
            let _ = handle.join();
        }
    }
}
