/// Decides which frames get full recognition.
///
/// The counter is incremented before the check, so frames 1..=M contain
/// exactly `floor(M / N)` process frames: the N-th, 2N-th, and so on.
/// All other frames reuse the previous results.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    skip_interval: usize,
    frame_count: usize,
}

impl FrameScheduler {
    pub fn new(skip_interval: usize) -> Result<Self, &'static str> {
        if skip_interval < 1 {
            return Err("skip_interval must be >= 1");
        }
        Ok(Self {
            skip_interval,
            frame_count: 0,
        })
    }

    /// Count one frame and report whether it should be processed.
    pub fn advance(&mut self) -> bool {
        self.frame_count += 1;
        self.frame_count % self.skip_interval == 0
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn skip_interval(&self) -> usize {
        self.skip_interval
    }

    pub fn reset(&mut self) {
        self.frame_count = 0;
    }
}
