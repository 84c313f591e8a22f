/// Coalesces work requests to at most one run per animation frame.
///
/// Frames are identified by a monotonically increasing counter supplied by
/// the host's render loop.
#[derive(Debug, Clone, Default)]
pub struct FrameThrottle {
    pending: bool,
    coalesced: usize,
    last_frame: Option<u64>,
}

impl FrameThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) {
        if self.pending {
            self.coalesced += 1;
        }
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Requests merged into the pending run since the last frame that ran.
    pub fn coalesced(&self) -> usize {
        self.coalesced
    }

    /// Returns `true` if the caller should run its work during `frame`.
    pub fn on_frame(&mut self, frame: u64) -> bool {
        if !self.pending || self.last_frame == Some(frame) {
            return false;
        }
        self.pending = false;
        self.coalesced = 0;
        self.last_frame = Some(frame);
        true
    }

    pub fn cancel(&mut self) {
        self.pending = false;
        self.coalesced = 0;
    }
}
