use crossbeam_channel::Receiver;

use crate::capture::domain::frame_sample::FrameSample;

/// Exposes the per-camera frame queues of currently running sessions.
pub trait FrameQueueSource: Send + Sync {
    /// Receivers in stable camera order. The set may change between calls.
    fn running_queues(&self) -> Vec<Receiver<FrameSample>>;
}
