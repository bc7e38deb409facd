use crate::capture::domain::source_locator::SourceLocator;
use crate::shared::frame::Frame;

/// Opens camera sources.
///
/// Shared by every capture session, hence `&self` and `Sync`. The handles
/// it returns are used only by the thread that opened them.
pub trait CaptureSource: Send + Sync {
    fn open(
        &self,
        locator: &SourceLocator,
    ) -> Result<Box<dyn CaptureHandle>, Box<dyn std::error::Error>>;
}

/// An open camera source.
pub trait CaptureHandle {
    /// Blocks until the next frame is decoded or the read fails.
    ///
    /// The bound on this call comes from the source itself (e.g. a
    /// network read timeout); sessions cannot interrupt it.
    fn read(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;

    /// Releases the underlying device or stream. Must be idempotent.
    fn release(&mut self);
}
