//! Per-frame instrumentation hook.

use crate::protocol::Frame;

/// Callbacks invoked once for every frame a connection writes or reads.
///
/// Both methods default to doing nothing. Observers see frames with the
/// payload unmasked and cannot alter them.
pub trait FrameObserver {
    /// Called after `frame` has been written to the transport.
    fn frame_sent(&mut self, frame: &Frame) {
        let _ = frame;
    }

    /// Called after `frame` has been decoded from the transport.
    fn frame_received(&mut self, frame: &Frame) {
        let _ = frame;
    }
}
