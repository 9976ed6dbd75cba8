//! Audio output sinks.
//!
//! [`AudioSink`] is the device contract; [`SinkWrapper`] guards it with an
//! enable flag so the renderer can keep running when the device cannot.

pub mod device;
pub mod wrapper;

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tuner_core::{Format, SinkError};

pub use device::{list_output_devices, CpalSink};
pub use wrapper::SinkWrapper;

/// Handle to a live binding with the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Outcome of handing a buffer to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteResult {
    /// The whole buffer was accepted; the caller may release it.
    pub consumed: bool,
    /// The sink re-anchored its timeline because the buffer's timestamp did
    /// not follow the previous one.
    pub position_discontinuity: bool,
}

impl WriteResult {
    pub const fn consumed() -> Self {
        Self {
            consumed: true,
            position_discontinuity: false,
        }
    }

    pub const fn pending() -> Self {
        Self {
            consumed: false,
            position_discontinuity: false,
        }
    }

    pub const fn with_discontinuity(mut self) -> Self {
        self.position_discontinuity = true;
        self
    }
}

/// An output device the renderer writes to.
pub trait AudioSink: Send {
    /// Bind to the device, reusing `session` when given.
    fn initialize(&mut self, session: Option<SessionId>) -> Result<SessionId, SinkError>;

    fn is_initialized(&self) -> bool;

    fn configure(&mut self, format: &Format, tunneling: bool) -> Result<(), SinkError>;

    /// Write `buffer[offset..offset + size]` to be presented at
    /// `presentation_time_us`. May accept nothing when the device is full.
    fn handle_buffer(
        &mut self,
        buffer: &[u8],
        offset: usize,
        size: usize,
        presentation_time_us: i64,
    ) -> Result<WriteResult, SinkError>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Drop queued data and unbind; the session survives.
    fn reset(&mut self);

    /// Tear down the device binding and its session.
    fn release(&mut self);

    fn set_volume(&mut self, volume: f32);

    /// Re-anchor the timeline at the next written buffer.
    fn handle_discontinuity(&mut self);

    /// Playback position, or `None` before the device has position data.
    fn current_position_us(&mut self, is_ended: bool) -> Option<i64>;

    /// Whether written data is still waiting to be played.
    fn has_pending_data(&self) -> bool;

    /// The device can keep playing without more input.
    fn is_ready(&self) -> bool {
        self.has_pending_data()
    }
}

/// Output device shared by the renderers of one playback session.
pub type SharedSink = Arc<Mutex<dyn AudioSink>>;

/// Wrap a sink for sharing.
pub fn shared_sink<S: AudioSink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_result_flags() {
        assert!(WriteResult::consumed().consumed);
        assert!(!WriteResult::pending().consumed);
        let result = WriteResult::consumed().with_discontinuity();
        assert!(result.consumed && result.position_discontinuity);
        assert_eq!(SessionId(7).to_string(), "session#7");
    }
}
