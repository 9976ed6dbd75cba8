//! Listener events and control messages.

use tuner_core::{Format, SinkError};

/// Notifications posted to the renderer's listener channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// The sink could not be initialized or configured; audio continues
    /// silently.
    TrackInitializationError(SinkError),
    /// A sink write failed; playback of this track stops.
    TrackWriteError(SinkError),
    DecodeError {
        presentation_time_us: i64,
        message: String,
    },
    FormatChanged(Format),
    /// Whether the source has data buffered ahead.
    BufferingChanged(bool),
    EndOfStream,
}

/// Control messages applied to the live sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RendererMessage {
    /// Set volume (0.0 to 1.0).
    SetVolume(f32),
    /// Enable or silence audio output without stopping the renderer.
    SetTrackEnabled(bool),
}
