//! Error types for the tuner renderer.

use thiserror::Error;

/// Result type alias using the crate-wide Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the renderer stack.
#[derive(Error, Debug)]
pub enum Error {
    // Upstream source errors
    #[error("Source IO error: {0}")]
    SourceIo(String),

    #[error("No track matching {0} in source")]
    TrackNotFound(String),

    // Output sink errors
    #[error("Audio sink error: {0}")]
    Sink(#[from] SinkError),

    // Decode errors
    #[error("Decode failed at {pts_us}us: {message}")]
    Decode { pts_us: i64, message: String },

    #[error("Decoder unavailable: {0}")]
    DecoderUnavailable(String),

    /// Output ended but the sink never drained within the keep-alive window.
    #[error("End of stream not drained after {elapsed_ms}ms")]
    EndOfStreamTimeout { elapsed_ms: u64 },

    #[error("Invalid renderer state: {0}")]
    InvalidState(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by the audio output sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Configuration failed: {0}")]
    Configuration(String),

    #[error("Write failed: {0}")]
    Write(String),
}

impl Error {
    /// Returns true if this error terminates the render path.
    ///
    /// Sink initialization and configuration failures are handled by
    /// disabling the sink, so they never reach the caller as fatal.
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Sink(SinkError::Initialization(_) | SinkError::Configuration(_))
                | Self::Config(_)
        )
    }
}
