//! # tuner-audio
//!
//! Timing and buffering core of the AC-3 passthrough track renderer.
//!
//! Features:
//! - Cooperative renderer driven by an external `do_some_work` loop
//! - Passthrough and worker-thread software decode adapters
//! - Enable-guarded sink wrapper with session reuse
//! - Position reconciliation across decoder, sink and media clock time bases
//! - cpal PCM output for software-decoded audio

pub mod buffer;
pub mod clock;
pub mod decoder;
pub mod monitor;
pub mod renderer;
pub mod sink;
pub mod source;

pub use clock::MediaClock;
pub use decoder::{DecodeOutcome, DecoderAdapter, FrameDecodeError, FrameDecoder};
pub use monitor::{MonitorSummary, PtsRun, SampleMonitor};
pub use renderer::{
    PlaybackPosition, PositionPolicy, PositionSource, RendererEvent, RendererMessage,
    RendererState, TrackRenderer,
};
pub use sink::{
    list_output_devices, shared_sink, AudioSink, CpalSink, SessionId, SharedSink, SinkWrapper,
    WriteResult,
};
pub use source::{FormatHolder, MemorySource, ReadResult, SampleHolder, SampleSource};
