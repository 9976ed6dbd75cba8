//! # tuner-core
//!
//! Core types, configuration, and error handling for the tuner audio renderer.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{DecoderKind, RendererConfig, AC3_FRAME_DURATION_US};
pub use error::{Error, Result, SinkError};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
pub use types::*;
