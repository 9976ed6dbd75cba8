//! Renderer configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::types::Encoding;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Duration of one AC-3 frame (1536 samples at 48kHz).
pub const AC3_FRAME_DURATION_US: i64 = 32_000;

/// Which decode adapter the renderer drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// Compressed frames go to the sink unmodified.
    #[default]
    Passthrough,
    /// Frames are decoded on a worker before reaching the sink.
    Software,
}

/// Tunable timing constants for the track renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Encoding of the track the renderer selects from the source.
    pub target_encoding: Encoding,
    pub decoder: DecoderKind,
    /// Per-unit duration used to interpolate repeated timestamps.
    pub fixed_sample_duration_us: i64,
    /// Backward sink position moves larger than this are treated as jumps.
    pub backward_jump_threshold_us: i64,
    /// Reported position never runs further than this ahead of the last PTS.
    pub position_ceiling_us: i64,
    /// How long the output may stay ended without draining.
    pub end_of_stream_keep_alive_ms: i64,
    /// Assumed device latency while the sink is disabled.
    pub fixed_rendering_delay_us: i64,
    /// Statistics monitor flush interval.
    pub monitor_window_ms: i64,
    /// Initial sink volume (0.0 to 1.0).
    pub volume: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            target_encoding: Encoding::Ac3,
            decoder: DecoderKind::Passthrough,
            fixed_sample_duration_us: AC3_FRAME_DURATION_US,
            backward_jump_threshold_us: 3_000,
            position_ceiling_us: 1_000_000,
            end_of_stream_keep_alive_ms: 3_000,
            fixed_rendering_delay_us: 500_000,
            monitor_window_ms: 5_000,
            volume: 1.0,
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Load a configuration file if it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.fixed_sample_duration_us <= 0 {
            return Err(Error::Config(
                "fixed_sample_duration_us must be positive".to_string(),
            ));
        }
        if self.backward_jump_threshold_us < 0 || self.position_ceiling_us < 0 {
            return Err(Error::Config(
                "position thresholds must not be negative".to_string(),
            ));
        }
        if self.end_of_stream_keep_alive_ms <= 0 || self.monitor_window_ms <= 0 {
            return Err(Error::Config(
                "keep-alive and monitor window must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "volume {} outside 0.0..=1.0",
                self.volume
            )));
        }
        Ok(())
    }

    /// Whether frames are decoded in software rather than passed through.
    pub const fn is_software_decode(&self) -> bool {
        matches!(self.decoder, DecoderKind::Software)
    }
}
