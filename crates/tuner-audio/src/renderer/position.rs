//! Playback position bookkeeping and reconciliation.
//!
//! Three time bases feed the reported position: decoded presentation
//! timestamps, the standalone media clock, and the sink's own playback
//! position. [`PlaybackPosition::reconcile`] picks between them and keeps the
//! result from drifting too far from the last decoded timestamp.

use tracing::warn;
use tuner_core::RendererConfig;

/// Timing constants used by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionPolicy {
    pub fixed_sample_duration_us: i64,
    pub backward_jump_threshold_us: i64,
    pub position_ceiling_us: i64,
    pub fixed_rendering_delay_us: i64,
    /// Snap to the sink when it moves backwards past the threshold.
    pub correct_backward_jumps: bool,
}

impl PositionPolicy {
    pub const fn from_config(config: &RendererConfig) -> Self {
        Self {
            fixed_sample_duration_us: config.fixed_sample_duration_us,
            backward_jump_threshold_us: config.backward_jump_threshold_us,
            position_ceiling_us: config.position_ceiling_us,
            fixed_rendering_delay_us: config.fixed_rendering_delay_us,
            correct_backward_jumps: !config.is_software_decode(),
        }
    }
}

/// Which time base is available for this query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    /// Sink not initialized; the standalone clock's position.
    MediaClock(i64),
    /// Sink disabled; derive from written timestamps.
    SinkDisabled,
    /// Sink-reported position, `None` if it has none yet.
    Sink(Option<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Timestamp of the most recent decoded unit, or the seek target.
    pub presentation_time_us: i64,
    /// How many consecutive units repeated `presentation_time_us`.
    pub presentation_count: u32,
    /// Last reported position. Each query reconciles against this cached
    /// estimate.
    pub current_position_us: Option<i64>,
    /// The estimate `current_position_us` replaced, kept for diagnostics.
    pub previous_position_us: Option<i64>,
    /// Timestamp handed to the sink with the last write.
    pub interpolated_time_us: Option<i64>,
    last_unit_time_us: Option<i64>,
}

impl PlaybackPosition {
    pub const fn new(position_us: i64) -> Self {
        Self {
            presentation_time_us: position_us,
            presentation_count: 0,
            current_position_us: None,
            previous_position_us: None,
            interpolated_time_us: None,
            last_unit_time_us: None,
        }
    }

    pub fn reset(&mut self, position_us: i64) {
        *self = Self::new(position_us);
    }

    /// Record a decoded unit's timestamp.
    pub fn on_decoded(&mut self, presentation_time_us: i64) {
        if presentation_time_us < 0 {
            warn!("Decoded unit with negative timestamp {presentation_time_us}us");
        }
        if self.last_unit_time_us == Some(presentation_time_us) {
            self.presentation_count += 1;
        } else {
            self.presentation_time_us = presentation_time_us;
            self.presentation_count = 0;
            self.last_unit_time_us = Some(presentation_time_us);
        }
    }

    /// Timestamp for the pending unit: base plus one unit per repeat.
    pub fn interpolated_time_us(&self, policy: &PositionPolicy) -> i64 {
        self.presentation_time_us
            + i64::from(self.presentation_count) * policy.fixed_sample_duration_us
    }

    pub fn on_written(&mut self, interpolated_time_us: i64) {
        self.interpolated_time_us = Some(interpolated_time_us);
    }

    /// The timeline jumped; restart timestamp tracking at `position_us`.
    pub fn on_discontinuity(&mut self, position_us: i64) {
        self.reset(position_us);
    }

    /// Forget cached positions after the sink re-anchored its timeline.
    pub fn invalidate(&mut self) {
        self.current_position_us = None;
        self.previous_position_us = None;
    }

    /// Compute the reported position from the available time base.
    pub fn reconcile(&mut self, source: PositionSource, policy: &PositionPolicy) -> i64 {
        let previous = self.current_position_us;
        let position = match source {
            PositionSource::MediaClock(position_us) => position_us,
            PositionSource::SinkDisabled => {
                let estimate = self
                    .interpolated_time_us
                    .filter(|&interpolated| interpolated > 0)
                    .map_or(self.presentation_time_us, |interpolated| {
                        interpolated - policy.fixed_rendering_delay_us
                    });
                previous.map_or(estimate, |p| p.max(estimate)).max(0)
            }
            PositionSource::Sink(None) => previous.map_or(self.presentation_time_us, |p| {
                p.max(self.presentation_time_us)
            }),
            PositionSource::Sink(Some(sink_us)) => match previous {
                Some(p)
                    if policy.correct_backward_jumps
                        && p - sink_us > policy.backward_jump_threshold_us =>
                {
                    warn!(
                        "Sink position jumped back {}us ({p}us -> {sink_us}us)",
                        p - sink_us
                    );
                    sink_us
                }
                Some(p) => p.max(sink_us),
                None => sink_us,
            },
        };

        let position = position.min(self.presentation_time_us + policy.position_ceiling_us);
        self.previous_position_us = previous;
        self.current_position_us = Some(position);
        position
    }
}
