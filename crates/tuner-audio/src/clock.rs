//! Standalone media clock used before the sink reports a position.

use std::fmt;
use tuner_core::SharedClock;

/// A position in media time that advances with the wall clock while started.
pub struct MediaClock {
    wall_clock: SharedClock,
    started: bool,
    /// Frozen position while stopped.
    position_us: i64,
    /// Wall time minus media time while started.
    delta_us: i64,
}

impl MediaClock {
    pub fn new(wall_clock: SharedClock) -> Self {
        Self {
            wall_clock,
            started: false,
            position_us: 0,
            delta_us: 0,
        }
    }

    /// Start advancing from the current position.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.delta_us = self.wall_clock.now_us() - self.position_us;
        }
    }

    /// Freeze the clock at its current position.
    pub fn stop(&mut self) {
        if self.started {
            self.position_us = self.elapsed_position_us();
            self.started = false;
        }
    }

    pub fn set_position_us(&mut self, position_us: i64) {
        self.position_us = position_us;
        self.delta_us = self.wall_clock.now_us() - position_us;
    }

    pub fn position_us(&self) -> i64 {
        if self.started {
            self.elapsed_position_us()
        } else {
            self.position_us
        }
    }

    pub const fn is_started(&self) -> bool {
        self.started
    }

    fn elapsed_position_us(&self) -> i64 {
        self.wall_clock.now_us() - self.delta_us
    }
}

impl fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaClock")
            .field("started", &self.started)
            .field("position_us", &self.position_us())
            .finish()
    }
}
