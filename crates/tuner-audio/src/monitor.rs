//! Windowed statistics over samples fed to the decoder.
//!
//! Purely diagnostic: nothing here affects rendering.

use std::collections::HashSet;
use tracing::{debug, warn};
use tuner_core::SharedClock;

/// Upper bound on timestamp runs kept per window.
const MAX_PTS_RUNS: usize = 1024;

/// Consecutive samples that shared one presentation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtsRun {
    pub presentation_time_us: i64,
    pub count: u32,
}

/// Snapshot of one flushed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    pub total_samples: u64,
    pub window_samples: u64,
    /// Distinct sample sizes seen in the window, ascending.
    pub sizes: Vec<usize>,
    /// Distinct frame signatures seen in the window, ascending.
    pub headers: Vec<u8>,
    pub pts_runs: usize,
    /// Samples whose timestamp repeated the previous one.
    pub repeated_samples: u64,
}

pub struct SampleMonitor {
    clock: SharedClock,
    window_ms: i64,
    next_flush_ms: i64,
    total_samples: u64,
    window_samples: u64,
    sizes: HashSet<usize>,
    headers: HashSet<u8>,
    runs: Vec<PtsRun>,
    last_pts_us: Option<i64>,
    repeated_samples: u64,
}

impl SampleMonitor {
    pub fn new(clock: SharedClock, window_ms: i64) -> Self {
        let next_flush_ms = clock.now_ms() + window_ms;
        Self {
            clock,
            window_ms,
            next_flush_ms,
            total_samples: 0,
            window_samples: 0,
            sizes: HashSet::new(),
            headers: HashSet::new(),
            runs: Vec::new(),
            last_pts_us: None,
            repeated_samples: 0,
        }
    }

    /// Clear all counters and restart the window.
    pub fn reset(&mut self, window_ms: i64) {
        self.window_ms = window_ms;
        self.next_flush_ms = self.clock.now_ms() + window_ms;
        self.total_samples = 0;
        self.clear_window();
    }

    pub fn add_sample(&mut self, presentation_time_us: i64, size: usize, header: Option<u8>) {
        self.total_samples += 1;
        self.window_samples += 1;
        self.sizes.insert(size);
        if let Some(header) = header {
            self.headers.insert(header);
        }

        if self.last_pts_us == Some(presentation_time_us) {
            self.repeated_samples += 1;
            if let Some(run) = self
                .runs
                .last_mut()
                .filter(|run| run.presentation_time_us == presentation_time_us)
            {
                run.count += 1;
            }
        } else {
            if self.runs.len() < MAX_PTS_RUNS {
                self.runs.push(PtsRun {
                    presentation_time_us,
                    count: 1,
                });
            }
            self.last_pts_us = Some(presentation_time_us);
        }
    }

    /// Log and clear the window once its deadline has passed.
    pub fn maybe_flush(&mut self) -> Option<MonitorSummary> {
        let now_ms = self.clock.now_ms();
        if now_ms < self.next_flush_ms {
            return None;
        }

        let summary = self.summary();
        debug!(
            total = summary.total_samples,
            window = summary.window_samples,
            runs = summary.pts_runs,
            repeated = summary.repeated_samples,
            "sample sizes {:?}, headers {:02x?}",
            summary.sizes,
            summary.headers
        );
        if summary.sizes.len() > 1 {
            warn!(
                "Sample size changed within window: {:?}",
                summary.sizes
            );
        }

        self.clear_window();
        self.next_flush_ms += self.window_ms;
        if self.next_flush_ms <= now_ms {
            // Missed several windows; realign instead of flushing repeatedly.
            self.next_flush_ms = now_ms + self.window_ms;
        }
        Some(summary)
    }

    pub const fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub const fn window_samples(&self) -> u64 {
        self.window_samples
    }

    pub fn pts_runs(&self) -> &[PtsRun] {
        &self.runs
    }

    /// Statistics for the current window.
    pub fn summary(&self) -> MonitorSummary {
        let mut sizes: Vec<usize> = self.sizes.iter().copied().collect();
        sizes.sort_unstable();
        let mut headers: Vec<u8> = self.headers.iter().copied().collect();
        headers.sort_unstable();
        MonitorSummary {
            total_samples: self.total_samples,
            window_samples: self.window_samples,
            sizes,
            headers,
            pts_runs: self.runs.len(),
            repeated_samples: self.repeated_samples,
        }
    }

    fn clear_window(&mut self) {
        self.window_samples = 0;
        self.sizes.clear();
        self.headers.clear();
        self.runs.clear();
        self.last_pts_us = None;
        self.repeated_samples = 0;
    }
}
