//! Upstream sample source contract.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use tuner_core::{Error, Format, Result, Sample};

/// What a call to [`SampleSource::read_data`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    NothingRead,
    FormatRead,
    EndOfStream,
    SampleRead,
}

/// Receives a format from [`SampleSource::read_data`].
#[derive(Debug, Default)]
pub struct FormatHolder {
    pub format: Option<Format>,
}

/// Receives a sample from [`SampleSource::read_data`].
#[derive(Debug, Default)]
pub struct SampleHolder {
    pub sample: Option<Sample>,
}

/// A demuxed source of compressed audio samples.
pub trait SampleSource: Send {
    /// Returns `Ok(false)` until track information is available.
    fn prepare(&mut self, position_us: i64) -> Result<bool>;

    fn track_count(&self) -> usize;

    fn format(&self, track: usize) -> Option<Format>;

    fn enable(&mut self, track: usize, position_us: i64);

    fn disable(&mut self, track: usize);

    /// Whether the track has data buffered ahead of `position_us`.
    fn continue_buffering(&mut self, track: usize, position_us: i64) -> bool;

    fn read_data(
        &mut self,
        track: usize,
        position_us: i64,
        format_holder: &mut FormatHolder,
        sample_holder: &mut SampleHolder,
    ) -> Result<ReadResult>;

    /// The position the timeline jumped to, if it jumped since the last read.
    fn read_discontinuity(&mut self, track: usize) -> Option<i64>;

    fn seek_to_us(&mut self, position_us: i64);

    /// Surface a deferred loading error.
    fn maybe_throw_error(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
enum Entry {
    Format(Format),
    Sample(Sample),
    Discontinuity(i64),
    Error(String),
    EndOfStream,
}

#[derive(Debug, Default)]
struct MemoryTrack {
    format: Option<Format>,
    entries: VecDeque<Entry>,
    enabled: bool,
    format_sent: bool,
    pending_discontinuity: Option<i64>,
    load_error: Option<String>,
}

/// Single-track source fed from memory.
///
/// Clones share the same queue, so a producer can keep appending while the
/// renderer reads.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    track: Arc<Mutex<MemoryTrack>>,
}

impl MemorySource {
    /// A source whose track format is not known yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: Format) -> Self {
        let source = Self::new();
        source.set_format(format);
        source
    }

    /// Announce the track format, making the source prepared.
    pub fn set_format(&self, format: Format) {
        self.track.lock().format = Some(format);
    }

    pub fn push_sample(&self, sample: Sample) {
        self.track.lock().entries.push_back(Entry::Sample(sample));
    }

    /// Queue a mid-stream format change.
    pub fn push_format(&self, format: Format) {
        self.track.lock().entries.push_back(Entry::Format(format));
    }

    pub fn push_discontinuity(&self, position_us: i64) {
        self.track
            .lock()
            .entries
            .push_back(Entry::Discontinuity(position_us));
    }

    /// Queue a read failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.track
            .lock()
            .entries
            .push_back(Entry::Error(message.into()));
    }

    /// Fail the next `maybe_throw_error` call.
    pub fn set_load_error(&self, message: impl Into<String>) {
        self.track.lock().load_error = Some(message.into());
    }

    pub fn finish(&self) {
        self.track.lock().entries.push_back(Entry::EndOfStream);
    }

    /// Entries not yet read.
    pub fn queued(&self) -> usize {
        self.track.lock().entries.len()
    }
}

impl SampleSource for MemorySource {
    fn prepare(&mut self, _position_us: i64) -> Result<bool> {
        Ok(self.track.lock().format.is_some())
    }

    fn track_count(&self) -> usize {
        usize::from(self.track.lock().format.is_some())
    }

    fn format(&self, track: usize) -> Option<Format> {
        if track == 0 {
            self.track.lock().format
        } else {
            None
        }
    }

    fn enable(&mut self, _track: usize, position_us: i64) {
        let mut track = self.track.lock();
        track.enabled = true;
        track.format_sent = false;
        debug!("Memory source enabled at {position_us}us");
    }

    fn disable(&mut self, _track: usize) {
        self.track.lock().enabled = false;
    }

    fn continue_buffering(&mut self, _track: usize, _position_us: i64) -> bool {
        !self.track.lock().entries.is_empty()
    }

    fn read_data(
        &mut self,
        _track: usize,
        _position_us: i64,
        format_holder: &mut FormatHolder,
        sample_holder: &mut SampleHolder,
    ) -> Result<ReadResult> {
        let mut track = self.track.lock();
        if !track.enabled {
            return Err(Error::InvalidState("track not enabled".to_string()));
        }
        if !track.format_sent {
            if let Some(format) = track.format {
                track.format_sent = true;
                format_holder.format = Some(format);
                return Ok(ReadResult::FormatRead);
            }
            return Ok(ReadResult::NothingRead);
        }

        match track.entries.front() {
            None | Some(Entry::Discontinuity(_)) => return Ok(ReadResult::NothingRead),
            Some(Entry::EndOfStream) => return Ok(ReadResult::EndOfStream),
            _ => {}
        }
        match track.entries.pop_front() {
            Some(Entry::Format(format)) => {
                track.format = Some(format);
                format_holder.format = Some(format);
                Ok(ReadResult::FormatRead)
            }
            Some(Entry::Sample(sample)) => {
                sample_holder.sample = Some(sample);
                Ok(ReadResult::SampleRead)
            }
            Some(Entry::Error(message)) => Err(Error::SourceIo(message)),
            _ => Ok(ReadResult::NothingRead),
        }
    }

    fn read_discontinuity(&mut self, _track: usize) -> Option<i64> {
        let mut track = self.track.lock();
        if let Some(position_us) = track.pending_discontinuity.take() {
            return Some(position_us);
        }
        if let Some(&Entry::Discontinuity(position_us)) = track.entries.front() {
            track.entries.pop_front();
            return Some(position_us);
        }
        None
    }

    fn seek_to_us(&mut self, position_us: i64) {
        let mut track = self.track.lock();
        while let Some(Entry::Sample(sample)) = track.entries.front() {
            if sample.presentation_time_us >= position_us {
                break;
            }
            track.entries.pop_front();
        }
        track.pending_discontinuity = Some(position_us);
    }

    fn maybe_throw_error(&mut self) -> Result<()> {
        match self.track.lock().load_error.take() {
            Some(message) => Err(Error::SourceIo(message)),
            None => Ok(()),
        }
    }
}
