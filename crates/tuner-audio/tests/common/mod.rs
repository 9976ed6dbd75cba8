//! Shared fixtures for renderer tests.

#![allow(clippy::unwrap_used, dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use tuner_audio::{
    AudioSink, DecoderAdapter, MemorySource, RendererEvent, SessionId, TrackRenderer, WriteResult,
};
use tuner_core::{Clock as _, Encoding, Format, ManualClock, RendererConfig, Result, Sample, SinkError};

/// A write the device accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub presentation_time_us: i64,
    pub data: Vec<u8>,
}

/// Output device that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub configured: Vec<Format>,
    pub writes: Vec<Write>,
    pub sessions_requested: Vec<Option<SessionId>>,
    pub volume: Option<f32>,
    pub playing: bool,
    pub resets: usize,
    pub releases: usize,
    pub discontinuities: usize,
    pub position_us: Option<i64>,
    /// Refuse writes, as if the device buffer were full.
    pub full: bool,
    pub fail_initialize: bool,
    pub fail_write: bool,
    initialized: bool,
    pending: bool,
    next_session: u32,
}

impl RecordingSink {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Pretend the device played out everything queued.
    pub fn drain(&mut self) {
        self.pending = false;
    }

    pub fn write_times(&self) -> Vec<i64> {
        self.writes.iter().map(|w| w.presentation_time_us).collect()
    }
}

impl AudioSink for RecordingSink {
    fn initialize(&mut self, session: Option<SessionId>) -> std::result::Result<SessionId, SinkError> {
        self.sessions_requested.push(session);
        if self.fail_initialize {
            return Err(SinkError::Initialization("passthrough output busy".to_string()));
        }
        self.initialized = true;
        Ok(session.unwrap_or_else(|| {
            self.next_session += 1;
            SessionId(self.next_session)
        }))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn configure(&mut self, format: &Format, _tunneling: bool) -> std::result::Result<(), SinkError> {
        self.configured.push(*format);
        Ok(())
    }

    fn handle_buffer(
        &mut self,
        buffer: &[u8],
        offset: usize,
        size: usize,
        presentation_time_us: i64,
    ) -> std::result::Result<WriteResult, SinkError> {
        if self.fail_write {
            return Err(SinkError::Write("device unplugged".to_string()));
        }
        if self.full {
            return Ok(WriteResult::pending());
        }
        self.writes.push(Write {
            presentation_time_us,
            data: buffer[offset..offset + size].to_vec(),
        });
        self.pending = true;
        Ok(WriteResult::consumed())
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.initialized = false;
        self.pending = false;
    }

    fn release(&mut self) {
        self.releases += 1;
        self.initialized = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = Some(volume);
    }

    fn handle_discontinuity(&mut self) {
        self.discontinuities += 1;
    }

    fn current_position_us(&mut self, _is_ended: bool) -> Option<i64> {
        self.position_us
    }

    fn has_pending_data(&self) -> bool {
        self.pending
    }
}

pub fn ac3_stereo() -> Format {
    Format::new(2, 48_000, Encoding::Ac3)
}

/// An AC-3 frame payload starting with the sync word.
pub fn frame(tag: u8) -> Vec<u8> {
    vec![0x0b, 0x77, tag, 0x00]
}

pub struct Harness {
    pub renderer: TrackRenderer,
    pub source: MemorySource,
    pub device: Arc<Mutex<RecordingSink>>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn passthrough(format: Format) -> Self {
        Self::new(format, RendererConfig::default(), DecoderAdapter::passthrough())
    }

    pub fn new(format: Format, config: RendererConfig, decoder: DecoderAdapter) -> Self {
        let source = MemorySource::with_format(format);
        let device = RecordingSink::shared();
        let clock = ManualClock::new();
        let renderer = TrackRenderer::new(
            config,
            Box::new(source.clone()),
            decoder,
            device.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            renderer,
            source,
            device,
            clock,
        }
    }

    pub fn push_frames(&self, times_us: &[i64]) {
        for (i, &pts) in times_us.iter().enumerate() {
            self.source
                .push_sample(Sample::new(frame(u8::try_from(i % 256).unwrap()), pts));
        }
    }

    /// Prepare, enable at zero and start playback.
    pub fn start(&mut self) {
        assert!(self.renderer.prepare(0).unwrap());
        self.renderer.enable(0).unwrap();
        self.renderer.start().unwrap();
    }

    pub fn work(&mut self) -> Result<()> {
        let position_us = self.renderer.position_us();
        self.renderer.do_some_work(position_us, self.clock.now_us())
    }

    /// Run work steps until `done` holds, failing after `max_steps`.
    pub fn work_until(&mut self, max_steps: usize, done: impl Fn(&Self) -> bool) {
        for _ in 0..max_steps {
            if done(self) {
                return;
            }
            self.work().unwrap();
        }
        assert!(done(self), "condition not reached after {max_steps} steps");
    }

    pub fn events(&self) -> Vec<RendererEvent> {
        std::iter::from_fn(|| self.renderer.try_recv_event()).collect()
    }
}
