//! Track renderer: pulls samples from the source, runs them through the
//! decode adapter and writes the result to the sink with the right timestamps.
//!
//! The renderer owns no threads. An external loop calls
//! [`TrackRenderer::do_some_work`] repeatedly; each call does a bounded amount
//! of work and returns.

pub mod events;
pub mod position;

use crate::clock::MediaClock;
use crate::decoder::DecoderAdapter;
use crate::monitor::SampleMonitor;
use crate::sink::{SharedSink, SinkWrapper};
use crate::source::{FormatHolder, ReadResult, SampleHolder, SampleSource};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, trace, warn};
use tuner_core::{
    DecodedUnit, Encoding, Error, Format, RendererConfig, Result, SharedClock, SinkError,
};

pub use events::{RendererEvent, RendererMessage};
pub use position::{PlaybackPosition, PositionPolicy, PositionSource};

/// Lifecycle state of a [`TrackRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererState {
    #[default]
    Unprepared,
    /// Track selected, renderer disabled.
    Prepared,
    Enabled,
    Started,
}

pub struct TrackRenderer {
    config: RendererConfig,
    policy: PositionPolicy,
    clock: SharedClock,
    source: Box<dyn SampleSource>,
    track: Option<usize>,
    decoder: DecoderAdapter,
    sink: SinkWrapper,
    media_clock: MediaClock,
    monitor: SampleMonitor,
    event_tx: Sender<RendererEvent>,
    event_rx: Receiver<RendererEvent>,
    state: RendererState,
    format: Option<Format>,
    /// Decoded unit waiting to be written.
    pending: Option<DecodedUnit>,
    position: PlaybackPosition,
    input_stream_ended: bool,
    output_stream_ended: bool,
    /// Wall time at which the output ended.
    end_of_stream_us: Option<i64>,
    source_buffering: bool,
    format_holder: FormatHolder,
    sample_holder: SampleHolder,
}

impl TrackRenderer {
    pub fn new(
        config: RendererConfig,
        source: Box<dyn SampleSource>,
        decoder: DecoderAdapter,
        sink: SharedSink,
        clock: SharedClock,
    ) -> Self {
        let (event_tx, event_rx) = unbounded();
        let mut sink = SinkWrapper::new(sink);
        sink.set_volume(config.volume);

        let mut policy = PositionPolicy::from_config(&config);
        policy.correct_backward_jumps = !decoder.is_software();

        Self {
            policy,
            media_clock: MediaClock::new(clock.clone()),
            monitor: SampleMonitor::new(clock.clone(), config.monitor_window_ms),
            clock,
            source,
            track: None,
            decoder,
            sink,
            event_tx,
            event_rx,
            state: RendererState::Unprepared,
            format: None,
            pending: None,
            position: PlaybackPosition::new(0),
            input_stream_ended: false,
            output_stream_ended: false,
            end_of_stream_us: None,
            source_buffering: false,
            format_holder: FormatHolder::default(),
            sample_holder: SampleHolder::default(),
            config,
        }
    }

    /// Select a track matching the target encoding.
    ///
    /// Returns `Ok(false)` while the source is still preparing.
    pub fn prepare(&mut self, position_us: i64) -> Result<bool> {
        if self.state != RendererState::Unprepared {
            return Ok(true);
        }
        if !self.source.prepare(position_us)? {
            trace!("Source not prepared yet");
            return Ok(false);
        }

        let target = self.config.target_encoding;
        let track = (0..self.source.track_count()).find(|&i| {
            self.source
                .format(i)
                .is_some_and(|format| handles_encoding(target, format.encoding))
        });
        let Some(track) = track else {
            return Err(Error::TrackNotFound(target.mime_type().to_string()));
        };

        info!("Selected track {track} for {}", target.mime_type());
        self.track = Some(track);
        self.state = RendererState::Prepared;
        Ok(true)
    }

    pub fn enable(&mut self, position_us: i64) -> Result<()> {
        if self.state != RendererState::Prepared {
            return Err(Error::InvalidState(format!(
                "enable from {:?}",
                self.state
            )));
        }
        let track = self.selected_track()?;
        self.source.enable(track, position_us);
        self.decoder.start_decoder()?;
        self.seek_to_internal(position_us);
        self.state = RendererState::Enabled;
        debug!("Renderer enabled at {position_us}us with {} decoder", self.decoder.name());
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            RendererState::Started => Ok(()),
            RendererState::Enabled => {
                self.state = RendererState::Started;
                self.sink.play();
                self.media_clock.start();
                Ok(())
            }
            state => Err(Error::InvalidState(format!("start from {state:?}"))),
        }
    }

    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            RendererState::Enabled => Ok(()),
            RendererState::Started => {
                self.state = RendererState::Enabled;
                self.sink.pause();
                self.media_clock.stop();
                Ok(())
            }
            state => Err(Error::InvalidState(format!("stop from {state:?}"))),
        }
    }

    pub fn seek_to(&mut self, position_us: i64) -> Result<()> {
        if !self.is_enabled() {
            return Err(Error::InvalidState(format!("seek from {:?}", self.state)));
        }
        debug!("Seeking to {position_us}us");
        self.source.seek_to_us(position_us);
        self.sink.reset();
        if !self.decoder.is_software() {
            self.sink.reset_session_id();
        }
        self.seek_to_internal(position_us);
        Ok(())
    }

    /// Stop rendering and drop in-flight work. Safe from any state.
    pub fn disable(&mut self) {
        self.pending = None;
        self.decoder.flush();
        self.sink.reset();
        self.media_clock.stop();

        if self.is_enabled() {
            if let Some(track) = self.track {
                self.source.disable(track);
            }
            self.state = RendererState::Prepared;
        }
        self.format = None;
        self.position.reset(0);
        self.input_stream_ended = false;
        self.output_stream_ended = false;
        self.end_of_stream_us = None;
        self.source_buffering = false;
        debug!("Renderer disabled");
    }

    /// Tear down the decoder and the device session.
    pub fn release(&mut self) {
        self.disable();
        self.decoder.release();
        self.sink.release();
        self.track = None;
        self.state = RendererState::Unprepared;
        info!("Renderer released");
    }

    pub fn handle_message(&mut self, message: RendererMessage) {
        match message {
            RendererMessage::SetVolume(volume) => self.sink.set_volume(volume),
            RendererMessage::SetTrackEnabled(enabled) => self.sink.set_enabled(enabled),
        }
    }

    /// Advance the pipeline by one step.
    pub fn do_some_work(&mut self, position_us: i64, elapsed_realtime_us: i64) -> Result<()> {
        if !self.is_enabled() {
            return Err(Error::InvalidState(format!(
                "do_some_work from {:?}",
                self.state
            )));
        }
        let track = self.selected_track()?;

        self.monitor.maybe_flush();

        if let Some(ended_at) = self.end_of_stream_us {
            let elapsed_ms = (elapsed_realtime_us - ended_at) / 1000;
            if elapsed_ms > self.config.end_of_stream_keep_alive_ms {
                error!("Output still not drained {elapsed_ms}ms after end of stream");
                return Err(Error::EndOfStreamTimeout {
                    elapsed_ms: elapsed_ms.unsigned_abs(),
                });
            }
        }

        let buffering = self.source.continue_buffering(track, position_us);
        if buffering != self.source_buffering {
            trace!("Source buffering: {} -> {buffering}", self.source_buffering);
            self.source_buffering = buffering;
            self.post(RendererEvent::BufferingChanged(buffering));
        }

        if self.format.is_none() {
            self.read_format(track, position_us)?;
            return Ok(());
        }

        if self.process_output(elapsed_realtime_us)? {
            while self.pending.is_none() && self.decoder.in_flight() == 0 {
                if !self.feed_input_buffer(track, position_us)? {
                    break;
                }
                self.receive_decoded()?;
            }
        }
        Ok(())
    }

    /// Current playback position in microseconds.
    pub fn position_us(&mut self) -> i64 {
        let source = if !self.sink.is_initialized() {
            PositionSource::MediaClock(self.media_clock.position_us())
        } else if !self.sink.is_enabled() {
            PositionSource::SinkDisabled
        } else {
            let is_ended = self.is_ended();
            PositionSource::Sink(self.sink.current_position_us(is_ended))
        };
        self.position.reconcile(source, &self.policy)
    }

    pub fn is_ready(&self) -> bool {
        self.sink.is_ready()
            || (self.format.is_some() && (self.source_buffering || self.pending.is_some()))
    }

    pub fn is_ended(&self) -> bool {
        self.output_stream_ended && !self.sink.has_pending_data()
    }

    pub const fn state(&self) -> RendererState {
        self.state
    }

    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    pub const fn has_pending_unit(&self) -> bool {
        self.pending.is_some()
    }

    pub const fn playback_position(&self) -> &PlaybackPosition {
        &self.position
    }

    pub const fn sink(&self) -> &SinkWrapper {
        &self.sink
    }

    pub const fn monitor(&self) -> &SampleMonitor {
        &self.monitor
    }

    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Receiver for listener events; clones share one queue.
    pub fn events(&self) -> Receiver<RendererEvent> {
        self.event_rx.clone()
    }

    pub fn try_recv_event(&self) -> Option<RendererEvent> {
        self.event_rx.try_recv().ok()
    }

    const fn is_enabled(&self) -> bool {
        matches!(self.state, RendererState::Enabled | RendererState::Started)
    }

    fn selected_track(&self) -> Result<usize> {
        self.track
            .ok_or_else(|| Error::InvalidState("no track selected".to_string()))
    }

    fn seek_to_internal(&mut self, position_us: i64) {
        self.decoder.flush();
        self.pending = None;
        self.position.reset(position_us);
        self.monitor.reset(self.config.monitor_window_ms);
        self.media_clock.set_position_us(position_us);
        self.input_stream_ended = false;
        self.output_stream_ended = false;
        self.end_of_stream_us = None;
    }

    fn read_format(&mut self, track: usize, position_us: i64) -> Result<()> {
        self.source.maybe_throw_error()?;
        self.format_holder.format = None;
        self.sample_holder.sample = None;
        let result = self.source.read_data(
            track,
            position_us,
            &mut self.format_holder,
            &mut self.sample_holder,
        )?;
        match result {
            ReadResult::FormatRead => {
                if let Some(format) = self.format_holder.format.take() {
                    self.on_format(format);
                }
            }
            ReadResult::SampleRead => warn!("Dropping sample read before the track format"),
            ReadResult::EndOfStream => self.input_stream_ended = true,
            ReadResult::NothingRead => {}
        }
        Ok(())
    }

    fn on_format(&mut self, format: Format) {
        if self.format == Some(format) {
            return;
        }
        info!(
            "Track format: {} {}ch {}Hz",
            format.encoding.mime_type(),
            format.channel_count,
            format.sample_rate
        );
        self.format = Some(format);
        self.decoder.flush();
        if let Err(e) = self.sink.reconfigure(&format) {
            self.degrade_sink(e);
        }
        self.post(RendererEvent::FormatChanged(format));
    }

    /// Read one item from the source. Returns whether feeding may continue.
    fn feed_input_buffer(&mut self, track: usize, position_us: i64) -> Result<bool> {
        if self.input_stream_ended {
            return Ok(false);
        }

        if let Some(discontinuity_us) = self.source.read_discontinuity(track) {
            info!("Source discontinuity at {discontinuity_us}us");
            self.position.on_discontinuity(discontinuity_us);
            self.media_clock.set_position_us(discontinuity_us);
            self.decoder.flush();
            self.pending = None;
            self.sink.handle_discontinuity();
            return Ok(true);
        }

        self.format_holder.format = None;
        self.sample_holder.sample = None;
        let result = self.source.read_data(
            track,
            position_us,
            &mut self.format_holder,
            &mut self.sample_holder,
        )?;
        match result {
            ReadResult::NothingRead => {
                self.source.maybe_throw_error()?;
                Ok(false)
            }
            ReadResult::FormatRead => {
                if let Some(format) = self.format_holder.format.take() {
                    self.on_format(format);
                }
                Ok(true)
            }
            ReadResult::EndOfStream => {
                debug!("Input stream ended");
                self.input_stream_ended = true;
                Ok(false)
            }
            ReadResult::SampleRead => {
                let sample = self.sample_holder.sample.take().ok_or_else(|| {
                    Error::InvalidState("source reported a sample without data".to_string())
                })?;
                debug_assert!(self.pending.is_none() && self.decoder.in_flight() == 0);
                self.monitor.add_sample(
                    sample.presentation_time_us,
                    sample.size(),
                    sample.header_byte(),
                );
                self.decoder.decode(sample)?;
                Ok(true)
            }
        }
    }

    /// Move a completed decode into the pending slot.
    fn receive_decoded(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Ok(());
        }
        let Some(outcome) = self.decoder.poll() else {
            return Ok(());
        };
        match outcome.into_result() {
            Ok(unit) => {
                self.position.on_decoded(unit.presentation_time_us);
                self.pending = Some(unit);
                Ok(())
            }
            Err(e) => {
                if let Error::Decode { pts_us, message } = &e {
                    self.post(RendererEvent::DecodeError {
                        presentation_time_us: *pts_us,
                        message: message.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Write the pending unit. Returns true when ready for more input.
    fn process_output(&mut self, elapsed_realtime_us: i64) -> Result<bool> {
        if self.output_stream_ended {
            return Ok(false);
        }
        self.receive_decoded()?;

        let Some(unit) = self.pending.as_ref() else {
            if self.input_stream_ended && self.decoder.in_flight() == 0 {
                info!("Output stream ended");
                self.output_stream_ended = true;
                self.end_of_stream_us = Some(elapsed_realtime_us);
                self.post(RendererEvent::EndOfStream);
                return Ok(false);
            }
            return Ok(true);
        };
        let data = unit.data.clone();

        if !self.sink.is_initialized() {
            match self.sink.initialize() {
                Ok(()) => {
                    if self.state == RendererState::Started {
                        self.sink.play();
                    }
                }
                Err(e) => {
                    self.degrade_sink(e);
                    // Disabled wrappers initialize without the device.
                    self.sink.initialize()?;
                }
            }
        }

        let interpolated_us = self.position.interpolated_time_us(&self.policy);
        let result = match self
            .sink
            .write_buffer(&data, 0, data.len(), interpolated_us)
        {
            Ok(result) => result,
            Err(e) => {
                error!("Audio sink write failed: {e}");
                self.post(RendererEvent::TrackWriteError(e.clone()));
                return Err(e.into());
            }
        };
        trace!(
            "Wrote {} bytes at {interpolated_us}us (consumed: {})",
            data.len(),
            result.consumed
        );

        if result.position_discontinuity {
            debug!("Sink reported a position discontinuity");
            self.position.invalidate();
        }
        if result.consumed {
            self.position.on_written(interpolated_us);
            self.pending = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Sink setup failed: keep rendering with the sink disabled.
    fn degrade_sink(&mut self, error: SinkError) {
        warn!("Audio sink unavailable, continuing without audio: {error}");
        self.post(RendererEvent::TrackInitializationError(error));
        self.sink.set_enabled(false);
    }

    fn post(&self, event: RendererEvent) {
        // The renderer holds a receiver, so the channel never disconnects.
        let _ = self.event_tx.send(event);
    }
}

/// Whether a track of `encoding` can feed a renderer targeting `target`.
fn handles_encoding(target: Encoding, encoding: Encoding) -> bool {
    target == encoding || (target.is_ac3_family() && encoding.is_ac3_family())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_encoding() {
        assert!(handles_encoding(Encoding::Ac3, Encoding::Ac3));
        assert!(handles_encoding(Encoding::Ac3, Encoding::EAc3));
        assert!(!handles_encoding(Encoding::Ac3, Encoding::Pcm16));
        assert!(handles_encoding(Encoding::Pcm16, Encoding::Pcm16));
    }

    #[test]
    fn test_default_state() {
        assert_eq!(RendererState::default(), RendererState::Unprepared);
    }
}
