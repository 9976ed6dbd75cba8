//! Enable-guarded access to the shared output device.
//!
//! While disabled every operation returns a benign value without touching the
//! device, so an unusable device degrades to silent playback instead of an
//! error path through the renderer.

use super::{SessionId, SharedSink, WriteResult};
use tracing::{debug, info};
use tuner_core::{Format, SinkError};

pub struct SinkWrapper {
    sink: SharedSink,
    enabled: bool,
    initialized: bool,
    session_id: Option<SessionId>,
    /// Last format requested, after upmixing.
    format: Option<Format>,
    /// Format must be pushed to the device before the next initialize.
    needs_configure: bool,
    volume: f32,
}

impl SinkWrapper {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            enabled: true,
            initialized: false,
            session_id: None,
            format: None,
            needs_configure: false,
            volume: 1.0,
        }
    }

    /// Bind to the device, keeping the session across re-initialization.
    ///
    /// While disabled the wrapper only records that it is primed.
    pub fn initialize(&mut self) -> Result<(), SinkError> {
        if !self.enabled {
            self.initialized = true;
            return Ok(());
        }

        let mut sink = self.sink.lock();
        if self.needs_configure {
            if let Some(format) = &self.format {
                sink.configure(format, true)?;
            }
            self.needs_configure = false;
        }
        let session_id = sink.initialize(self.session_id)?;
        sink.set_volume(self.volume);
        drop(sink);

        if self.session_id != Some(session_id) {
            info!("Audio sink bound to {session_id}");
        }
        self.session_id = Some(session_id);
        self.initialized = true;
        Ok(())
    }

    /// Apply a new track format.
    ///
    /// Mono AC-3 is requested as stereo: passthrough outputs cannot carry a
    /// single-channel bitstream.
    pub fn reconfigure(&mut self, format: &Format) -> Result<(), SinkError> {
        let mut format = *format;
        if format.channel_count == 1 && format.encoding.is_ac3_family() {
            debug!("Upmixing mono {:?} to stereo", format.encoding);
            format.channel_count = 2;
        }
        self.format = Some(format);

        if !self.enabled {
            self.needs_configure = true;
            return Ok(());
        }
        let mut sink = self.sink.lock();
        sink.configure(&format, true)?;
        // A format change may have closed the output.
        self.initialized &= sink.is_initialized();
        self.needs_configure = false;
        Ok(())
    }

    pub fn write_buffer(
        &mut self,
        buffer: &[u8],
        offset: usize,
        size: usize,
        presentation_time_us: i64,
    ) -> Result<WriteResult, SinkError> {
        if !self.enabled {
            return Ok(WriteResult::consumed());
        }
        self.sink
            .lock()
            .handle_buffer(buffer, offset, size, presentation_time_us)
    }

    /// Drop queued audio; the device must be initialized again afterwards.
    pub fn reset(&mut self) {
        if self.enabled {
            self.sink.lock().reset();
        }
        self.initialized = false;
    }

    pub fn play(&mut self) {
        if self.enabled {
            self.sink.lock().play();
        }
    }

    pub fn pause(&mut self) {
        if self.enabled {
            self.sink.lock().pause();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if self.enabled {
            self.sink.lock().set_volume(self.volume);
        }
    }

    pub fn handle_discontinuity(&mut self) {
        if self.enabled {
            self.sink.lock().handle_discontinuity();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        if enabled {
            self.enabled = true;
            // Rebind on the next initialize, replaying the stored format.
            self.initialized = false;
            self.needs_configure = self.format.is_some();
            info!("Audio sink enabled");
        } else {
            self.reset();
            self.enabled = false;
            info!("Audio sink disabled");
        }
    }

    pub fn current_position_us(&mut self, is_ended: bool) -> Option<i64> {
        if !self.enabled {
            return None;
        }
        self.sink.lock().current_position_us(is_ended)
    }

    pub fn has_pending_data(&self) -> bool {
        self.enabled && self.sink.lock().has_pending_data()
    }

    /// The device still has audio to play.
    pub fn is_ready(&self) -> bool {
        self.enabled && self.sink.lock().is_ready()
    }

    /// Force the next initialize to open a fresh session.
    pub fn reset_session_id(&mut self) {
        if self.session_id.take().is_some() {
            debug!("Audio session invalidated");
        }
    }

    /// Final teardown: release the device binding and its session.
    pub fn release(&mut self) {
        if self.session_id.take().is_some() {
            self.sink.lock().release();
        }
        self.initialized = false;
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }
}
