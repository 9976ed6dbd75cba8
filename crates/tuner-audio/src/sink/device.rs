//! PCM output device built on cpal.
//!
//! The cpal stream is not `Send`, so it lives on its own thread for as long as
//! the device is open; the sink talks to the callback through a shared
//! [`PcmQueue`] plus volume and play flags.

use super::{AudioSink, SessionId, WriteResult};
use crate::buffer::{shared_pcm_queue, SharedPcmQueue};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};
use tuner_core::{Encoding, Format, SinkError};

/// Queue depth in milliseconds of audio.
const QUEUE_DURATION_MS: usize = 500;

/// Timestamps further than this from the expected position re-anchor the
/// timeline.
const DISCONTINUITY_TOLERANCE_US: i64 = 200_000;

/// Handle to the thread that owns the cpal stream.
struct OutputThread {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
    format: Format,
}

impl OutputThread {
    fn close(self) {
        drop(self.shutdown_tx);
        if self.handle.join().is_err() {
            error!("Audio output thread panicked");
        }
    }
}

/// Audio sink writing 16-bit PCM to a cpal output device.
pub struct CpalSink {
    /// Output device by name; `None` uses the host default.
    device_name: Option<String>,
    format: Option<Format>,
    queue: SharedPcmQueue,
    volume: Arc<Mutex<f32>>,
    playing: Arc<AtomicBool>,
    output: Option<OutputThread>,
    bound: bool,
    session: Option<SessionId>,
    next_session: u32,
    /// Media time of the first frame counted by the queue.
    start_media_time_us: Option<i64>,
    frames_written: u64,
    resync: bool,
}

impl CpalSink {
    pub fn new() -> Self {
        Self::with_device_name(None)
    }

    pub fn with_device_name(device_name: Option<String>) -> Self {
        Self {
            device_name,
            format: None,
            queue: shared_pcm_queue(0),
            volume: Arc::new(Mutex::new(1.0)),
            playing: Arc::new(AtomicBool::new(false)),
            output: None,
            bound: false,
            session: None,
            next_session: 0,
            start_media_time_us: None,
            frames_written: 0,
            resync: false,
        }
    }

    fn open_output(&mut self, format: Format) -> Result<(), SinkError> {
        if let Some(output) = self.output.take() {
            output.close();
        }

        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let device_name = self.device_name.clone();
        let queue = self.queue.clone();
        let volume = self.volume.clone();
        let playing = self.playing.clone();

        let handle = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                match open_stream(device_name.as_deref(), &format, queue, volume, playing) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        // Hold the stream until the sink closes the channel.
                        let _ = shutdown_rx.recv();
                        drop(stream);
                        debug!("Audio output stream closed");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| {
                SinkError::Initialization(format!("Failed to spawn output thread: {e}"))
            })?;

        let ready = ready_rx.recv().map_err(|_| {
            SinkError::Initialization("Audio output thread exited".to_string())
        })?;
        match ready {
            Ok(device_name) => {
                info!(
                    "Audio output open on {device_name}: {}Hz, {} channels",
                    format.sample_rate, format.channel_count
                );
                self.output = Some(OutputThread {
                    shutdown_tx,
                    handle,
                    format,
                });
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(SinkError::Initialization(e))
            }
        }
    }

    fn close_output(&mut self) {
        if let Some(output) = self.output.take() {
            output.close();
        }
        self.bound = false;
    }

    fn clear_timeline(&mut self) {
        self.queue.clear();
        self.start_media_time_us = None;
        self.frames_written = 0;
        self.resync = false;
    }

    fn frames_to_us(frames: u64, sample_rate: u32) -> i64 {
        (frames as i64 * 1_000_000) / i64::from(sample_rate.max(1))
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close_output();
    }
}

impl AudioSink for CpalSink {
    fn initialize(&mut self, session: Option<SessionId>) -> Result<SessionId, SinkError> {
        let format = self
            .format
            .ok_or_else(|| SinkError::Initialization("format not configured".to_string()))?;

        let reusable = self.output.as_ref().is_some_and(|o| o.format == format);
        if !reusable {
            self.open_output(format)?;
        }

        let session_id = match session.or(self.session) {
            Some(id) => id,
            None => {
                self.next_session += 1;
                SessionId(self.next_session)
            }
        };
        self.session = Some(session_id);
        self.bound = true;
        Ok(session_id)
    }

    fn is_initialized(&self) -> bool {
        self.bound && self.output.is_some()
    }

    fn configure(&mut self, format: &Format, _tunneling: bool) -> Result<(), SinkError> {
        if format.encoding != Encoding::Pcm16 {
            return Err(SinkError::Configuration(format!(
                "{} passthrough is not supported by this device",
                format.encoding.mime_type()
            )));
        }
        if format.channel_count == 0 || format.sample_rate == 0 {
            return Err(SinkError::Configuration(format!(
                "invalid PCM format: {} channels at {}Hz",
                format.channel_count, format.sample_rate
            )));
        }
        if self.format.as_ref() == Some(format) {
            return Ok(());
        }

        debug!("Configuring cpal sink: {:?}", format);
        self.close_output();
        let capacity = format.sample_rate as usize * usize::from(format.channel_count)
            * QUEUE_DURATION_MS
            / 1000;
        self.queue = shared_pcm_queue(capacity);
        self.format = Some(*format);
        self.clear_timeline();
        Ok(())
    }

    fn handle_buffer(
        &mut self,
        buffer: &[u8],
        offset: usize,
        size: usize,
        presentation_time_us: i64,
    ) -> Result<WriteResult, SinkError> {
        let format = match (self.format, self.is_initialized()) {
            (Some(format), true) => format,
            _ => return Err(SinkError::Write("sink not initialized".to_string())),
        };
        let bytes = offset
            .checked_add(size)
            .and_then(|end| buffer.get(offset..end))
            .ok_or_else(|| {
                SinkError::Write(format!(
                    "range {offset}+{size} outside buffer of {}",
                    buffer.len()
                ))
            })?;
        let channels = usize::from(format.channel_count);
        if bytes.len() % (channels * 2) != 0 {
            return Err(SinkError::Write(format!(
                "{} bytes is not a whole number of frames",
                bytes.len()
            )));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
            .collect();
        if self.queue.free() < samples.len() {
            return Ok(WriteResult::pending());
        }

        let written_us = Self::frames_to_us(self.frames_written, format.sample_rate);
        let mut result = WriteResult::consumed();
        match self.start_media_time_us {
            Some(start) if !self.resync => {
                let expected = start + written_us;
                if (presentation_time_us - expected).abs() > DISCONTINUITY_TOLERANCE_US {
                    warn!(
                        "Discontinuity detected: expected {expected}us, got {presentation_time_us}us"
                    );
                    self.start_media_time_us = Some(presentation_time_us - written_us);
                    result = result.with_discontinuity();
                }
            }
            _ => {
                self.start_media_time_us = Some(presentation_time_us - written_us);
                self.resync = false;
            }
        }

        if !self.queue.push_all(&samples) {
            return Ok(WriteResult::pending());
        }
        self.frames_written += (samples.len() / channels) as u64;
        Ok(result)
    }

    fn play(&mut self) {
        self.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.playing.store(false, Ordering::Release);
    }

    fn reset(&mut self) {
        self.playing.store(false, Ordering::Release);
        self.clear_timeline();
        self.bound = false;
    }

    fn release(&mut self) {
        self.reset();
        self.close_output();
        self.session = None;
    }

    fn set_volume(&mut self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn handle_discontinuity(&mut self) {
        self.resync = true;
    }

    fn current_position_us(&mut self, _is_ended: bool) -> Option<i64> {
        let format = self.format?;
        let start = self.start_media_time_us?;
        let played_frames = self.queue.played() / u64::from(format.channel_count.max(1));
        Some(start + Self::frames_to_us(played_frames, format.sample_rate))
    }

    fn has_pending_data(&self) -> bool {
        !self.queue.is_empty()
    }
}

fn find_device(device_name: Option<&str>) -> Result<Device, String> {
    let host = cpal::default_host();
    match device_name {
        None => host
            .default_output_device()
            .ok_or_else(|| "No output device found".to_string()),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| format!("Failed to list devices: {e}"))?
            .find(|d| d.name().is_ok_and(|name| name == wanted))
            .ok_or_else(|| format!("Output device not found: {wanted}")),
    }
}

fn open_stream(
    device_name: Option<&str>,
    format: &Format,
    queue: SharedPcmQueue,
    volume: Arc<Mutex<f32>>,
    playing: Arc<AtomicBool>,
) -> Result<(Stream, String), String> {
    let device = find_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let sample_format = device
        .default_output_config()
        .map_err(|e| format!("Failed to get output config: {e}"))?
        .sample_format();
    let config = StreamConfig {
        channels: format.channel_count,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, queue, volume, playing)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, queue, volume, playing)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, queue, volume, playing)?,
        _ => return Err(format!("Unsupported sample format: {sample_format:?}")),
    };
    stream
        .play()
        .map_err(|e| format!("Failed to start stream: {e}"))?;
    Ok((stream, name))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    queue: SharedPcmQueue,
    volume: Arc<Mutex<f32>>,
    playing: Arc<AtomicBool>,
) -> Result<Stream, String> {
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !playing.load(Ordering::Acquire) {
                    for sample in data.iter_mut() {
                        *sample = T::from_sample(0.0f32);
                    }
                    return;
                }

                scratch.resize(data.len(), 0.0);
                let read = queue.pop_into(&mut scratch);
                let vol = *volume.lock();
                for (i, sample) in data.iter_mut().enumerate() {
                    let s = if i < read { scratch[i] * vol } else { 0.0 };
                    *sample = T::from_sample(s);
                }
            },
            |err| error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| format!("Failed to build stream: {e}"))
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>, SinkError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| SinkError::Initialization(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();
    Ok(devices)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_passthrough_formats_rejected() {
        let mut sink = CpalSink::new();
        let err = sink
            .configure(&Format::new(2, 48_000, Encoding::Ac3), true)
            .unwrap_err();
        assert!(matches!(err, SinkError::Configuration(_)));
        let err = sink
            .configure(&Format::new(0, 48_000, Encoding::Pcm16), true)
            .unwrap_err();
        assert!(matches!(err, SinkError::Configuration(_)));
    }

    #[test]
    fn test_initialize_requires_format() {
        let mut sink = CpalSink::new();
        assert!(matches!(
            sink.initialize(None),
            Err(SinkError::Initialization(_))
        ));
    }

    #[test]
    fn test_write_requires_initialize() {
        let mut sink = CpalSink::new();
        sink.configure(&Format::new(2, 48_000, Encoding::Pcm16), true)
            .unwrap();
        assert!(matches!(
            sink.handle_buffer(&[0; 8], 0, 8, 0),
            Err(SinkError::Write(_))
        ));
        assert_eq!(sink.current_position_us(false), None);
        assert!(!sink.has_pending_data());
    }

    #[test]
    fn test_list_devices() {
        // May fail on machines without audio hardware; must not panic.
        let _ = list_output_devices();
    }
}
