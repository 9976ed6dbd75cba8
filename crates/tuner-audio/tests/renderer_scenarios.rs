//! End-to-end renderer behavior against a recording device.

#![allow(clippy::unwrap_used)]

mod common;

use bytes::Bytes;
use common::{ac3_stereo, Harness};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::{Duration, Instant};
use tuner_audio::{
    DecoderAdapter, FrameDecodeError, FrameDecoder, RendererEvent, RendererMessage, RendererState,
};
use tuner_core::{DecoderKind, Encoding, Error, Format, RendererConfig, Sample, SinkError};

#[test]
fn test_writes_units_in_order_and_ends_after_drain() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000, 64_000]);
    h.source.finish();
    h.start();

    h.work_until(20, |h| h.device.lock().writes.len() == 3);
    assert_eq!(h.device.lock().write_times(), vec![0, 32_000, 64_000]);
    assert!(!h.renderer.is_ended());

    for _ in 0..3 {
        h.work().unwrap();
    }
    assert!(h.events().contains(&RendererEvent::EndOfStream));
    assert!(!h.renderer.is_ended(), "device still has queued audio");

    h.device.lock().drain();
    assert!(h.renderer.is_ended());
}

#[test]
fn test_first_format_is_announced_and_configured() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.start();
    h.work().unwrap();

    assert_eq!(h.renderer.format(), Some(&ac3_stereo()));
    assert_eq!(h.device.lock().configured, vec![ac3_stereo()]);
    assert!(h
        .events()
        .contains(&RendererEvent::FormatChanged(ac3_stereo())));
}

#[test]
fn test_mono_ac3_is_configured_as_stereo() {
    let mono = Format::new(1, 48_000, Encoding::Ac3);
    let mut h = Harness::passthrough(mono);
    h.push_frames(&[0]);
    h.start();

    h.work_until(10, |h| !h.device.lock().writes.is_empty());
    let configured = h.device.lock().configured.clone();
    assert_eq!(configured.len(), 1);
    assert_eq!(configured[0].channel_count, 2);
    assert_eq!(configured[0].encoding, Encoding::Ac3);
    // The renderer keeps the track's own format.
    assert_eq!(h.renderer.format().unwrap().channel_count, 1);
}

#[test]
fn test_discontinuity_restarts_interpolation() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 0]);
    h.source.push_discontinuity(5_000_000);
    h.push_frames(&[5_000_000, 5_000_000]);
    h.start();

    h.work_until(20, |h| h.device.lock().writes.len() == 4);
    assert_eq!(
        h.device.lock().write_times(),
        vec![0, 32_000, 5_000_000, 5_032_000]
    );
    assert_eq!(h.device.lock().discontinuities, 1);
    assert_eq!(h.renderer.playback_position().presentation_time_us, 5_000_000);
}

#[test]
fn test_repeated_timestamps_are_interpolated() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 0, 0]);
    h.source.push_discontinuity(5_000_000);
    h.push_frames(&[5_000_000]);
    h.start();

    h.work_until(20, |h| h.device.lock().writes.len() == 4);
    assert_eq!(
        h.device.lock().write_times(),
        vec![0, 32_000, 64_000, 5_000_000]
    );
    assert_eq!(h.renderer.playback_position().presentation_count, 0);
}

#[test]
fn test_end_of_stream_keep_alive_times_out() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.source.finish();
    h.start();

    h.clock.set_us(10_000_000);
    h.work_until(20, |h| !h.device.lock().writes.is_empty());
    for _ in 0..3 {
        h.work().unwrap();
    }
    assert!(h.events().contains(&RendererEvent::EndOfStream));

    h.clock.advance_ms(2_999);
    h.work().unwrap();

    h.clock.advance_ms(2);
    let err = h.work().unwrap_err();
    assert!(matches!(err, Error::EndOfStreamTimeout { elapsed_ms: 3_001 }));
    assert!(err.is_fatal());
}

#[test]
fn test_unconsumed_unit_blocks_further_reads() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000, 64_000]);
    h.device.lock().full = true;
    h.start();

    for _ in 0..10 {
        h.work().unwrap();
    }
    assert!(h.renderer.has_pending_unit());
    assert_eq!(h.source.queued(), 2);
    assert!(h.device.lock().writes.is_empty());

    h.device.lock().full = false;
    h.work().unwrap();
    assert_eq!(h.device.lock().write_times(), vec![0]);
}

#[test]
fn test_not_ready_before_format_is_read() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000]);
    h.start();
    assert!(!h.renderer.is_ready());
}

#[test]
fn test_ready_while_source_has_buffered_data() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000]);
    h.start();

    h.work().unwrap();
    assert!(h.renderer.format().is_some());
    assert!(!h.renderer.has_pending_unit());
    assert!(h.renderer.is_ready());
    assert!(h.events().contains(&RendererEvent::BufferingChanged(true)));
}

#[test]
fn test_ready_with_pending_unit_while_device_full() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.device.lock().full = true;
    h.start();

    h.work_until(10, |h| h.renderer.has_pending_unit());
    h.work().unwrap();
    assert_eq!(h.source.queued(), 0);
    assert!(h.events().contains(&RendererEvent::BufferingChanged(false)));
    assert!(h.renderer.is_ready());
}

#[test]
fn test_ready_from_device_data_after_source_empties() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.start();

    h.work_until(10, |h| !h.device.lock().writes.is_empty());
    h.work().unwrap();
    assert!(!h.renderer.has_pending_unit());
    assert!(h.events().contains(&RendererEvent::BufferingChanged(false)));
    assert!(h.renderer.is_ready());

    h.device.lock().drain();
    assert!(!h.renderer.is_ready());
}

#[test]
fn test_monitor_tracks_frame_size_codes() {
    let mut h = Harness::passthrough(ac3_stereo());
    for (pts, frmsizecod) in [(0, 0x1c), (32_000, 0x1e), (64_000, 0x1c)] {
        h.source.push_sample(Sample::new(
            vec![0x0b, 0x77, 0x00, 0x00, frmsizecod, 0x40],
            pts,
        ));
    }
    h.start();

    h.work_until(20, |h| h.device.lock().writes.len() == 3);
    let summary = h.renderer.monitor().summary();
    assert_eq!(summary.window_samples, 3);
    assert_eq!(summary.headers, vec![0x1c, 0x1e]);
}

#[test]
fn test_track_not_found() {
    let mut h = Harness::passthrough(Format::new(2, 48_000, Encoding::Pcm16));
    let err = h.renderer.prepare(0).unwrap_err();
    assert!(matches!(err, Error::TrackNotFound(_)));
    assert_eq!(h.renderer.state(), RendererState::Unprepared);
}

#[test]
fn test_eac3_track_matches_ac3_target() {
    let mut h = Harness::passthrough(Format::new(6, 48_000, Encoding::EAc3));
    assert!(h.renderer.prepare(0).unwrap());
    assert_eq!(h.renderer.state(), RendererState::Prepared);
}

#[test]
fn test_source_error_is_fatal() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.source.push_error("demuxer lost sync");
    h.start();

    let mut result = Ok(());
    for _ in 0..10 {
        result = h.work();
        if result.is_err() {
            break;
        }
    }
    let err = result.unwrap_err();
    assert!(matches!(err, Error::SourceIo(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_initialization_failure_degrades_to_silence() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.device.lock().fail_initialize = true;
    h.push_frames(&[0, 32_000]);
    h.source.finish();
    h.start();

    h.work_until(20, |h| h.renderer.is_ended());
    let events = h.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, RendererEvent::TrackInitializationError(SinkError::Initialization(_)))));
    assert!(events.contains(&RendererEvent::EndOfStream));
    assert!(!h.renderer.sink().is_enabled());
    assert!(h.device.lock().writes.is_empty());

    // Written timestamps minus the rendering delay are still before zero.
    assert_eq!(h.renderer.position_us(), 0);
}

#[test]
fn test_degraded_position_never_runs_backward() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.device.lock().fail_initialize = true;
    h.push_frames(&[0, 32_000, 64_000]);
    h.source.finish();
    h.start();
    h.clock.advance_ms(100);

    let mut last = h.renderer.position_us();
    assert_eq!(last, 100_000);
    for _ in 0..20 {
        h.work().unwrap();
        let now = h.renderer.position_us();
        assert!(now >= 0, "negative position {now}");
        assert!(now >= last, "position went backward {last} -> {now}");
        last = now;
    }
    assert!(!h.renderer.sink().is_enabled());
    assert_eq!(last, 100_000);
}

#[test]
fn test_write_error_is_fatal() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.device.lock().fail_write = true;
    h.push_frames(&[0]);
    h.start();

    let mut result = Ok(());
    for _ in 0..10 {
        result = h.work();
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(
        result.unwrap_err(),
        Error::Sink(SinkError::Write(_))
    ));
    assert!(h
        .events()
        .iter()
        .any(|e| matches!(e, RendererEvent::TrackWriteError(_))));
}

#[test]
fn test_track_toggle_reuses_session() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000, 64_000]);
    h.start();

    h.work_until(10, |h| h.device.lock().writes.len() == 1);
    let session = h.renderer.sink().session_id().unwrap();

    h.renderer
        .handle_message(RendererMessage::SetTrackEnabled(false));
    h.work().unwrap();
    assert_eq!(h.device.lock().writes.len(), 1, "disabled track writes nothing");

    h.renderer
        .handle_message(RendererMessage::SetTrackEnabled(true));
    h.work_until(10, |h| h.device.lock().writes.len() == 2);
    assert_eq!(h.renderer.sink().session_id(), Some(session));
    assert_eq!(
        h.device.lock().sessions_requested.last().copied(),
        Some(Some(session))
    );
    // The stored format was replayed to the device.
    assert_eq!(h.device.lock().configured.len(), 2);
}

#[test]
fn test_volume_message_reaches_device() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.start();
    h.work_until(10, |h| h.device.lock().writes.len() == 1);

    h.renderer.handle_message(RendererMessage::SetVolume(0.25));
    assert_eq!(h.device.lock().volume, Some(0.25));
    h.renderer.handle_message(RendererMessage::SetVolume(4.0));
    assert_eq!(h.device.lock().volume, Some(1.0));
}

#[test]
fn test_seek_opens_fresh_session() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000, 64_000, 96_000]);
    h.start();
    h.work_until(10, |h| h.device.lock().writes.len() == 1);

    h.renderer.seek_to(64_000).unwrap();
    assert_eq!(h.renderer.playback_position().presentation_time_us, 64_000);
    assert!(!h.renderer.has_pending_unit());

    h.work_until(10, |h| h.device.lock().writes.len() == 2);
    assert_eq!(h.device.lock().write_times(), vec![0, 64_000]);
    assert_eq!(h.device.lock().sessions_requested.last().copied(), Some(None));
    assert_ne!(h.renderer.sink().session_id().map(|s| s.0), Some(1));
}

#[test]
fn test_position_follows_media_clock_then_sink() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000, 64_000]);
    h.start();

    h.clock.advance_ms(20);
    assert_eq!(h.renderer.position_us(), 20_000);

    h.work_until(10, |h| h.renderer.sink().is_initialized());
    h.device.lock().position_us = Some(48_000);
    assert_eq!(h.renderer.position_us(), 48_000);

    // Small backward wobble from the device is absorbed.
    h.device.lock().position_us = Some(46_000);
    assert_eq!(h.renderer.position_us(), 48_000);
}

#[test]
fn test_disable_discards_pending_unit() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000]);
    h.device.lock().full = true;
    h.start();
    for _ in 0..4 {
        h.work().unwrap();
    }
    assert!(h.renderer.has_pending_unit());

    h.renderer.disable();
    assert!(!h.renderer.has_pending_unit());
    assert_eq!(h.renderer.state(), RendererState::Prepared);
    assert!(h.renderer.format().is_none());

    h.device.lock().full = false;
    assert!(h.renderer.do_some_work(0, 0).is_err());
    assert!(h.device.lock().writes.is_empty());
}

#[test]
fn test_disable_is_safe_before_enable() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.renderer.disable();
    assert_eq!(h.renderer.state(), RendererState::Unprepared);
    h.renderer.release();
    assert_eq!(h.device.lock().releases, 0);
}

#[test]
fn test_release_destroys_session() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0]);
    h.start();
    h.work_until(10, |h| h.device.lock().writes.len() == 1);

    h.renderer.release();
    assert_eq!(h.device.lock().releases, 1);
    assert_eq!(h.renderer.sink().session_id(), None);
    assert_eq!(h.renderer.state(), RendererState::Unprepared);
}

#[test]
fn test_start_and_stop_drive_device() {
    let mut h = Harness::passthrough(ac3_stereo());
    h.push_frames(&[0, 32_000]);
    h.start();
    h.work_until(10, |h| h.device.lock().writes.len() == 1);
    assert!(h.device.lock().playing);

    h.renderer.stop().unwrap();
    assert!(!h.device.lock().playing);
    assert_eq!(h.renderer.state(), RendererState::Enabled);
    assert!(h.renderer.stop().is_ok());
}

/// Waits on a gate before each frame, then reverses the payload.
struct GatedDecoder {
    gate: Receiver<()>,
}

impl FrameDecoder for GatedDecoder {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn decode_frame(
        &mut self,
        input: &[u8],
        _presentation_time_us: i64,
    ) -> Result<Bytes, FrameDecodeError> {
        let _ = self.gate.recv();
        if input.is_empty() {
            return Err(FrameDecodeError::Corrupt("empty frame".to_string()));
        }
        Ok(input.iter().rev().copied().collect::<Vec<u8>>().into())
    }
}

fn software_harness() -> (Harness, Sender<()>) {
    let (gate_tx, gate_rx) = unbounded();
    let config = RendererConfig {
        decoder: DecoderKind::Software,
        ..RendererConfig::default()
    };
    let decoder = DecoderAdapter::software(Box::new(GatedDecoder { gate: gate_rx }));
    (Harness::new(ac3_stereo(), config, decoder), gate_tx)
}

fn work_for(h: &mut Harness, done: impl Fn(&Harness) -> bool) -> tuner_core::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(h) {
        h.work()?;
        assert!(Instant::now() < deadline, "renderer made no progress");
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

#[test]
fn test_deferred_decode_holds_input() {
    let (mut h, gate) = software_harness();
    h.push_frames(&[0, 32_000, 64_000]);
    h.start();

    for _ in 0..10 {
        h.work().unwrap();
    }
    // One frame is with the worker; nothing else was read.
    assert_eq!(h.source.queued(), 2);
    assert!(!h.renderer.has_pending_unit());
    assert!(h.device.lock().writes.is_empty());

    drop(gate);
    work_for(&mut h, |h| h.device.lock().writes.len() == 3).unwrap();
    let device = h.device.lock();
    assert_eq!(device.write_times(), vec![0, 32_000, 64_000]);
    assert_eq!(device.writes[0].data, vec![0x00, 0x00, 0x77, 0x0b]);
}

#[test]
fn test_decode_failure_is_fatal() {
    let (mut h, gate) = software_harness();
    h.source.push_sample(Sample::new(Vec::new(), 96_000));
    h.start();
    drop(gate);

    let err = work_for(&mut h, |_| false).unwrap_err();
    assert!(matches!(err, Error::Decode { pts_us: 96_000, .. }));
    assert!(h.events().iter().any(|e| matches!(
        e,
        RendererEvent::DecodeError {
            presentation_time_us: 96_000,
            ..
        }
    )));
}
