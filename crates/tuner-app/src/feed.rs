//! Splits PCM into renderer-sized units and queues them on a source.

use bytes::Bytes;
use std::f32::consts::TAU;
use std::path::Path;
use tuner_audio::MemorySource;
use tuner_core::{Format, Sample};

/// Frames per unit, matching one AC-3 frame.
pub const FRAMES_PER_UNIT: usize = 1536;

/// Read a raw interleaved s16le file.
pub fn load_pcm(path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}

/// Synthesize a sine tone in the layout described by `format`.
pub fn tone(format: &Format, frequency_hz: f32, duration_ms: u64) -> Vec<u8> {
    let channels = usize::from(format.channel_count.max(1));
    let frames = (u64::from(format.sample_rate) * duration_ms / 1000) as usize;
    let step = TAU * frequency_hz / format.sample_rate as f32;

    let mut pcm = Vec::with_capacity(frames * channels * 2);
    for frame in 0..frames {
        let value = ((frame as f32 * step).sin() * 0.25 * f32::from(i16::MAX)) as i16;
        for _ in 0..channels {
            pcm.extend_from_slice(&value.to_le_bytes());
        }
    }
    pcm
}

/// Queue `pcm` on `source` in fixed-size units, then mark end of stream.
///
/// Returns the number of units queued. A trailing partial frame is dropped.
pub fn feed(source: &MemorySource, format: &Format, pcm: Vec<u8>) -> usize {
    let Some(frame_size) = format.pcm_frame_size().filter(|&size| size > 0) else {
        source.finish();
        return 0;
    };
    let pcm = Bytes::from(pcm);
    let usable = pcm.len() - pcm.len() % frame_size;
    let unit_size = FRAMES_PER_UNIT * frame_size;

    let mut units = 0;
    let mut offset = 0;
    while offset < usable {
        let end = (offset + unit_size).min(usable);
        let frames_before = (offset / frame_size) as i64;
        let pts = frames_before * 1_000_000 / i64::from(format.sample_rate);
        source.push_sample(Sample::new(pcm.slice(offset..end), pts));
        units += 1;
        offset = end;
    }
    source.finish();
    units
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tuner_audio::{FormatHolder, ReadResult, SampleHolder, SampleSource};
    use tuner_core::Encoding;

    fn stereo() -> Format {
        Format::new(2, 48_000, Encoding::Pcm16)
    }

    #[test]
    fn test_tone_length() {
        let pcm = tone(&stereo(), 440.0, 100);
        assert_eq!(pcm.len(), 4_800 * 4);
    }

    #[test]
    fn test_feed_timestamps_advance_per_unit() {
        let source = MemorySource::with_format(stereo());
        // Two full units and a partial one, plus a stray byte.
        let pcm = vec![0u8; (FRAMES_PER_UNIT * 2 + 100) * 4 + 1];
        assert_eq!(feed(&source, &stereo(), pcm), 3);
        // Three samples plus the end-of-stream marker.
        assert_eq!(source.queued(), 4);

        let mut reader = source.clone();
        reader.enable(0, 0);
        let mut format_holder = FormatHolder::default();
        let mut sample_holder = SampleHolder::default();
        let mut units = Vec::new();
        loop {
            match reader
                .read_data(0, 0, &mut format_holder, &mut sample_holder)
                .unwrap()
            {
                ReadResult::SampleRead => {
                    let sample = sample_holder.sample.take().unwrap();
                    units.push((sample.presentation_time_us, sample.size()));
                }
                ReadResult::EndOfStream => break,
                _ => {}
            }
        }
        assert_eq!(
            units,
            vec![(0, 6_144), (32_000, 6_144), (64_000, 400)]
        );
    }

    #[test]
    fn test_feed_rejects_compressed_format() {
        let source = MemorySource::with_format(Format::new(2, 48_000, Encoding::Ac3));
        assert_eq!(feed(&source, &Format::new(2, 48_000, Encoding::Ac3), vec![0; 64]), 0);
        assert_eq!(source.queued(), 1);
    }
}
