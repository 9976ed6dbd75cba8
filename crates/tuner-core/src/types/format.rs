//! Stream format types.

use serde::{Deserialize, Serialize};

/// Audio encoding carried by a track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Dolby Digital (AC-3).
    #[default]
    Ac3,
    /// Dolby Digital Plus (E-AC-3).
    EAc3,
    /// Interleaved signed 16-bit little-endian PCM.
    Pcm16,
}

impl Encoding {
    /// The MIME type for this encoding.
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Ac3 => "audio/ac3",
            Self::EAc3 => "audio/eac3",
            Self::Pcm16 => "audio/raw",
        }
    }

    /// Whether this encoding belongs to the AC-3 family.
    pub const fn is_ac3_family(&self) -> bool {
        matches!(self, Self::Ac3 | Self::EAc3)
    }
}

/// Format of an audio track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Format {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub encoding: Encoding,
    /// Track duration in microseconds (if known).
    pub duration_us: Option<i64>,
}

impl Format {
    pub const fn new(channel_count: u16, sample_rate: u32, encoding: Encoding) -> Self {
        Self {
            channel_count,
            sample_rate,
            encoding,
            duration_us: None,
        }
    }

    pub const fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Bytes per interleaved PCM frame, or `None` for bitstream encodings.
    pub const fn pcm_frame_size(&self) -> Option<usize> {
        match self.encoding {
            Encoding::Pcm16 => Some(self.channel_count as usize * 2),
            Encoding::Ac3 | Encoding::EAc3 => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ac3_family() {
        assert!(Encoding::Ac3.is_ac3_family());
        assert!(Encoding::EAc3.is_ac3_family());
        assert!(!Encoding::Pcm16.is_ac3_family());
    }

    #[test]
    fn test_pcm_frame_size() {
        let pcm = Format::new(2, 48_000, Encoding::Pcm16);
        assert_eq!(pcm.pcm_frame_size(), Some(4));
        let ac3 = Format::new(6, 48_000, Encoding::Ac3).with_duration_us(1_000_000);
        assert_eq!(ac3.pcm_frame_size(), None);
        assert_eq!(ac3.duration_us, Some(1_000_000));
    }
}
