//! Compressed samples and decoded units.

use bytes::Bytes;

/// A compressed sample read from the upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Bytes,
    /// Presentation timestamp in microseconds.
    pub presentation_time_us: i64,
}

impl Sample {
    const HEADER_OFFSET: usize = 4;

    pub fn new(data: impl Into<Bytes>, presentation_time_us: i64) -> Self {
        Self {
            data: data.into(),
            presentation_time_us,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Cheap frame signature: the AC-3 `fscod`/`frmsizecod` byte after the
    /// sync word and CRC, or the first byte of shorter payloads.
    pub fn header_byte(&self) -> Option<u8> {
        self.data
            .get(Self::HEADER_OFFSET)
            .or_else(|| self.data.first())
            .copied()
    }
}

/// Output of a decode adapter, waiting to be written to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUnit {
    pub data: Bytes,
    /// Presentation timestamp in microseconds.
    pub presentation_time_us: i64,
}

impl DecodedUnit {
    pub fn new(data: impl Into<Bytes>, presentation_time_us: i64) -> Self {
        Self {
            data: data.into(),
            presentation_time_us,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl From<Sample> for DecodedUnit {
    fn from(sample: Sample) -> Self {
        Self {
            data: sample.data,
            presentation_time_us: sample.presentation_time_us,
        }
    }
}
