//! Audio sample encoding for backend submission.

use std::str::FromStr;

use crate::error::BridgeError;

/// Wire format of submitted audio samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// Signed 16-bit little-endian PCM.
    #[default]
    S16LE,
    /// 32-bit float little-endian PCM.
    F32LE,
}

impl AudioFormat {
    /// Size of one encoded sample in bytes.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16LE => 2,
            Self::F32LE => 4,
        }
    }

    /// Encodes interleaved f32 samples into this format.
    #[must_use]
    pub fn encode(self, samples: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * self.bytes_per_sample());
        match self {
            Self::S16LE => {
                for &s in samples {
                    out.extend_from_slice(&f32_to_i16(s).to_le_bytes());
                }
            }
            Self::F32LE => {
                for &s in samples {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
        out
    }
}

impl FromStr for AudioFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("s16le") {
            Ok(Self::S16LE)
        } else if s.eq_ignore_ascii_case("f32le") {
            Ok(Self::F32LE)
        } else {
            Err(BridgeError::InvalidSetting {
                section: "audio".to_string(),
                field: "format".to_string(),
                reason: format!("'{s}' is not one of s16le, f32le"),
            })
        }
    }
}

/// Shape of submitted audio: sample format, channel count and sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Encoding of each sample.
    pub format: AudioFormat,
    /// Interleaved channel count.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            format: AudioFormat::S16LE,
            channels: 2,
            sample_rate: 48_000,
        }
    }
}

impl AudioSpec {
    /// Size of one encoded interleaved frame in bytes.
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * usize::from(self.channels)
    }
}

/// Converts an f32 sample to i16.
///
/// Input is expected in [-1.0, 1.0]; values outside are clamped. Scales by
/// 32767 so that -1.0 maps to -32767.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
