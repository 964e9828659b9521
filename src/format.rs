//! Sample format of captured audio.
//!
//! The capture stream dictates the format for the whole pipe: the channel
//! buffers store captured bytes unmodified, and each router exposes the same
//! format reduced to a single channel. There is no format negotiation.

use std::time::Duration;

/// Encoding of a single sample.
///
/// Samples are stored in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// 32-bit IEEE float, nominally in [-1.0, 1.0].
    F32,
}

impl SampleFormat {
    /// Returns the size of one sample in bytes.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }
}

/// Layout of an interleaved PCM stream.
///
/// # Example
///
/// ```
/// use stereo_split::{AudioFormat, SampleFormat};
///
/// let format = AudioFormat::new(48000, 2, SampleFormat::F32);
/// assert_eq!(format.block_align(), 8);
/// assert_eq!(format.mono().block_align(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u16,
    /// Encoding of each sample.
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Creates a format description.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Returns the size of one sample in bytes.
    #[must_use]
    pub const fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes_per_sample()
    }

    /// Returns the size of one interleaved frame in bytes.
    #[must_use]
    pub const fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Returns the number of bytes per second of audio.
    #[must_use]
    pub const fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Returns the same format with a single channel.
    #[must_use]
    pub const fn mono(&self) -> Self {
        Self::new(self.sample_rate, 1, self.sample_format)
    }

    /// Returns the number of whole frames in `duration`.
    #[must_use]
    pub fn frames_for(&self, duration: Duration) -> usize {
        (f64::from(self.sample_rate) * duration.as_secs_f64()) as usize
    }

    /// Returns the byte size of `duration`, rounded down to whole frames.
    #[must_use]
    pub fn bytes_for(&self, duration: Duration) -> usize {
        self.frames_for(duration) * self.block_align()
    }

    /// Returns the playback duration of `bytes` bytes.
    #[must_use]
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let rate = self.bytes_per_second();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_sizes() {
        assert_eq!(SampleFormat::I16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::I32.bytes_per_sample(), 4);
        assert_eq!(SampleFormat::F32.bytes_per_sample(), 4);
    }

    #[test]
    fn test_stereo_float_layout() {
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);
        assert_eq!(format.block_align(), 8);
        assert_eq!(format.bytes_per_second(), 384_000);
    }

    #[test]
    fn test_mono_keeps_rate_and_encoding() {
        let format = AudioFormat::new(44100, 2, SampleFormat::I16).mono();
        assert_eq!(format.channels, 1);
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.sample_format, SampleFormat::I16);
    }

    #[test]
    fn test_bytes_for_rounds_to_frames() {
        let format = AudioFormat::new(48000, 2, SampleFormat::I16);
        // 10ms at 48kHz = 480 frames of 4 bytes
        assert_eq!(format.bytes_for(Duration::from_millis(10)), 1920);
        assert_eq!(format.bytes_for(Duration::from_secs(5)) % format.block_align(), 0);
    }

    #[test]
    fn test_duration_of() {
        let format = AudioFormat::new(16000, 1, SampleFormat::I16);
        assert_eq!(format.duration_of(32000), Duration::from_secs(1));
        assert_eq!(format.duration_of(0), Duration::ZERO);
    }
}
