//! Single-channel view over a channel buffer.

use crate::event::{emit, PipeEvent};
use crate::format::AudioFormat;
use crate::pair::ChannelRole;
use crate::pipeline::ChannelBuffer;
use crate::PipeError;

/// Exposes one channel of the captured stream to an output device.
///
/// The router owns its [`ChannelBuffer`] and is the only reader of it. Every
/// read pulls whole interleaved frames, keeps the sample of the router's
/// channel and drops the rest. The output sees a mono stream in the capture
/// format.
pub struct ChannelRouter {
    buffer: ChannelBuffer,
    role: ChannelRole,
    channel: usize,
    scratch: Vec<u8>,
    starved: bool,
}

impl ChannelRouter {
    /// Wires a router to extract the channel of `role` from `buffer`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the capture format does not have
    /// that channel.
    pub fn new(buffer: ChannelBuffer, role: ChannelRole) -> Result<Self, PipeError> {
        let channel = role.channel_index();
        let channels = usize::from(buffer.format().channels);
        if channel >= channels {
            return Err(PipeError::invalid_configuration(format!(
                "the {role} output needs capture channel {channel}, but the capture format has {channels} channel(s)"
            )));
        }

        Ok(Self {
            buffer,
            role,
            channel,
            scratch: Vec::new(),
            // Outputs start starved; the first underrun event fires once data has flowed
            starved: true,
        })
    }

    /// Returns the mono format this router produces.
    pub fn format(&self) -> AudioFormat {
        self.buffer.format().mono()
    }

    /// Returns the role of the output this router feeds.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Returns the capture channel this router extracts.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Fills `out` with single-channel samples.
    ///
    /// `out` is treated as a whole number of samples; a trailing partial
    /// sample is left untouched. Frames missing from the buffer are rendered
    /// as silence. Returns the number of bytes filled.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let format = self.buffer.format();
        let width = format.bytes_per_sample();
        let block_align = format.block_align();
        let frames = out.len() / width;
        let out = &mut out[..frames * width];

        self.scratch.resize(frames * block_align, 0);
        let read = self.buffer.read(&mut self.scratch);
        let available = read / block_align;

        let offset = self.channel * width;
        for (frame, sample) in self.scratch[..read]
            .chunks_exact(block_align)
            .zip(out.chunks_exact_mut(width))
        {
            sample.copy_from_slice(&frame[offset..offset + width]);
        }
        out[available * width..].fill(0);

        let stats = self.buffer.stats();
        stats.record_rendered(available * width);
        if available > 0 {
            self.starved = false;
        }
        if available < frames && !self.starved {
            self.starved = true;
            stats.record_underrun();
            tracing::trace!(role = %self.role, missing = frames - available, "output starved");
            emit(
                self.buffer.event_callback(),
                PipeEvent::BufferUnderrun { role: self.role },
            );
        }

        out.len()
    }

    /// Returns the buffer this router reads from.
    pub fn buffer(&self) -> &ChannelBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use crate::pipeline::{channel_buffer, BufferWriter};
    use std::time::Duration;

    fn interleave(frames: &[(i16, i16)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|&(a, b)| {
                let mut bytes = a.to_ne_bytes().to_vec();
                bytes.extend_from_slice(&b.to_ne_bytes());
                bytes
            })
            .collect()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]))
            .collect()
    }

    fn router(role: ChannelRole) -> (BufferWriter, ChannelRouter) {
        let format = AudioFormat::new(48000, 2, SampleFormat::I16);
        let (writer, buffer) = channel_buffer(format, Duration::from_secs(1), role, None);
        (writer, ChannelRouter::new(buffer, role).unwrap())
    }

    #[test]
    fn test_right_router_extracts_channel_zero() {
        let (mut writer, mut router) = router(ChannelRole::Right);
        writer.write(&interleave(&[(1, -1), (2, -2), (3, -3)]));

        let mut out = vec![0u8; 6];
        assert_eq!(router.read(&mut out), 6);
        assert_eq!(samples(&out), vec![1, 2, 3]);
    }

    #[test]
    fn test_left_router_extracts_channel_one() {
        let (mut writer, mut router) = router(ChannelRole::Left);
        writer.write(&interleave(&[(1, -1), (2, -2), (3, -3)]));

        let mut out = vec![0u8; 6];
        router.read(&mut out);
        assert_eq!(samples(&out), vec![-1, -2, -3]);
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let (mut writer, mut router) = router(ChannelRole::Right);
        writer.write(&interleave(&[(7, 0), (8, 0)]));

        let mut out = vec![0xFFu8; 8];
        assert_eq!(router.read(&mut out), 8);
        assert_eq!(samples(&out), vec![7, 8, 0, 0]);

        let stats = router.buffer().stats().snapshot();
        assert_eq!(stats.bytes_rendered, 4);
        assert_eq!(stats.underruns, 1);
    }

    #[test]
    fn test_underrun_counted_once_per_starvation() {
        let (mut writer, mut router) = router(ChannelRole::Right);
        let mut out = vec![0u8; 4];

        // Starved from the start: no event until audio has flowed
        router.read(&mut out);
        assert_eq!(router.buffer().stats().snapshot().underruns, 0);

        writer.write(&interleave(&[(1, 0), (2, 0)]));
        router.read(&mut out);
        router.read(&mut out);
        router.read(&mut out);
        assert_eq!(router.buffer().stats().snapshot().underruns, 1);
    }

    #[test]
    fn test_mono_capture_rejected_for_left() {
        let format = AudioFormat::new(48000, 1, SampleFormat::F32);
        let (_, buffer) = channel_buffer(format, Duration::from_secs(1), ChannelRole::Left, None);
        assert!(matches!(
            ChannelRouter::new(buffer, ChannelRole::Left),
            Err(PipeError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_output_format_is_mono() {
        let (_, router) = router(ChannelRole::Left);
        assert_eq!(router.format().channels, 1);
        assert_eq!(router.channel(), 1);
    }

    #[test]
    fn test_multichannel_capture_uses_front_pair() {
        let format = AudioFormat::new(48000, 4, SampleFormat::I16);
        let (mut writer, buffer) =
            channel_buffer(format, Duration::from_secs(1), ChannelRole::Left, None);
        let mut router = ChannelRouter::new(buffer, ChannelRole::Left).unwrap();

        let frame: Vec<u8> = [10i16, 11, 12, 13]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        writer.write(&frame);

        let mut out = vec![0u8; 2];
        router.read(&mut out);
        assert_eq!(samples(&out), vec![11]);
    }
}
