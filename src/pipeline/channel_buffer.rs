//! Per-output byte buffer between the capture callback and a router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::event::{emit, EventCallback, PipeEvent};
use crate::format::AudioFormat;
use crate::pair::ChannelRole;

/// Counters shared between the two halves of a channel buffer.
#[derive(Debug, Default)]
pub struct BufferStats {
    bytes_written: AtomicU64,
    bytes_dropped: AtomicU64,
    bytes_rendered: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`BufferStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Captured bytes accepted into the buffer.
    pub bytes_written: u64,
    /// Captured bytes dropped because the buffer was full.
    pub bytes_dropped: u64,
    /// Single-channel bytes handed to the output device.
    pub bytes_rendered: u64,
    /// Times the output became starved.
    pub underruns: u64,
}

impl BufferStats {
    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
            bytes_rendered: self.bytes_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_rendered(&self, bytes: usize) {
        self.bytes_rendered.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }
}

/// Write half of a channel buffer, fed by the capture fan-out.
///
/// Writes never block: frames that do not fit are dropped and reported.
pub struct BufferWriter {
    producer: HeapProd<u8>,
    partial: Vec<u8>,
    block_align: usize,
    role: ChannelRole,
    stats: Arc<BufferStats>,
    event_callback: Option<EventCallback>,
}

impl BufferWriter {
    /// Appends a block of captured bytes.
    ///
    /// A block may end mid-frame; the trailing bytes are held back and
    /// completed by the next block, so frame boundaries survive any block
    /// size. Whole frames are dropped only when the buffer is full. Returns
    /// the number of bytes stored.
    pub fn write(&mut self, block: &[u8]) -> usize {
        let mut rest = block;
        let mut written = 0;
        let mut dropped = 0;

        if !self.partial.is_empty() {
            let take = (self.block_align - self.partial.len()).min(rest.len());
            self.partial.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.partial.len() < self.block_align {
                return 0;
            }
            if self.producer.vacant_len() >= self.block_align {
                written += self.producer.push_slice(&self.partial);
            } else {
                dropped += self.block_align;
            }
            self.partial.clear();
        }

        let (frames, tail) = rest.split_at(rest.len() - rest.len() % self.block_align);
        let vacant = self.producer.vacant_len();
        let room = vacant - vacant % self.block_align;
        let accepted = self.producer.push_slice(&frames[..frames.len().min(room)]);
        written += accepted;
        dropped += frames.len() - accepted;
        self.partial.extend_from_slice(tail);

        self.stats
            .bytes_written
            .fetch_add(written as u64, Ordering::Relaxed);

        if dropped > 0 {
            self.stats
                .bytes_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::trace!(role = %self.role, dropped, "channel buffer full");
            emit(
                self.event_callback.as_ref(),
                PipeEvent::BufferOverflow {
                    role: self.role,
                    dropped_bytes: dropped,
                },
            );
        }

        written
    }

    /// Returns the role of the output this buffer feeds.
    pub fn role(&self) -> ChannelRole {
        self.role
    }
}

/// Read half of a channel buffer, owned by its [`ChannelRouter`].
///
/// Holds the captured stream exactly as it arrived: interleaved, every
/// channel, capture format.
///
/// [`ChannelRouter`]: crate::pipeline::ChannelRouter
pub struct ChannelBuffer {
    consumer: HeapCons<u8>,
    format: AudioFormat,
    role: ChannelRole,
    stats: Arc<BufferStats>,
    event_callback: Option<EventCallback>,
}

impl ChannelBuffer {
    /// Returns the capture format of the stored bytes.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Returns the role of the output this buffer feeds.
    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Returns the duration of audio currently buffered.
    pub fn buffered_duration(&self) -> Duration {
        self.format.duration_of(self.buffered_bytes())
    }

    /// Returns the total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.consumer.capacity().get()
    }

    /// Reads whole frames into `out`.
    ///
    /// Returns the number of bytes read, always a multiple of the frame size.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let block_align = self.format.block_align();
        let available = self.consumer.occupied_len();
        let len = out.len().min(available);
        let len = len - len % block_align;
        self.consumer.pop_slice(&mut out[..len])
    }

    pub(crate) fn stats(&self) -> &Arc<BufferStats> {
        &self.stats
    }

    pub(crate) fn event_callback(&self) -> Option<&EventCallback> {
        self.event_callback.as_ref()
    }
}

/// Creates a channel buffer for one output.
///
/// Returns the writer (for the capture fan-out) and the buffer (for the
/// router). Capacity is `capacity` worth of audio in `format`, at least one
/// frame.
pub fn channel_buffer(
    format: AudioFormat,
    capacity: Duration,
    role: ChannelRole,
    event_callback: Option<EventCallback>,
) -> (BufferWriter, ChannelBuffer) {
    let block_align = format.block_align().max(1);
    let bytes = format.bytes_for(capacity).max(block_align);

    let (producer, consumer) = HeapRb::<u8>::new(bytes).split();
    let stats = Arc::new(BufferStats::default());

    let writer = BufferWriter {
        producer,
        partial: Vec::with_capacity(block_align),
        block_align,
        role,
        stats: Arc::clone(&stats),
        event_callback: event_callback.clone(),
    };
    let buffer = ChannelBuffer {
        consumer,
        format,
        role,
        stats,
        event_callback,
    };

    (writer, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;
    use std::sync::Mutex;

    fn stereo_i16() -> AudioFormat {
        AudioFormat::new(1000, 2, SampleFormat::I16)
    }

    #[test]
    fn test_write_then_read_preserves_bytes() {
        let (mut writer, mut buffer) =
            channel_buffer(stereo_i16(), Duration::from_secs(1), ChannelRole::Right, None);

        let block: Vec<u8> = (0..40u8).collect();
        assert_eq!(writer.write(&block), 40);
        assert_eq!(buffer.buffered_bytes(), 40);

        let mut out = vec![0u8; 40];
        assert_eq!(buffer.read(&mut out), 40);
        assert_eq!(out, block);
    }

    #[test]
    fn test_capacity_is_whole_frames() {
        let (_, buffer) =
            channel_buffer(stereo_i16(), Duration::from_millis(10), ChannelRole::Left, None);
        // 10 frames of 4 bytes
        assert_eq!(buffer.capacity(), 40);
    }

    #[test]
    fn test_read_returns_whole_frames_only() {
        let (mut writer, mut buffer) =
            channel_buffer(stereo_i16(), Duration::from_secs(1), ChannelRole::Right, None);
        writer.write(&[1u8; 8]);

        let mut out = [0u8; 6];
        assert_eq!(buffer.read(&mut out), 4);
        assert_eq!(buffer.buffered_bytes(), 4);
    }

    #[test]
    fn test_overflow_drops_whole_frames_and_reports() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: EventCallback = Arc::new(move |e: PipeEvent| sink.lock().unwrap().push(e));

        // 10 frames of capacity
        let (mut writer, buffer) = channel_buffer(
            stereo_i16(),
            Duration::from_millis(10),
            ChannelRole::Left,
            Some(callback),
        );

        assert_eq!(writer.write(&[0u8; 36]), 36);
        // One frame of room left; 2 frames offered
        assert_eq!(writer.write(&[0u8; 8]), 4);
        assert_eq!(buffer.buffered_bytes(), 40);

        let stats = buffer.stats().snapshot();
        assert_eq!(stats.bytes_written, 40);
        assert_eq!(stats.bytes_dropped, 4);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![PipeEvent::BufferOverflow {
                role: ChannelRole::Left,
                dropped_bytes: 4
            }]
        );
    }

    #[test]
    fn test_frame_split_across_blocks() {
        let (mut writer, mut buffer) =
            channel_buffer(stereo_i16(), Duration::from_secs(1), ChannelRole::Right, None);
        let stream: Vec<u8> = (0..16u8).collect();

        // 2.5 frames, then the rest of the third frame and one more
        assert_eq!(writer.write(&stream[..10]), 8);
        assert_eq!(writer.write(&stream[10..]), 8);

        let mut out = vec![0u8; 16];
        assert_eq!(buffer.read(&mut out), 16);
        assert_eq!(out, stream);
        assert_eq!(buffer.stats().snapshot().bytes_dropped, 0);
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let (mut writer, buffer) =
            channel_buffer(stereo_i16(), Duration::from_secs(1), ChannelRole::Left, None);

        assert_eq!(writer.write(&[1u8]), 0);
        assert_eq!(writer.write(&[2u8, 3]), 0);
        assert_eq!(writer.write(&[4u8]), 4);
        assert_eq!(buffer.buffered_bytes(), 4);
    }

    #[test]
    fn test_completed_frame_dropped_when_full() {
        let (mut writer, buffer) =
            channel_buffer(stereo_i16(), Duration::from_millis(1), ChannelRole::Right, None);
        assert_eq!(buffer.capacity(), 4);

        assert_eq!(writer.write(&[0u8; 6]), 4);
        assert_eq!(writer.write(&[0u8; 2]), 0);

        let stats = buffer.stats().snapshot();
        assert_eq!(stats.bytes_written, 4);
        assert_eq!(stats.bytes_dropped, 4);
    }

    #[test]
    fn test_buffered_duration() {
        let (mut writer, buffer) =
            channel_buffer(stereo_i16(), Duration::from_secs(1), ChannelRole::Right, None);
        // 100 frames at 1kHz
        writer.write(&[0u8; 400]);
        assert_eq!(buffer.buffered_duration(), Duration::from_millis(100));
    }
}
