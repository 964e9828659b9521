//! Audio pipeline between the capture stream and the two outputs.
//!
//! ```text
//!                      ┌─► lane (right) ─► ChannelBuffer ─► ChannelRouter (ch 0) ─► output 1
//! capture callback ─► FanOut
//!                      └─► lane (left)  ─► ChannelBuffer ─► ChannelRouter (ch 1) ─► output 2
//! ```
//!
//! - **FanOut**: hands every captured block to both lanes and waits for both
//! - **ChannelBuffer**: lock-free SPSC byte ring; overflow drops whole frames
//! - **ChannelRouter**: pulls frames for its output and keeps one channel
//!
//! The capture callback never waits on an output device.

mod channel_buffer;
mod fan_out;
mod router;

pub use channel_buffer::{channel_buffer, BufferStats, BufferWriter, ChannelBuffer, ChannelStats};
pub use fan_out::{CaptureCounters, FanOut};
pub use router::ChannelRouter;
