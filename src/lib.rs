//! # stereo-split
//!
//! Loopback capture of one audio endpoint, split across two output devices.
//!
//! `stereo-split` captures the mix an endpoint is playing and republishes it
//! to two other endpoints at the same time: the first output plays only
//! channel 0 (right), the second only channel 1 (left). Two small speakers
//! become one stereo pair.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stereo_split::{CapturePipe, CpalDriver, DeviceEnumerator};
//!
//! let driver = CpalDriver::new();
//! let outputs = driver.output_endpoints()?;
//! let input = driver.default_output_endpoint()?.expect("no default output");
//!
//! let pipe = CapturePipe::builder(input, [outputs[1].clone(), outputs[2].clone()])
//!     .driver(driver)
//!     .mute_input_when_piped(true)
//!     .on_event(|e| tracing::warn!(?e, "pipe event"))
//!     .build()?;
//!
//! pipe.start()?;
//! // ... until told to stop
//! pipe.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **Capture thread**: the driver's loopback callback hands each block to
//!   the fan-out and never waits on an output
//! - **Fan-out lanes**: one thread per output copies the block into that
//!   output's lock-free channel buffer
//! - **Output threads**: each device pulls frames through its router, which
//!   keeps a single channel and pads underruns with silence
//!
//! Lifecycle calls (`start`, `stop`, `close`) are serialized by the pipe and
//! may come from any thread.

// unsafe_code lint is configured in Cargo.toml as "deny"; the Windows endpoint volume module opts back in
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
pub mod driver;
mod endpoint;
mod error;
mod event;
mod format;
mod pair;
mod pipe;
pub mod pipeline;

pub use builder::PipeBuilder;
pub use config::{PipeConfig, DEFAULT_BUFFER_DURATION, DEFAULT_LATENCY_MS, MIN_LATENCY_MS};
pub use driver::{
    AudioDriver, CaptureStream, CpalDriver, DataCallback, DeviceEnumerator, MockDriver,
    OutputDevice, OutputOptions, ShareMode,
};
pub use endpoint::{resolve_endpoint, AudioEndpoint, EndpointId};
pub use error::{DriverError, PipeError};
pub use event::{event_callback, EventCallback, PipeEvent};
pub use format::{AudioFormat, SampleFormat};
pub use pair::{ChannelPair, ChannelRole};
pub use pipe::{CapturePipe, PipeStats, PlaybackState};
pub use pipeline::{ChannelRouter, ChannelStats};
