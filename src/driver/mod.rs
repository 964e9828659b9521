//! Driver layer seam between the pipe and the OS audio subsystem.
//!
//! The pipe never talks to an audio API directly. It asks an [`AudioDriver`]
//! for a loopback [`CaptureStream`] and two [`OutputDevice`]s, and toggles
//! the capture endpoint's mute flag through it.
//!
//! - [`CpalDriver`]: real devices through cpal (WASAPI loopback on Windows)
//! - [`MockDriver`]: in-memory driver for tests, with failure injection

mod cpal;
mod endpoint_volume;
mod mock;

pub use self::cpal::CpalDriver;
pub use mock::MockDriver;

use std::time::Duration;

use crate::endpoint::AudioEndpoint;
use crate::format::AudioFormat;
use crate::pipeline::ChannelRouter;
use crate::DriverError;

/// Receives every block of captured bytes, in the capture format.
///
/// Called on the driver's audio thread.
pub type DataCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// How an output device shares the endpoint with other applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareMode {
    /// Mixed with other applications by the OS.
    #[default]
    Shared,
    /// Exclusive use of the endpoint.
    Exclusive,
}

/// Settings passed to [`AudioDriver::open_output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Endpoint sharing mode.
    pub share_mode: ShareMode,
    /// Whether the device pulls audio on buffer events rather than polling.
    pub event_driven: bool,
    /// Requested buffering delay.
    pub latency: Duration,
}

impl OutputOptions {
    /// Shared, event-driven output with the given latency.
    #[must_use]
    pub fn shared(latency: Duration) -> Self {
        Self {
            share_mode: ShareMode::Shared,
            event_driven: true,
            latency,
        }
    }
}

/// A loopback capture of one endpoint.
///
/// Dropping the stream releases the device.
pub trait CaptureStream: Send {
    /// Returns the format of the captured bytes.
    fn format(&self) -> AudioFormat;

    /// Registers the receiver of captured blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot attach the callback.
    fn set_data_callback(&mut self, callback: DataCallback) -> Result<(), DriverError>;

    /// Starts delivering captured blocks.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if no data callback was registered.
    fn start(&mut self) -> Result<(), DriverError>;

    /// Stops delivering captured blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to stop the stream.
    fn stop(&mut self) -> Result<(), DriverError>;
}

/// An output device that renders audio pulled from a router.
///
/// Dropping the device releases it.
pub trait OutputDevice: Send {
    /// Attaches the router the device pulls audio from.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot render the router's format.
    fn init(&mut self, source: ChannelRouter) -> Result<(), DriverError>;

    /// Starts rendering.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before [`init`](Self::init).
    fn play(&mut self) -> Result<(), DriverError>;

    /// Stops rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to stop the device.
    fn stop(&mut self) -> Result<(), DriverError>;
}

/// Opens capture and output devices and controls endpoint mute.
pub trait AudioDriver: Send + Sync {
    /// Opens a loopback capture of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be captured.
    fn open_loopback_capture(
        &self,
        endpoint: &AudioEndpoint,
    ) -> Result<Box<dyn CaptureStream>, DriverError>;

    /// Opens `endpoint` for rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be opened with `options`.
    fn open_output(
        &self,
        endpoint: &AudioEndpoint,
        options: &OutputOptions,
    ) -> Result<Box<dyn OutputDevice>, DriverError>;

    /// Reads the mute flag of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` where the platform has no endpoint mute.
    fn is_muted(&self, endpoint: &AudioEndpoint) -> Result<bool, DriverError>;

    /// Sets the mute flag of `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` where the platform has no endpoint mute.
    fn set_muted(&self, endpoint: &AudioEndpoint, muted: bool) -> Result<(), DriverError>;
}

/// Lists the output endpoints a driver can open.
pub trait DeviceEnumerator {
    /// Returns every active output endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio subsystem cannot be queried.
    fn output_endpoints(&self) -> Result<Vec<AudioEndpoint>, DriverError>;

    /// Returns the system default output endpoint, if one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio subsystem cannot be queried.
    fn default_output_endpoint(&self) -> Result<Option<AudioEndpoint>, DriverError>;
}
