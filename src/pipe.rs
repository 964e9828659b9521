//! The capture pipe and its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::driver::{AudioDriver, CaptureStream, OutputDevice};
use crate::endpoint::AudioEndpoint;
use crate::event::{emit, EventCallback, PipeEvent};
use crate::format::AudioFormat;
use crate::pair::ChannelPair;
use crate::pipeline::{BufferStats, CaptureCounters, ChannelStats};
use crate::{PipeBuilder, PipeError};

/// Whether the pipe is moving audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Capture and outputs are halted.
    #[default]
    Stopped,
    /// Capture is running and both outputs are playing.
    Playing,
}

/// Counters of a pipe since it was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    /// Captured blocks handed to both channel buffers.
    pub blocks_captured: u64,
    /// Captured bytes handed to both channel buffers.
    pub bytes_captured: u64,
    /// Per-output buffer counters, right then left.
    pub channels: ChannelPair<ChannelStats>,
}

/// Everything a built pipe owns, handed over by [`PipeBuilder`].
pub(crate) struct PipeParts {
    pub input: AudioEndpoint,
    pub outputs: ChannelPair<AudioEndpoint>,
    pub driver: Arc<dyn AudioDriver>,
    pub format: AudioFormat,
    pub latency: Duration,
    pub capture: Box<dyn CaptureStream>,
    pub devices: ChannelPair<Box<dyn OutputDevice>>,
    pub counters: Arc<CaptureCounters>,
    pub buffer_stats: ChannelPair<Arc<BufferStats>>,
    pub event_callback: Option<EventCallback>,
    pub mute_input_when_piped: bool,
}

struct PipeInner {
    capture: Option<Box<dyn CaptureStream>>,
    devices: Option<ChannelPair<Box<dyn OutputDevice>>>,
    state: PlaybackState,
    disposed: bool,
    previously_muted: Option<bool>,
    mute_input_when_piped: bool,
}

impl PipeInner {
    fn is_playing(&self) -> bool {
        !self.disposed && self.state == PlaybackState::Playing
    }
}

/// Loopback capture of one endpoint, split across two outputs.
///
/// The first output plays capture channel 0 (right), the second plays
/// capture channel 1 (left). Built with [`CapturePipe::builder`]; a pipe
/// that exists is fully wired and starts out [`Stopped`].
///
/// Lifecycle calls take `&self` and are serialized internally, so a pipe
/// can be shared between threads.
///
/// [`Stopped`]: PlaybackState::Stopped
pub struct CapturePipe {
    input: AudioEndpoint,
    outputs: ChannelPair<AudioEndpoint>,
    driver: Arc<dyn AudioDriver>,
    format: AudioFormat,
    latency: Duration,
    counters: Arc<CaptureCounters>,
    buffer_stats: ChannelPair<Arc<BufferStats>>,
    event_callback: Option<EventCallback>,
    inner: Mutex<PipeInner>,
}

impl CapturePipe {
    /// Starts building a pipe from `input` to exactly two `outputs`.
    ///
    /// The first output becomes the right speaker, the second the left.
    pub fn builder(
        input: AudioEndpoint,
        outputs: impl IntoIterator<Item = AudioEndpoint>,
    ) -> PipeBuilder {
        PipeBuilder::new(input, outputs)
    }

    pub(crate) fn from_parts(parts: PipeParts) -> Self {
        Self {
            input: parts.input,
            outputs: parts.outputs,
            driver: parts.driver,
            format: parts.format,
            latency: parts.latency,
            counters: parts.counters,
            buffer_stats: parts.buffer_stats,
            event_callback: parts.event_callback,
            inner: Mutex::new(PipeInner {
                capture: Some(parts.capture),
                devices: Some(parts.devices),
                state: PlaybackState::Stopped,
                disposed: false,
                previously_muted: None,
                mute_input_when_piped: parts.mute_input_when_piped,
            }),
        }
    }

    /// Returns the capture endpoint.
    pub fn input(&self) -> &AudioEndpoint {
        &self.input
    }

    /// Returns the output endpoints, right then left.
    pub fn outputs(&self) -> &ChannelPair<AudioEndpoint> {
        &self.outputs
    }

    /// Returns the capture format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Returns the output latency.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns the current playback state.
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Returns whether the capture endpoint is muted while playing.
    pub fn mute_input_when_piped(&self) -> bool {
        self.inner.lock().mute_input_when_piped
    }

    /// Returns a snapshot of the pipe's counters.
    pub fn stats(&self) -> PipeStats {
        PipeStats {
            blocks_captured: self.counters.blocks(),
            bytes_captured: self.counters.bytes(),
            channels: self.buffer_stats.as_ref().map(|_, stats| stats.snapshot()),
        }
    }

    /// Starts capture and both outputs.
    ///
    /// Does nothing if the pipe is already playing or has been closed.
    /// Snapshots the capture endpoint's mute flag and then sets it to the
    /// mute-while-piped setting.
    ///
    /// # Errors
    ///
    /// Returns `Driver` naming the device whose call failed. Whatever was
    /// started is stopped again and the pipe stays stopped.
    pub fn start(&self) -> Result<(), PipeError> {
        let mut guard = self.inner.lock();
        if guard.disposed || guard.state == PlaybackState::Playing {
            return Ok(());
        }

        let inner = &mut *guard;
        let (Some(capture), Some(devices)) = (inner.capture.as_mut(), inner.devices.as_mut())
        else {
            return Ok(());
        };

        capture
            .start()
            .map_err(|e| PipeError::driver(&self.input, e))?;

        if let Err(e) = self.play_outputs(devices) {
            stop_capture_quietly(capture.as_mut());
            return Err(e);
        }

        match self.mute_input(inner.mute_input_when_piped) {
            Ok(previous) => inner.previously_muted = previous,
            Err(e) => {
                if let Err(stop_err) = self.stop_outputs(devices) {
                    tracing::warn!(error = %stop_err, "failed to stop outputs after a failed start");
                }
                stop_capture_quietly(capture.as_mut());
                return Err(e);
            }
        }

        inner.state = PlaybackState::Playing;
        drop(guard);

        tracing::info!(
            input = %self.input,
            right = %self.outputs.right(),
            left = %self.outputs.left(),
            "pipe started"
        );
        emit(self.event_callback.as_ref(), PipeEvent::Started);
        Ok(())
    }

    /// Stops both outputs and capture, then restores the capture endpoint's
    /// mute flag.
    ///
    /// Does nothing if the pipe is stopped or has been closed.
    ///
    /// # Errors
    ///
    /// Returns the first device error. Every step is still attempted and the
    /// pipe ends up stopped.
    pub fn stop(&self) -> Result<(), PipeError> {
        let mut inner = self.inner.lock();
        if !inner.is_playing() {
            return Ok(());
        }
        let result = self.stop_locked(&mut inner);
        drop(inner);

        emit(self.event_callback.as_ref(), PipeEvent::Stopped);
        result
    }

    /// Changes whether the capture endpoint is muted while playing.
    ///
    /// Applied to the endpoint immediately when the pipe is playing;
    /// otherwise only stored for the next start.
    ///
    /// # Errors
    ///
    /// Returns `Driver` if the mute flag cannot be applied.
    pub fn set_mute_input_when_piped(&self, mute: bool) -> Result<(), PipeError> {
        let mut inner = self.inner.lock();
        inner.mute_input_when_piped = mute;
        if !inner.is_playing() {
            return Ok(());
        }

        tracing::debug!(input = %self.input, mute, "applying mute while piped");
        self.set_input_muted(mute)
    }

    /// Stops the pipe and releases every device.
    ///
    /// Safe to call more than once; later calls do nothing. After closing,
    /// [`start`](Self::start) and [`stop`](Self::stop) do nothing. Stop
    /// errors are logged, not returned.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }

        let was_playing = inner.is_playing();
        if was_playing {
            if let Err(e) = self.stop_locked(&mut inner) {
                tracing::warn!(error = %e, "error while stopping pipe during close");
            }
        }

        // Capture first so no block arrives for a released output
        drop(inner.capture.take());
        if let Some(devices) = inner.devices.take() {
            devices.par_map(|_, device| drop(device));
        }
        inner.disposed = true;
        drop(inner);

        tracing::debug!(input = %self.input, "pipe closed");
        if was_playing {
            emit(self.event_callback.as_ref(), PipeEvent::Stopped);
        }
    }

    fn stop_locked(&self, inner: &mut PipeInner) -> Result<(), PipeError> {
        let mut result = Ok(());

        if let Some(devices) = inner.devices.as_mut() {
            result = self.stop_outputs(devices);
        }
        if let Some(capture) = inner.capture.as_mut() {
            let stopped = capture
                .stop()
                .map_err(|e| PipeError::driver(&self.input, e));
            result = result.and(stopped);
        }
        if let Some(previous) = inner.previously_muted.take() {
            result = result.and(self.set_input_muted(previous));
        }

        inner.state = PlaybackState::Stopped;
        tracing::info!(input = %self.input, "pipe stopped");
        result
    }

    fn play_outputs(&self, devices: &mut ChannelPair<Box<dyn OutputDevice>>) -> Result<(), PipeError> {
        let results = devices
            .as_mut()
            .zip(self.outputs.as_ref())
            .par_map(|_, (device, endpoint)| {
                device
                    .play()
                    .map_err(|e| PipeError::driver(endpoint, e))
            });

        if results.iter().any(Result::is_err) {
            for (device, played) in devices.as_mut().zip(results.as_ref()) {
                if played.is_ok() {
                    if let Err(e) = device.stop() {
                        tracing::warn!(error = %e, "failed to stop output after a failed start");
                    }
                }
            }
        }

        results.transpose().map(|_| ())
    }

    fn stop_outputs(&self, devices: &mut ChannelPair<Box<dyn OutputDevice>>) -> Result<(), PipeError> {
        devices
            .as_mut()
            .zip(self.outputs.as_ref())
            .par_map(|_, (device, endpoint)| {
                device
                    .stop()
                    .map_err(|e| PipeError::driver(endpoint, e))
            })
            .transpose()
            .map(|_| ())
    }

    /// Snapshots the capture endpoint's mute flag, then sets it to `mute`.
    ///
    /// Returns the snapshot, or `None` when the platform has no endpoint mute.
    fn mute_input(&self, mute: bool) -> Result<Option<bool>, PipeError> {
        let previous = match self.driver.is_muted(&self.input) {
            Ok(previous) => previous,
            Err(e) if e.is_unsupported() => {
                tracing::warn!(input = %self.input, error = %e, "capture endpoint mute unavailable");
                return Ok(None);
            }
            Err(e) => return Err(PipeError::driver(&self.input, e)),
        };

        self.set_input_muted(mute)?;
        Ok(Some(previous))
    }

    fn set_input_muted(&self, muted: bool) -> Result<(), PipeError> {
        match self.driver.set_muted(&self.input, muted) {
            Ok(()) => Ok(()),
            Err(e) if e.is_unsupported() => {
                tracing::warn!(input = %self.input, error = %e, "capture endpoint mute unavailable");
                Ok(())
            }
            Err(e) => Err(PipeError::driver(&self.input, e)),
        }
    }
}

fn stop_capture_quietly(capture: &mut dyn CaptureStream) {
    if let Err(e) = capture.stop() {
        tracing::warn!(error = %e, "failed to stop capture after a failed start");
    }
}

impl Drop for CapturePipe {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CapturePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipe")
            .field("input", &self.input)
            .field("outputs", &self.outputs)
            .field("format", &self.format)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockDriver;

    fn endpoints() -> (AudioEndpoint, AudioEndpoint, AudioEndpoint) {
        (
            AudioEndpoint::named("D"),
            AudioEndpoint::named("A"),
            AudioEndpoint::named("B"),
        )
    }

    #[test]
    fn test_new_pipe_is_stopped() {
        let (input, a, b) = endpoints();
        let pipe = CapturePipe::builder(input, [a, b])
            .driver(MockDriver::new())
            .build()
            .unwrap();
        assert_eq!(pipe.state(), PlaybackState::Stopped);
        assert!(!pipe.is_disposed());
        assert_eq!(pipe.latency(), Duration::from_millis(10));
    }

    #[test]
    fn test_start_stop_emit_events() {
        use std::sync::Mutex as StdMutex;

        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let (input, a, b) = endpoints();
        let pipe = CapturePipe::builder(input, [a, b])
            .driver(MockDriver::new())
            .on_event(move |e| sink.lock().unwrap().push(e))
            .build()
            .unwrap();

        pipe.start().unwrap();
        pipe.start().unwrap();
        pipe.stop().unwrap();
        pipe.stop().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![PipeEvent::Started, PipeEvent::Stopped]
        );
    }

    #[test]
    fn test_mute_applied_while_playing_only() {
        let (input, a, b) = endpoints();
        let driver = MockDriver::new();
        let pipe = CapturePipe::builder(input.clone(), [a, b])
            .driver(driver.clone())
            .build()
            .unwrap();

        pipe.set_mute_input_when_piped(true).unwrap();
        assert!(!driver.mute_state(&input));

        pipe.start().unwrap();
        assert!(driver.mute_state(&input));

        pipe.set_mute_input_when_piped(false).unwrap();
        assert!(!driver.mute_state(&input));
        assert!(!pipe.mute_input_when_piped());
    }

    #[test]
    fn test_unsupported_mute_is_skipped() {
        let (input, a, b) = endpoints();
        let pipe = CapturePipe::builder(input, [a, b])
            .driver(MockDriver::new().without_mute_support())
            .mute_input_when_piped(true)
            .build()
            .unwrap();

        pipe.start().unwrap();
        assert_eq!(pipe.state(), PlaybackState::Playing);
        pipe.stop().unwrap();
    }

    #[test]
    fn test_close_stops_and_releases() {
        let (input, a, b) = endpoints();
        let driver = MockDriver::new();
        let pipe = CapturePipe::builder(input, [a.clone(), b.clone()])
            .driver(driver.clone())
            .build()
            .unwrap();

        pipe.start().unwrap();
        pipe.close();

        assert!(pipe.is_disposed());
        assert_eq!(pipe.state(), PlaybackState::Stopped);
        assert!(driver.capture_released());
        assert!(driver.output_released(&a));
        assert!(driver.output_released(&b));
    }

    #[test]
    fn test_drop_closes() {
        let (input, a, b) = endpoints();
        let driver = MockDriver::new();
        let pipe = CapturePipe::builder(input, [a.clone(), b])
            .driver(driver.clone())
            .build()
            .unwrap();
        pipe.start().unwrap();

        drop(pipe);
        assert!(!driver.is_capturing());
        assert!(driver.output_released(&a));
    }

    #[test]
    fn test_debug_names_endpoints() {
        let (input, a, b) = endpoints();
        let pipe = CapturePipe::builder(input, [a, b])
            .driver(MockDriver::new())
            .build()
            .unwrap();
        let debug = format!("{pipe:?}");
        assert!(debug.contains("CapturePipe"));
        assert!(debug.contains("latency"));
    }
}
