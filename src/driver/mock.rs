//! In-memory driver for testing without hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    AudioDriver, CaptureStream, DataCallback, DeviceEnumerator, OutputDevice, OutputOptions,
};
use crate::endpoint::AudioEndpoint;
use crate::format::{AudioFormat, SampleFormat};
use crate::pipeline::ChannelRouter;
use crate::DriverError;

/// A driver that keeps every device in memory.
///
/// Tests push captured blocks with [`deliver`](Self::deliver) and pull what
/// an output would play with [`render`](Self::render). Failures can be
/// injected per device and every device call can be inspected afterwards.
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use stereo_split::{AudioEndpoint, CapturePipe, MockDriver};
///
/// let input = AudioEndpoint::named("Speakers");
/// let right = AudioEndpoint::named("Headphones");
/// let left = AudioEndpoint::named("Monitor");
///
/// let driver = MockDriver::new();
/// let pipe = CapturePipe::builder(input, [right.clone(), left.clone()])
///     .driver(driver.clone())
///     .build()
///     .unwrap();
///
/// pipe.start().unwrap();
/// assert!(driver.output_playing(&right));
/// assert!(driver.output_playing(&left));
/// ```
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    format: AudioFormat,
    endpoints: Vec<AudioEndpoint>,
    default_output: Option<AudioEndpoint>,
    mute_supported: bool,
    mute_error: Option<DriverError>,
    muted: HashMap<AudioEndpoint, bool>,
    capture_open_error: Option<DriverError>,
    output_open_errors: HashMap<AudioEndpoint, DriverError>,
    output_init_errors: HashMap<AudioEndpoint, DriverError>,
    output_play_errors: HashMap<AudioEndpoint, DriverError>,
    capture: Option<CaptureSlot>,
    outputs: HashMap<AudioEndpoint, OutputSlot>,
}

impl MockState {
    fn check_mute(&self) -> Result<(), DriverError> {
        if !self.mute_supported {
            return Err(DriverError::unsupported("endpoint mute"));
        }
        match &self.mute_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct CaptureSlot {
    callback: Option<DataCallback>,
    capturing: bool,
    released: bool,
}

struct OutputSlot {
    router: Option<ChannelRouter>,
    latency: Duration,
    playing: bool,
    play_calls: usize,
    released: bool,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Creates a driver capturing 48kHz stereo 16-bit audio.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                format: AudioFormat::new(48000, 2, SampleFormat::I16),
                endpoints: Vec::new(),
                default_output: None,
                mute_supported: true,
                mute_error: None,
                muted: HashMap::new(),
                capture_open_error: None,
                output_open_errors: HashMap::new(),
                output_init_errors: HashMap::new(),
                output_play_errors: HashMap::new(),
                capture: None,
                outputs: HashMap::new(),
            })),
        }
    }

    /// Sets the format loopback captures report.
    #[must_use]
    pub fn with_format(self, format: AudioFormat) -> Self {
        self.state.lock().format = format;
        self
    }

    /// Sets the endpoints returned by [`DeviceEnumerator::output_endpoints`].
    #[must_use]
    pub fn with_endpoints(self, endpoints: impl IntoIterator<Item = AudioEndpoint>) -> Self {
        self.state.lock().endpoints = endpoints.into_iter().collect();
        self
    }

    /// Sets the system default output endpoint.
    #[must_use]
    pub fn with_default_output(self, endpoint: AudioEndpoint) -> Self {
        self.state.lock().default_output = Some(endpoint);
        self
    }

    /// Sets the initial mute flag of `endpoint`.
    #[must_use]
    pub fn with_muted(self, endpoint: &AudioEndpoint, muted: bool) -> Self {
        self.state.lock().muted.insert(endpoint.clone(), muted);
        self
    }

    /// Makes every mute call fail with `Unsupported`.
    #[must_use]
    pub fn without_mute_support(self) -> Self {
        self.state.lock().mute_supported = false;
        self
    }

    /// Makes every mute call fail with a native `code`.
    pub fn fail_mute(&self, code: i32) {
        self.state.lock().mute_error = Some(DriverError::native(code, "endpoint volume unavailable"));
    }

    /// Makes the next loopback capture open fail with a native `code`.
    pub fn fail_capture_open(&self, code: i32) {
        self.state.lock().capture_open_error =
            Some(DriverError::native(code, "capture endpoint unavailable"));
    }

    /// Makes opening `endpoint` for output fail with a native `code`.
    pub fn fail_output_open(&self, endpoint: &AudioEndpoint, code: i32) {
        self.state.lock().output_open_errors.insert(
            endpoint.clone(),
            DriverError::native(code, "output endpoint unavailable"),
        );
    }

    /// Makes initializing `endpoint` with a router fail with a native `code`.
    pub fn fail_output_init(&self, endpoint: &AudioEndpoint, code: i32) {
        self.state.lock().output_init_errors.insert(
            endpoint.clone(),
            DriverError::native(code, "unsupported output format"),
        );
    }

    /// Makes starting playback on `endpoint` fail with a native `code`.
    pub fn fail_output_play(&self, endpoint: &AudioEndpoint, code: i32) {
        self.state
            .lock()
            .output_play_errors
            .insert(endpoint.clone(), DriverError::native(code, "device invalidated"));
    }

    /// Clears a playback failure injected with [`fail_output_play`](Self::fail_output_play).
    pub fn clear_output_play_failure(&self, endpoint: &AudioEndpoint) {
        self.state.lock().output_play_errors.remove(endpoint);
    }

    /// Hands a captured block to the registered data callback.
    ///
    /// Returns false, delivering nothing, unless the capture is running.
    pub fn deliver(&self, block: &[u8]) -> bool {
        let mut state = self.state.lock();
        let Some(capture) = state.capture.as_mut() else {
            return false;
        };
        if !capture.capturing {
            return false;
        }
        match capture.callback.as_mut() {
            Some(callback) => {
                callback(block);
                true
            }
            None => false,
        }
    }

    /// Pulls `frames` frames from the router feeding `endpoint`.
    ///
    /// Returns what the device would play, or `None` unless it is playing.
    pub fn render(&self, endpoint: &AudioEndpoint, frames: usize) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let slot = state.outputs.get_mut(endpoint)?;
        if !slot.playing {
            return None;
        }
        let router = slot.router.as_mut()?;
        let mut out = vec![0u8; frames * router.format().block_align()];
        router.read(&mut out);
        Some(out)
    }

    /// Returns the current mute flag of `endpoint`.
    pub fn mute_state(&self, endpoint: &AudioEndpoint) -> bool {
        self.state
            .lock()
            .muted
            .get(endpoint)
            .copied()
            .unwrap_or(false)
    }

    /// Returns true while a capture stream is running.
    pub fn is_capturing(&self) -> bool {
        self.state
            .lock()
            .capture
            .as_ref()
            .is_some_and(|c| c.capturing)
    }

    /// Returns true if a capture stream was opened and has been released.
    pub fn capture_released(&self) -> bool {
        self.state
            .lock()
            .capture
            .as_ref()
            .is_some_and(|c| c.released)
    }

    /// Returns true while a capture stream is open and not yet released.
    pub fn capture_is_open(&self) -> bool {
        self.state
            .lock()
            .capture
            .as_ref()
            .is_some_and(|c| !c.released)
    }

    /// Returns true while `endpoint` is playing.
    pub fn output_playing(&self, endpoint: &AudioEndpoint) -> bool {
        self.with_output(endpoint, |slot| slot.playing)
            .unwrap_or(false)
    }

    /// Returns how many times playback was started on `endpoint`.
    pub fn play_calls(&self, endpoint: &AudioEndpoint) -> usize {
        self.with_output(endpoint, |slot| slot.play_calls)
            .unwrap_or(0)
    }

    /// Returns true if `endpoint` was opened and has been released.
    pub fn output_released(&self, endpoint: &AudioEndpoint) -> bool {
        self.with_output(endpoint, |slot| slot.released)
            .unwrap_or(false)
    }

    /// Returns true while `endpoint` is open and not yet released.
    pub fn output_is_open(&self, endpoint: &AudioEndpoint) -> bool {
        self.with_output(endpoint, |slot| !slot.released)
            .unwrap_or(false)
    }

    /// Returns the latency `endpoint` was opened with.
    pub fn output_latency(&self, endpoint: &AudioEndpoint) -> Option<Duration> {
        self.with_output(endpoint, |slot| slot.latency)
    }

    fn with_output<T>(&self, endpoint: &AudioEndpoint, f: impl FnOnce(&OutputSlot) -> T) -> Option<T> {
        self.state.lock().outputs.get(endpoint).map(f)
    }
}

struct MockCapture {
    state: Arc<Mutex<MockState>>,
    format: AudioFormat,
}

impl CaptureStream for MockCapture {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn set_data_callback(&mut self, callback: DataCallback) -> Result<(), DriverError> {
        let previous = self
            .state
            .lock()
            .capture
            .as_mut()
            .and_then(|c| c.callback.replace(callback));
        drop(previous);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let capture = state.capture.as_mut().ok_or(DriverError::NotInitialized)?;
        if capture.callback.is_none() {
            return Err(DriverError::NotInitialized);
        }
        capture.capturing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(capture) = self.state.lock().capture.as_mut() {
            capture.capturing = false;
        }
        Ok(())
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        let callback = self.state.lock().capture.as_mut().and_then(|c| {
            c.capturing = false;
            c.released = true;
            c.callback.take()
        });
        // The callback owns the fan-out; drop it outside the lock
        drop(callback);
    }
}

struct MockOutput {
    state: Arc<Mutex<MockState>>,
    endpoint: AudioEndpoint,
}

impl MockOutput {
    fn with_slot<T>(
        &self,
        f: impl FnOnce(&mut OutputSlot, Option<&DriverError>) -> T,
        errors: fn(&MockState) -> &HashMap<AudioEndpoint, DriverError>,
    ) -> Option<T> {
        let mut state = self.state.lock();
        let error = errors(&state).get(&self.endpoint).cloned();
        state
            .outputs
            .get_mut(&self.endpoint)
            .map(|slot| f(slot, error.as_ref()))
    }
}

impl OutputDevice for MockOutput {
    fn init(&mut self, source: ChannelRouter) -> Result<(), DriverError> {
        self.with_slot(
            |slot, error| match error {
                Some(e) => Err(e.clone()),
                None => {
                    slot.router = Some(source);
                    Ok(())
                }
            },
            |state| &state.output_init_errors,
        )
        .unwrap_or(Err(DriverError::NotInitialized))
    }

    fn play(&mut self) -> Result<(), DriverError> {
        self.with_slot(
            |slot, error| {
                if slot.router.is_none() {
                    return Err(DriverError::NotInitialized);
                }
                if let Some(e) = error {
                    return Err(e.clone());
                }
                slot.play_calls += 1;
                slot.playing = true;
                Ok(())
            },
            |state| &state.output_play_errors,
        )
        .unwrap_or(Err(DriverError::NotInitialized))
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(slot) = self.state.lock().outputs.get_mut(&self.endpoint) {
            slot.playing = false;
        }
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        let router = self
            .state
            .lock()
            .outputs
            .get_mut(&self.endpoint)
            .and_then(|slot| {
                slot.playing = false;
                slot.released = true;
                slot.router.take()
            });
        drop(router);
    }
}

impl AudioDriver for MockDriver {
    fn open_loopback_capture(
        &self,
        _endpoint: &AudioEndpoint,
    ) -> Result<Box<dyn CaptureStream>, DriverError> {
        let mut state = self.state.lock();
        if let Some(error) = state.capture_open_error.take() {
            return Err(error);
        }
        state.capture = Some(CaptureSlot::default());

        Ok(Box::new(MockCapture {
            state: Arc::clone(&self.state),
            format: state.format,
        }))
    }

    fn open_output(
        &self,
        endpoint: &AudioEndpoint,
        options: &OutputOptions,
    ) -> Result<Box<dyn OutputDevice>, DriverError> {
        let mut state = self.state.lock();
        if let Some(error) = state.output_open_errors.get(endpoint) {
            return Err(error.clone());
        }
        state.outputs.insert(
            endpoint.clone(),
            OutputSlot {
                router: None,
                latency: options.latency,
                playing: false,
                play_calls: 0,
                released: false,
            },
        );

        Ok(Box::new(MockOutput {
            state: Arc::clone(&self.state),
            endpoint: endpoint.clone(),
        }))
    }

    fn is_muted(&self, endpoint: &AudioEndpoint) -> Result<bool, DriverError> {
        let state = self.state.lock();
        state.check_mute()?;
        Ok(state.muted.get(endpoint).copied().unwrap_or(false))
    }

    fn set_muted(&self, endpoint: &AudioEndpoint, muted: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.check_mute()?;
        state.muted.insert(endpoint.clone(), muted);
        Ok(())
    }
}

impl DeviceEnumerator for MockDriver {
    fn output_endpoints(&self) -> Result<Vec<AudioEndpoint>, DriverError> {
        Ok(self.state.lock().endpoints.clone())
    }

    fn default_output_endpoint(&self) -> Result<Option<AudioEndpoint>, DriverError> {
        Ok(self.state.lock().default_output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::ChannelRole;
    use crate::pipeline::channel_buffer;

    fn endpoint(name: &str) -> AudioEndpoint {
        AudioEndpoint::named(name)
    }

    fn router(format: AudioFormat) -> ChannelRouter {
        let (_, buffer) = channel_buffer(format, Duration::from_secs(1), ChannelRole::Right, None);
        ChannelRouter::new(buffer, ChannelRole::Right).unwrap()
    }

    #[test]
    fn test_capture_needs_callback_before_start() {
        let driver = MockDriver::new();
        let mut capture = driver.open_loopback_capture(&endpoint("in")).unwrap();
        assert_eq!(capture.start(), Err(DriverError::NotInitialized));

        capture.set_data_callback(Box::new(|_: &[u8]| {})).unwrap();
        capture.start().unwrap();
        assert!(driver.is_capturing());
    }

    #[test]
    fn test_deliver_only_while_capturing() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let driver = MockDriver::new();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let mut capture = driver.open_loopback_capture(&endpoint("in")).unwrap();
        capture
            .set_data_callback(Box::new(move |block: &[u8]| {
                counter.fetch_add(block.len(), Ordering::SeqCst);
            }))
            .unwrap();

        assert!(!driver.deliver(&[0u8; 8]));
        capture.start().unwrap();
        assert!(driver.deliver(&[0u8; 8]));
        capture.stop().unwrap();
        assert!(!driver.deliver(&[0u8; 8]));

        assert_eq!(received.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_drop_marks_capture_released() {
        let driver = MockDriver::new();
        let capture = driver.open_loopback_capture(&endpoint("in")).unwrap();
        assert!(driver.capture_is_open());
        drop(capture);
        assert!(driver.capture_released());
        assert!(!driver.capture_is_open());
    }

    #[test]
    fn test_output_lifecycle() {
        let driver = MockDriver::new();
        let out = endpoint("out");
        let options = OutputOptions::shared(Duration::from_millis(20));

        let mut device = driver.open_output(&out, &options).unwrap();
        assert_eq!(driver.output_latency(&out), Some(Duration::from_millis(20)));
        assert_eq!(device.play(), Err(DriverError::NotInitialized));

        device
            .init(router(AudioFormat::new(48000, 2, SampleFormat::I16)))
            .unwrap();
        device.play().unwrap();
        assert!(driver.output_playing(&out));
        assert_eq!(driver.play_calls(&out), 1);

        // Nothing captured yet: silence
        assert_eq!(driver.render(&out, 4), Some(vec![0u8; 8]));

        device.stop().unwrap();
        assert!(!driver.output_playing(&out));
        assert_eq!(driver.render(&out, 4), None);

        drop(device);
        assert!(driver.output_released(&out));
    }

    #[test]
    fn test_injected_failures_carry_codes() {
        let driver = MockDriver::new();
        let out = endpoint("out");
        driver.fail_capture_open(-5);
        driver.fail_output_open(&out, 7);

        let capture = driver.open_loopback_capture(&endpoint("in"));
        assert_eq!(capture.err().and_then(|e| e.code()), Some(-5));

        let options = OutputOptions::shared(Duration::from_millis(10));
        let output = driver.open_output(&out, &options);
        assert_eq!(output.err().and_then(|e| e.code()), Some(7));

        // Capture failure is one-shot
        assert!(driver.open_loopback_capture(&endpoint("in")).is_ok());
    }

    #[test]
    fn test_mute_state() {
        let speakers = endpoint("speakers");
        let driver = MockDriver::new().with_muted(&speakers, true);
        assert!(driver.is_muted(&speakers).unwrap());

        driver.set_muted(&speakers, false).unwrap();
        assert!(!driver.mute_state(&speakers));

        let unsupported = MockDriver::new().without_mute_support();
        assert!(unsupported.is_muted(&speakers).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_enumeration() {
        let a = endpoint("a");
        let b = endpoint("b");
        let driver = MockDriver::new()
            .with_endpoints([a.clone(), b.clone()])
            .with_default_output(b.clone());

        assert_eq!(driver.output_endpoints().unwrap(), vec![a, b.clone()]);
        assert_eq!(driver.default_output_endpoint().unwrap(), Some(b));
    }
}
