//! Builder for [`CapturePipe`].

use std::sync::Arc;
use std::time::Duration;

use crate::driver::{AudioDriver, CpalDriver, OutputOptions};
use crate::endpoint::AudioEndpoint;
use crate::pair::{ChannelPair, ChannelRole};
use crate::pipe::PipeParts;
use crate::pipeline::{channel_buffer, ChannelRouter, FanOut};
use crate::{event_callback, CapturePipe, EventCallback, PipeConfig, PipeError, PipeEvent};

/// Builder for configuring and wiring a [`CapturePipe`].
///
/// Use [`CapturePipe::builder()`] to create one. [`build`](Self::build)
/// either returns a fully wired pipe or an error; it never returns a
/// partially built pipe, and every device acquired before a failure has been
/// released by the time the error is returned.
///
/// # Example
///
/// ```no_run
/// use stereo_split::{AudioEndpoint, CapturePipe, PipeEvent};
///
/// let pipe = CapturePipe::builder(
///     AudioEndpoint::named("Speakers"),
///     [AudioEndpoint::named("Headphones"), AudioEndpoint::named("Monitor")],
/// )
/// .latency_ms(20)
/// .mute_input_when_piped(true)
/// .on_event(|event| {
///     if let PipeEvent::BufferOverflow { role, .. } = event {
///         eprintln!("{role} output falling behind");
///     }
/// })
/// .build()?;
///
/// pipe.start()?;
/// # Ok::<(), stereo_split::PipeError>(())
/// ```
#[must_use]
pub struct PipeBuilder {
    input: AudioEndpoint,
    outputs: Vec<AudioEndpoint>,
    driver: Option<Arc<dyn AudioDriver>>,
    config: PipeConfig,
    event_callback: Option<EventCallback>,
}

impl PipeBuilder {
    pub(crate) fn new(input: AudioEndpoint, outputs: impl IntoIterator<Item = AudioEndpoint>) -> Self {
        Self {
            input,
            outputs: outputs.into_iter().collect(),
            driver: None,
            config: PipeConfig::default(),
            event_callback: None,
        }
    }

    /// Sets the driver devices are opened through.
    ///
    /// Default: [`CpalDriver`] on the platform's default host.
    pub fn driver(mut self, driver: impl AudioDriver + 'static) -> Self {
        self.driver = Some(Arc::new(driver));
        self
    }

    /// Sets the output latency in milliseconds.
    ///
    /// Default: 10ms, minimum 2ms.
    pub fn latency_ms(mut self, latency_ms: u32) -> Self {
        self.config.latency_ms = latency_ms;
        self
    }

    /// Sets the capacity of each channel buffer.
    ///
    /// Default: 5 seconds
    pub fn buffer_duration(mut self, duration: Duration) -> Self {
        self.config.buffer_duration = duration;
        self
    }

    /// Sets whether the capture endpoint is muted while playing.
    ///
    /// Default: false
    pub fn mute_input_when_piped(mut self, mute: bool) -> Self {
        self.config.mute_input_when_piped = mute;
        self
    }

    /// Sets a callback to receive runtime events.
    ///
    /// Buffer events are raised on audio threads; keep the callback short.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(PipeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PipeConfig) -> Self {
        self.config = config;
        self
    }

    /// Checks the topology and settings without touching any device.
    fn validate(&self) -> Result<ChannelPair<AudioEndpoint>, PipeError> {
        let outputs = ChannelPair::try_from_iter(self.outputs.iter().cloned())?;

        for (role, output) in outputs.iter_roles() {
            if *output == self.input {
                return Err(PipeError::invalid_configuration(format!(
                    "capture source '{}' cannot also be the {role} output",
                    self.input
                )));
            }
        }

        self.config.validate()?;
        Ok(outputs)
    }

    /// Opens every device and wires the pipe.
    ///
    /// The returned pipe is stopped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if there are not exactly two outputs,
    /// the capture source is also an output, the latency is below the
    /// minimum, or the capture format has fewer than two channels. Returns
    /// `DeviceInitialization` naming the device whose driver call failed.
    pub fn build(self) -> Result<CapturePipe, PipeError> {
        let outputs = self.validate()?;
        let driver = self
            .driver
            .unwrap_or_else(|| Arc::new(CpalDriver::new()));
        let latency = self.config.latency();
        let input = self.input;

        let mut capture = driver
            .open_loopback_capture(&input)
            .map_err(|e| PipeError::device_initialization(&input, e))?;
        let format = capture.format();
        if format.channels < 2 {
            return Err(PipeError::invalid_configuration(format!(
                "'{input}' captures {} channel(s); a channel split needs at least 2",
                format.channels
            )));
        }
        tracing::debug!(%input, ?format, "loopback capture opened");

        let (writers, buffers) = ChannelPair::from(ChannelRole::ALL)
            .map(|_, role| {
                channel_buffer(
                    format,
                    self.config.buffer_duration,
                    role,
                    self.event_callback.clone(),
                )
            })
            .unzip();
        let buffer_stats = buffers.as_ref().map(|_, buffer| Arc::clone(buffer.stats()));
        let routers = buffers
            .map(|role, buffer| ChannelRouter::new(buffer, role))
            .transpose()?;

        let mut fan_out = FanOut::spawn(writers)?;
        let counters = fan_out.counters();
        capture
            .set_data_callback(Box::new(move |block: &[u8]| fan_out.deliver(block)))
            .map_err(|e| PipeError::device_initialization(&input, e))?;

        let options = OutputOptions::shared(latency);
        let devices = outputs
            .as_ref()
            .zip(routers)
            .par_map(|role, (endpoint, router)| {
                let mut device = driver
                    .open_output(endpoint, &options)
                    .map_err(|e| PipeError::device_initialization(endpoint, e))?;
                device
                    .init(router)
                    .map_err(|e| PipeError::device_initialization(endpoint, e))?;
                tracing::debug!(%role, %endpoint, ?latency, "output initialized");
                Ok::<_, PipeError>(device)
            })
            .transpose()?;

        tracing::info!(
            %input,
            right = %outputs.right(),
            left = %outputs.left(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "pipe built"
        );

        Ok(CapturePipe::from_parts(PipeParts {
            input,
            outputs,
            driver,
            format,
            latency,
            capture,
            devices,
            counters,
            buffer_stats,
            event_callback: self.event_callback,
            mute_input_when_piped: self.config.mute_input_when_piped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AudioFormat, MockDriver, SampleFormat};

    fn endpoint(name: &str) -> AudioEndpoint {
        AudioEndpoint::named(name)
    }

    #[test]
    fn test_output_count_must_be_two() {
        for outputs in [vec![], vec![endpoint("A")], vec![endpoint("A"), endpoint("B"), endpoint("C")]] {
            let result = CapturePipe::builder(endpoint("D"), outputs)
                .driver(MockDriver::new())
                .build();
            assert!(matches!(result, Err(PipeError::InvalidConfiguration { .. })));
        }
    }

    #[test]
    fn test_validation_touches_no_device() {
        let driver = MockDriver::new();
        let result = CapturePipe::builder(endpoint("D"), [endpoint("D"), endpoint("B")])
            .driver(driver.clone())
            .build();

        assert!(result.is_err());
        assert!(!driver.capture_is_open());
        assert!(!driver.capture_released());
    }

    #[test]
    fn test_identity_checked_before_latency() {
        let result = CapturePipe::builder(endpoint("D"), [endpoint("A"), endpoint("D")])
            .driver(MockDriver::new())
            .latency_ms(1)
            .build();

        match result {
            Err(PipeError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("'D'"), "{reason}");
                assert!(reason.contains("left"), "{reason}");
            }
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn test_latency_passed_to_outputs() {
        let driver = MockDriver::new();
        let (a, b) = (endpoint("A"), endpoint("B"));
        let _pipe = CapturePipe::builder(endpoint("D"), [a.clone(), b.clone()])
            .driver(driver.clone())
            .latency_ms(25)
            .build()
            .unwrap();

        assert_eq!(driver.output_latency(&a), Some(Duration::from_millis(25)));
        assert_eq!(driver.output_latency(&b), Some(Duration::from_millis(25)));
    }

    #[test]
    fn test_mono_capture_rejected_and_released() {
        let driver = MockDriver::new().with_format(AudioFormat::new(48000, 1, SampleFormat::F32));
        let result = CapturePipe::builder(endpoint("D"), [endpoint("A"), endpoint("B")])
            .driver(driver.clone())
            .build();

        assert!(matches!(result, Err(PipeError::InvalidConfiguration { .. })));
        assert!(driver.capture_released());
    }

    #[test]
    fn test_config_replaces_settings() {
        let config = PipeConfig {
            latency_ms: 40,
            mute_input_when_piped: true,
            ..Default::default()
        };
        let pipe = CapturePipe::builder(endpoint("D"), [endpoint("A"), endpoint("B")])
            .driver(MockDriver::new())
            .config(config)
            .build()
            .unwrap();

        assert_eq!(pipe.latency(), Duration::from_millis(40));
        assert!(pipe.mute_input_when_piped());
    }
}
