//! Configuration for a capture pipe.

use std::time::Duration;

use crate::PipeError;

/// Default pipe latency in milliseconds.
pub const DEFAULT_LATENCY_MS: u32 = 10;

/// Minimum pipe latency in milliseconds.
pub const MIN_LATENCY_MS: u32 = 2;

/// Default capacity of each channel buffer.
pub const DEFAULT_BUFFER_DURATION: Duration = Duration::from_secs(5);

/// Configuration for pipe behavior.
///
/// Use [`PipeConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use stereo_split::PipeConfig;
///
/// let config = PipeConfig {
///     latency_ms: 20,
///     mute_input_when_piped: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConfig {
    /// Output latency in milliseconds.
    ///
    /// Passed to each output device as its buffering delay.
    /// Default: 10ms, minimum 2ms.
    pub latency_ms: u32,

    /// Capacity of each per-output channel buffer.
    ///
    /// Captured audio that arrives while a buffer is full is dropped and a
    /// [`PipeEvent::BufferOverflow`] is emitted.
    /// Default: 5 seconds
    ///
    /// [`PipeEvent::BufferOverflow`]: crate::PipeEvent::BufferOverflow
    pub buffer_duration: Duration,

    /// Whether the capture source is muted while the pipe is playing.
    ///
    /// Default: false
    pub mute_input_when_piped: bool,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            latency_ms: DEFAULT_LATENCY_MS,
            buffer_duration: DEFAULT_BUFFER_DURATION,
            mute_input_when_piped: false,
        }
    }
}

impl PipeConfig {
    /// Returns the latency as a duration.
    #[must_use]
    pub fn latency(&self) -> Duration {
        Duration::from_millis(u64::from(self.latency_ms))
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the latency is below
    /// [`MIN_LATENCY_MS`] or the buffer duration is zero.
    pub fn validate(&self) -> Result<(), PipeError> {
        if self.latency_ms < MIN_LATENCY_MS {
            return Err(PipeError::invalid_configuration(format!(
                "latency {}ms is too low (minimum {MIN_LATENCY_MS}ms)",
                self.latency_ms
            )));
        }
        if self.buffer_duration.is_zero() {
            return Err(PipeError::invalid_configuration(
                "channel buffer duration must be greater than zero",
            ));
        }
        Ok(())
    }
}
