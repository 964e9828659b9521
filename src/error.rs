//! Error types for stereo-split.
//!
//! Errors are split into two layers:
//! - **Pipe errors** ([`PipeError`]): returned from building or driving a
//!   [`CapturePipe`](crate::CapturePipe)
//! - **Driver errors** ([`DriverError`]): raised by an [`AudioDriver`](crate::driver::AudioDriver)
//!   implementation and wrapped into a pipe error together with the device involved

use crate::endpoint::AudioEndpoint;

/// Errors returned when building or operating a pipe.
///
/// Configuration problems are always reported before any hardware resource
/// is touched. Initialization failures are reported after every resource
/// acquired so far has been released again.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// The requested topology or settings cannot work.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Acquiring or initializing a device failed at the driver level.
    #[error("failed to initialize {}: {source}", device_label(.device.as_ref()))]
    DeviceInitialization {
        /// The device that failed, when the driver call can be attributed.
        device: Option<AudioEndpoint>,
        /// The underlying driver error.
        #[source]
        source: DriverError,
    },

    /// A device call failed while the pipe was running.
    #[error("device '{device}' failed: {source}")]
    Driver {
        /// The device the failing call was made on.
        device: AudioEndpoint,
        /// The underlying driver error.
        #[source]
        source: DriverError,
    },

    /// No endpoint matched a device query.
    #[error("no output device matches '{query}'")]
    DeviceNotFound {
        /// The name fragment or index that was looked up.
        query: String,
    },

    /// More than one endpoint matched a device query.
    #[error("'{query}' matches several output devices: {}", .matches.join(", "))]
    AmbiguousDevice {
        /// The name fragment that was looked up.
        query: String,
        /// Friendly names of every matching endpoint.
        matches: Vec<String>,
    },

    /// A fan-out worker thread could not be spawned.
    #[error("failed to spawn fan-out worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

fn device_label(device: Option<&AudioEndpoint>) -> String {
    device.map_or_else(|| "output devices".to_string(), |d| format!("'{d}'"))
}

impl PipeError {
    /// Creates an invalid configuration error with the given reason.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Wraps a driver error raised while initializing `device`.
    pub fn device_initialization(device: &AudioEndpoint, source: DriverError) -> Self {
        Self::DeviceInitialization {
            device: Some(device.clone()),
            source,
        }
    }

    /// Wraps a driver error raised by a running `device`.
    pub fn driver(device: &AudioEndpoint, source: DriverError) -> Self {
        Self::Driver {
            device: device.clone(),
            source,
        }
    }

    /// Returns the native error code carried by the underlying driver error, if any.
    #[must_use]
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Self::DeviceInitialization { source, .. } | Self::Driver { source, .. } => {
                source.code()
            }
            _ => None,
        }
    }

    /// Returns the endpoint this error is attributed to, if any.
    #[must_use]
    pub fn device(&self) -> Option<&AudioEndpoint> {
        match self {
            Self::DeviceInitialization { device, .. } => device.as_ref(),
            Self::Driver { device, .. } => Some(device),
            _ => None,
        }
    }
}

/// Errors raised by an audio driver implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The OS audio subsystem returned a native error code.
    #[error("native error {code:#010x}: {message}")]
    Native {
        /// The native error code (an `HRESULT` on Windows).
        code: i32,
        /// Description of what went wrong.
        message: String,
    },

    /// An error from the audio backend that carries no native code.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// The driver cannot perform this operation on this platform.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// The device was used before it was initialized with a source.
    #[error("device not initialized")]
    NotInitialized,
}

impl DriverError {
    /// Creates a native error with the given code and message.
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        Self::Native {
            code,
            message: message.into(),
        }
    }

    /// Creates a backend error with the given description.
    pub fn backend(message: impl ToString) -> Self {
        Self::Backend(message.to_string())
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Returns the native error code, if the driver reported one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the operation is not available on this platform.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_display() {
        let err = PipeError::invalid_configuration("latency 1ms is below the 2ms minimum");
        assert_eq!(
            err.to_string(),
            "invalid configuration: latency 1ms is below the 2ms minimum"
        );
    }

    #[test]
    fn test_device_initialization_names_device() {
        let device = AudioEndpoint::new("{0.0.0}.{abc}", "Speakers");
        let err = PipeError::device_initialization(
            &device,
            DriverError::native(0x8889_0004_u32 as i32, "device invalidated"),
        );
        assert!(err.to_string().contains("'Speakers'"));
        assert_eq!(err.native_code(), Some(0x8889_0004_u32 as i32));
        assert_eq!(err.device(), Some(&device));
    }

    #[test]
    fn test_device_initialization_unattributed() {
        let err = PipeError::DeviceInitialization {
            device: None,
            source: DriverError::backend("boom"),
        };
        assert!(err.to_string().starts_with("failed to initialize output devices"));
        assert_eq!(err.native_code(), None);
        assert!(err.device().is_none());
    }

    #[test]
    fn test_ambiguous_device_lists_matches() {
        let err = PipeError::AmbiguousDevice {
            query: "usb".to_string(),
            matches: vec!["USB Left".to_string(), "USB Right".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'usb' matches several output devices: USB Left, USB Right"
        );
    }

    #[test]
    fn test_driver_error_code() {
        assert_eq!(DriverError::native(-5, "x").code(), Some(-5));
        assert_eq!(DriverError::backend("x").code(), None);
        assert!(DriverError::unsupported("mute").is_unsupported());
        assert!(!DriverError::NotInitialized.is_unsupported());
    }

    #[test]
    fn test_native_display_is_hex() {
        let err = DriverError::native(0x10, "bad format");
        assert_eq!(err.to_string(), "native error 0x00000010: bad format");
    }
}
