//! Runtime events for monitoring a running pipe.
//!
//! Events are non-fatal notifications. The pipe keeps running after any of
//! them; they exist for logging and metrics, not error handling. Buffer
//! events are emitted from audio threads, so callbacks must be quick.

use std::sync::Arc;

use crate::pair::ChannelRole;

/// Runtime events emitted by a [`CapturePipe`](crate::CapturePipe).
///
/// # Example
///
/// ```
/// use stereo_split::PipeEvent;
///
/// fn handle_event(event: PipeEvent) {
///     match event {
///         PipeEvent::Started => eprintln!("piping"),
///         PipeEvent::Stopped => eprintln!("stopped"),
///         PipeEvent::BufferOverflow { role, dropped_bytes } => {
///             eprintln!("{role} buffer full, dropped {dropped_bytes} bytes");
///         }
///         PipeEvent::BufferUnderrun { role } => {
///             eprintln!("{role} output starved, padding with silence");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeEvent {
    /// Capture and both outputs are running.
    Started,

    /// Capture and both outputs were halted.
    Stopped,

    /// A channel buffer was full and captured audio was dropped.
    ///
    /// The output for this role is not consuming as fast as the capture
    /// produces. Consider a larger `buffer_duration`.
    BufferOverflow {
        /// Output whose buffer overflowed.
        role: ChannelRole,
        /// Bytes of the captured block that did not fit.
        dropped_bytes: usize,
    },

    /// An output asked for more audio than its buffer held.
    ///
    /// Emitted once when the output becomes starved; the missing audio is
    /// rendered as silence until captured data arrives again.
    BufferUnderrun {
        /// Output that ran dry.
        role: ChannelRole,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`PipeBuilder::on_event()`](crate::PipeBuilder::on_event).
pub type EventCallback = Arc<dyn Fn(PipeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stereo_split::{event_callback, PipeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(PipeEvent::Started);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(PipeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Emits `event` if a callback is registered.
pub(crate) fn emit(callback: Option<&EventCallback>, event: PipeEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}
