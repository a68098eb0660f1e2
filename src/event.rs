//! Runtime events for monitoring a session.
//!
//! Events are non-fatal notifications. They are emitted from the control
//! thread (lifecycle changes) and from the driver's error callback, never
//! from the per-block render path.

use std::sync::Arc;

use crate::device::DeviceSpec;

/// Notifications emitted by an [`AudioSession`](crate::AudioSession).
///
/// # Example
///
/// ```
/// use speech_jammer::JammerEvent;
///
/// fn handle_event(event: JammerEvent) {
///     match event {
///         JammerEvent::Started { spec } => {
///             eprintln!("Started at {}Hz", spec.sample_rate);
///         }
///         JammerEvent::Stopped => eprintln!("Stopped"),
///         JammerEvent::Reconfigured { delay_seconds, gain, .. } => {
///             eprintln!("Delay {:.0}ms, gain {:.2}", delay_seconds * 1000.0, gain);
///         }
///         JammerEvent::ChannelMismatch { input_channels, output_channels } => {
///             eprintln!("Folding {input_channels}ch into {output_channels}ch");
///         }
///         JammerEvent::StreamError { reason } => eprintln!("Stream error: {reason}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum JammerEvent {
    /// A stream opened and is running.
    Started {
        /// The negotiated device spec.
        spec: DeviceSpec,
    },

    /// The running stream was halted.
    Stopped,

    /// Delay parameters changed.
    Reconfigured {
        /// New delay interval in seconds.
        delay_seconds: f32,
        /// New feedback gain.
        gain: f32,
        /// Whether the delayed signal is phase-inverted.
        invert_phase: bool,
    },

    /// Capture and playback channel counts differ and are being folded.
    ChannelMismatch {
        /// Channels captured.
        input_channels: u16,
        /// Channels played back.
        output_channels: u16,
    },

    /// The driver reported an error. The stream keeps running.
    StreamError {
        /// Description from the driver.
        reason: String,
    },
}

/// Callback type for receiving [`JammerEvent`]s.
pub type EventCallback = Arc<dyn Fn(JammerEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use speech_jammer::{event_callback, JammerEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(JammerEvent::Stopped);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(JammerEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
