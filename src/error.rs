//! Error types for speech-jammer.
//!
//! Errors are split into two categories:
//! - **Fatal errors** returned from [`AudioSession::start()`]: the stream could
//!   not be opened and the session stays idle
//! - **Diagnostics**: conditions observed while streaming (channel folding,
//!   underruns) that are counted and reported, never thrown
//!
//! [`AudioSession::start()`]: crate::AudioSession::start

/// Errors produced by the audio engine and its device layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    /// The device could not be opened or started.
    ///
    /// Covers missing devices, devices held by another application, and
    /// unsupported channel/sample-rate/block-size combinations.
    #[error("device unavailable: {device} - {reason}")]
    DeviceUnavailable {
        /// Human-readable device name or selection.
        device: String,
        /// Reason reported by the backend.
        reason: String,
    },

    /// Source and target channel counts differ.
    ///
    /// The channel adapter always resolves this, so it is only ever logged
    /// and surfaced as an event.
    #[error("channel mismatch: {source_channels}ch input folded into {target_channels}ch output")]
    ChannelMismatch {
        /// Channels delivered by the capture device.
        source_channels: u16,
        /// Channels expected by the playback device.
        target_channels: u16,
    },

    /// The playback callback ran out of captured audio.
    #[error("buffer underrun: {count} blocks zero-filled")]
    BufferUnderrun {
        /// Number of underrun blocks since the stream started.
        count: u64,
    },

    /// The audio host itself failed (device enumeration, host lookup).
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl AudioError {
    /// Creates a `DeviceUnavailable` error.
    pub fn device_unavailable(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            reason: reason.to_string(),
        }
    }
}
