//! Builder pattern for `SpeechJammer`.

use crate::device::{AudioBackend, CpalBackend, DeviceSelection};
use crate::session::AudioSession;
use crate::{event_callback, DelayConfig, EventCallback, JammerConfig, JammerEvent};

/// Builder for configuring a speech jammer session.
///
/// Use [`SpeechJammer::builder()`] to create a new builder. Building does not
/// touch any device; streaming begins with [`AudioSession::start()`].
///
/// # Example
///
/// ```ignore
/// use speech_jammer::{DelayConfig, DeviceSelection, SpeechJammer};
///
/// let mut session = SpeechJammer::builder()
///     .output_device(DeviceSelection::Index(3))
///     .delay(DelayConfig::new(0.2, 0.8).with_invert_phase(true))
///     .block_size(256)
///     .on_event(|e| tracing::info!(?e, "jammer event"))
///     .build();
///
/// session.start()?;
/// ```
///
/// [`SpeechJammer::builder()`]: crate::SpeechJammer::builder
#[must_use]
pub struct SpeechJammerBuilder {
    /// Audio backend. `None` means the CPAL default host.
    backend: Option<Box<dyn AudioBackend>>,
    /// Capture device.
    input_device: DeviceSelection,
    /// Playback device.
    output_device: DeviceSelection,
    /// Event callback.
    event_callback: Option<EventCallback>,
    /// Stream configuration.
    config: JammerConfig,
}

impl Default for SpeechJammerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechJammerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            input_device: DeviceSelection::SystemDefault,
            output_device: DeviceSelection::SystemDefault,
            event_callback: None,
            config: JammerConfig::default(),
        }
    }

    /// Use a specific audio backend.
    ///
    /// Default: [`CpalBackend`]
    pub fn backend<B: AudioBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Select the capture device.
    pub fn input_device(mut self, device: DeviceSelection) -> Self {
        self.input_device = device;
        self
    }

    /// Select the playback device.
    pub fn output_device(mut self, device: DeviceSelection) -> Self {
        self.output_device = device;
        self
    }

    /// Set the delay line parameters.
    pub fn delay(mut self, delay: DelayConfig) -> Self {
        self.config.delay = delay;
        self
    }

    /// Set the callback block size in frames.
    pub fn block_size(mut self, frames: u32) -> Self {
        self.config.block_size = frames;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include start/stop, reconfiguration, channel folding and
    /// driver errors.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(JammerEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom stream configuration.
    pub fn with_config(mut self, config: JammerConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates an idle session.
    pub fn build(self) -> AudioSession {
        let backend: Box<dyn AudioBackend> = match self.backend {
            Some(backend) => backend,
            None => Box::new(CpalBackend::new()),
        };
        tracing::debug!(
            backend = backend.name(),
            input = %self.input_device,
            output = %self.output_device,
            "building speech jammer session"
        );
        AudioSession::new(
            backend,
            self.config,
            self.input_device,
            self.output_device,
            self.event_callback,
        )
    }
}

/// Main entry point for speech-jammer.
///
/// Use [`SpeechJammer::builder()`] to start configuring a session.
pub struct SpeechJammer;

impl SpeechJammer {
    /// Creates a new builder for configuring a session.
    pub fn builder() -> SpeechJammerBuilder {
        SpeechJammerBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockBackend;

    #[test]
    fn test_builder_default() {
        let builder = SpeechJammerBuilder::new();
        assert!(builder.backend.is_none());
        assert_eq!(builder.input_device, DeviceSelection::SystemDefault);
        assert_eq!(builder.output_device, DeviceSelection::SystemDefault);
        assert_eq!(builder.config.delay, DelayConfig::default());
    }

    #[test]
    fn test_builder_delay_and_block_size() {
        let builder = SpeechJammer::builder()
            .delay(DelayConfig::new(0.25, 0.5))
            .block_size(128);
        assert_eq!(builder.config.delay.delay_seconds(), 0.25);
        assert_eq!(builder.config.block_size(), 128);
    }

    #[test]
    fn test_builder_devices() {
        let builder = SpeechJammer::builder()
            .input_device(DeviceSelection::Index(1))
            .output_device(DeviceSelection::Index(4));
        assert_eq!(builder.input_device, DeviceSelection::Index(1));
        assert_eq!(builder.output_device, DeviceSelection::Index(4));
    }

    #[test]
    fn test_build_with_backend_is_idle() {
        let session = SpeechJammer::builder()
            .backend(MockBackend::new(1000))
            .build();
        assert!(!session.is_running());
        assert_eq!(session.backend_name(), "mock");
    }

    #[test]
    fn test_build_defaults_to_cpal() {
        let session = SpeechJammer::builder().build();
        assert_eq!(session.backend_name(), "cpal");
    }
}
