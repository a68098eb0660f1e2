//! Device layer: enumeration, negotiation and stream backends.
//!
//! The session never talks to the platform directly. It goes through an
//! [`AudioBackend`], which turns a [`DeviceSpec`] plus the two callback
//! halves into a running [`ActiveStream`]:
//!
//! - [`CpalBackend`] drives real devices through CPAL
//! - [`MockBackend`] drives the same callbacks from a plain thread, for tests
//!   and machines without audio hardware

mod cpal_backend;
mod mock;
mod select;

pub use cpal_backend::{list_devices, CpalBackend};
pub use mock::{MockBackend, MockHandle};
pub use select::{select_output_device, DEFAULT_PREFERRED_KEYWORDS};

use std::fmt;
use std::sync::Arc;

use crate::format::ChannelMapping;
use crate::pipeline::{CaptureHalf, RenderHalf};
use crate::AudioError;

/// Widest input the engine captures; extra device channels are not opened.
pub const MAX_INPUT_CHANNELS: u16 = 2;
/// Widest output the engine renders.
pub const MAX_OUTPUT_CHANNELS: u16 = 2;

/// Which device to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// The host's default device for the direction.
    #[default]
    SystemDefault,
    /// A device by its position in [`list_devices`].
    Index(usize),
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemDefault => write!(f, "system default"),
            Self::Index(index) => write!(f, "device #{index}"),
        }
    }
}

/// One enumerated audio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the host's device list.
    pub index: usize,
    /// Device name as reported by the host.
    pub name: String,
    /// Most input channels any supported config offers (0 = output only).
    pub max_input_channels: u16,
    /// Most output channels any supported config offers (0 = input only).
    pub max_output_channels: u16,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

impl DeviceInfo {
    /// Returns `true` if the device can capture.
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    /// Returns `true` if the device can play back.
    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// The negotiated shape of one duplex stream.
///
/// Resolved once per stream start and immutable while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Capture device.
    pub input_device: DeviceSelection,
    /// Playback device.
    pub output_device: DeviceSelection,
    /// Channels opened on the capture device.
    pub input_channels: u16,
    /// Channels opened on the playback device; also the engine width.
    pub output_channels: u16,
    /// Shared sample rate in Hz.
    pub sample_rate: u32,
}

impl DeviceSpec {
    /// Derives a spec from device capabilities.
    ///
    /// Opens at most [`MAX_INPUT_CHANNELS`] in and [`MAX_OUTPUT_CHANNELS`]
    /// out, at the playback device's default rate.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if either side has no channels in the
    /// needed direction.
    pub fn from_capabilities(
        input_device: DeviceSelection,
        output_device: DeviceSelection,
        max_input_channels: u16,
        max_output_channels: u16,
        output_sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if max_input_channels == 0 {
            return Err(AudioError::device_unavailable(
                input_device.to_string(),
                "device has no input channels",
            ));
        }
        if max_output_channels == 0 {
            return Err(AudioError::device_unavailable(
                output_device.to_string(),
                "device has no output channels",
            ));
        }
        if output_sample_rate == 0 {
            return Err(AudioError::device_unavailable(
                output_device.to_string(),
                "device reports no sample rate",
            ));
        }

        Ok(Self {
            input_device,
            output_device,
            input_channels: max_input_channels.min(MAX_INPUT_CHANNELS),
            output_channels: max_output_channels.min(MAX_OUTPUT_CHANNELS),
            sample_rate: output_sample_rate,
        })
    }

    /// Derives a spec from two enumerated devices.
    pub fn negotiate(input: &DeviceInfo, output: &DeviceInfo) -> Result<Self, AudioError> {
        Self::from_capabilities(
            DeviceSelection::Index(input.index),
            DeviceSelection::Index(output.index),
            input.max_input_channels,
            output.max_output_channels,
            output.default_sample_rate,
        )
    }

    /// The channel folding this spec requires.
    pub fn channel_mapping(&self) -> ChannelMapping {
        ChannelMapping::new(
            usize::from(self.input_channels),
            usize::from(self.output_channels),
        )
    }
}

/// Callback for errors reported by the driver while a stream runs.
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// A platform that can open duplex streams.
pub trait AudioBackend: Send {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Resolves a [`DeviceSpec`] for the selected devices.
    fn negotiate(
        &self,
        input: DeviceSelection,
        output: DeviceSelection,
    ) -> Result<DeviceSpec, AudioError>;

    /// Opens and starts a stream.
    ///
    /// `capture` must be fed every captured block and `render` must fill
    /// every playback block, in callback order, until the returned stream is
    /// stopped. Failures leave nothing running.
    fn open(
        &mut self,
        spec: &DeviceSpec,
        block_size: u32,
        capture: CaptureHalf,
        render: RenderHalf,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn ActiveStream>, AudioError>;
}

/// A running stream.
pub trait ActiveStream: Send {
    /// Halts the stream.
    ///
    /// Blocks until the device callbacks have returned for the last time
    /// and the device handles are released.
    fn stop(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(index: usize, max_in: u16, max_out: u16, rate: u32) -> DeviceInfo {
        DeviceInfo {
            index,
            name: format!("dev{index}"),
            max_input_channels: max_in,
            max_output_channels: max_out,
            default_sample_rate: rate,
        }
    }

    #[test]
    fn test_negotiate_caps_channels() {
        let spec = DeviceSpec::negotiate(&device(0, 4, 0, 16000), &device(1, 0, 8, 48000)).unwrap();
        assert_eq!(spec.input_channels, 2);
        assert_eq!(spec.output_channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.input_device, DeviceSelection::Index(0));
        assert_eq!(spec.output_device, DeviceSelection::Index(1));
    }

    #[test]
    fn test_negotiate_mono_mic() {
        let spec = DeviceSpec::negotiate(&device(0, 1, 0, 44100), &device(1, 0, 2, 44100)).unwrap();
        assert_eq!(spec.channel_mapping(), ChannelMapping::MonoToStereo);
    }

    #[test]
    fn test_negotiate_rejects_output_only_input() {
        let err = DeviceSpec::negotiate(&device(0, 0, 2, 44100), &device(1, 0, 2, 44100))
            .unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_negotiate_rejects_input_only_output() {
        let err = DeviceSpec::negotiate(&device(0, 2, 0, 44100), &device(1, 2, 0, 44100))
            .unwrap_err();
        assert!(err.to_string().contains("no output channels"));
    }

    #[test]
    fn test_device_selection_display() {
        assert_eq!(DeviceSelection::SystemDefault.to_string(), "system default");
        assert_eq!(DeviceSelection::Index(3).to_string(), "device #3");
    }

    #[test]
    fn test_device_info_directions() {
        let info = device(0, 1, 0, 44100);
        assert!(info.is_input());
        assert!(!info.is_output());
    }
}
