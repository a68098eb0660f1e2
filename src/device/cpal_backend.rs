//! CPAL backend for real audio devices.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, Stream, StreamConfig, SupportedBufferSize};

use super::{ActiveStream, AudioBackend, DeviceInfo, DeviceSelection, DeviceSpec, ErrorCallback};
use crate::pipeline::{CaptureHalf, RenderHalf};
use crate::AudioError;

/// Lists every device the default host exposes.
///
/// Indices in the result are what [`DeviceSelection::Index`] refers to.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .devices()
        .map_err(|e| AudioError::Backend(e.to_string()))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| describe_device(index, &device))
        .collect())
}

/// Streams through the platform's default CPAL host.
///
/// CPAL streams are not `Send` on every platform, so each stream is built,
/// played and finally dropped on a dedicated thread. Stopping signals that
/// thread and joins it; CPAL's stream teardown waits for the in-flight
/// callback, so once [`ActiveStream::stop`] returns no callback can run.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn negotiate(
        &self,
        input: DeviceSelection,
        output: DeviceSelection,
    ) -> Result<DeviceSpec, AudioError> {
        let host = cpal::default_host();
        let input_device = find_device(&host, input, Direction::Input)?;
        let output_device = find_device(&host, output, Direction::Output)?;

        let (max_input_channels, _, _) = capabilities(&input_device);
        let (_, max_output_channels, sample_rate) = capabilities(&output_device);
        tracing::debug!(
            input = %device_name(&input_device),
            max_input_channels,
            output = %device_name(&output_device),
            max_output_channels,
            sample_rate,
            "negotiating device spec"
        );

        DeviceSpec::from_capabilities(
            input,
            output,
            max_input_channels,
            max_output_channels,
            sample_rate,
        )
    }

    fn open(
        &mut self,
        spec: &DeviceSpec,
        block_size: u32,
        capture: CaptureHalf,
        render: RenderHalf,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let spec = *spec;

        let thread = thread::Builder::new()
            .name("speech-jammer-stream".to_string())
            .spawn(move || {
                let streams = match DuplexStreams::build(&spec, block_size, capture, render, on_error)
                {
                    Ok(streams) => streams,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Parks until stop() sends or the handle is dropped
                let _ = stop_rx.recv();
                streams.halt();
            })
            .map_err(|e| AudioError::device_unavailable(spec.output_device.to_string(), e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::device_unavailable(
                    spec.output_device.to_string(),
                    "stream thread exited during setup",
                ))
            }
        }
    }
}

/// Handle to the thread that owns a pair of CPAL streams.
struct CpalStream {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("audio stream thread panicked during shutdown");
            }
        }
    }
}

impl ActiveStream for CpalStream {
    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The capture and playback streams of one duplex session.
struct DuplexStreams {
    input: Stream,
    output: Stream,
}

impl DuplexStreams {
    fn build(
        spec: &DeviceSpec,
        block_size: u32,
        mut capture: CaptureHalf,
        mut render: RenderHalf,
        on_error: ErrorCallback,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let input_device = find_device(&host, spec.input_device, Direction::Input)?;
        let output_device = find_device(&host, spec.output_device, Direction::Output)?;
        let input_name = device_name(&input_device);
        let output_name = device_name(&output_device);

        let input_config = StreamConfig {
            channels: spec.input_channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: buffer_size_for(&input_device, Direction::Input, spec, block_size),
        };
        let output_config = StreamConfig {
            channels: spec.output_channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: buffer_size_for(&output_device, Direction::Output, spec, block_size),
        };

        let output_errors = on_error.clone();
        let output = output_device
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render.render_block(data);
                },
                move |err| {
                    tracing::error!("Audio output stream error: {}", err);
                    output_errors(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::device_unavailable(&output_name, e))?;

        let input = input_device
            .build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    capture.push_block(data);
                },
                move |err| {
                    tracing::error!("Audio input stream error: {}", err);
                    on_error(err.to_string());
                },
                None,
            )
            .map_err(|e| AudioError::device_unavailable(&input_name, e))?;

        output
            .play()
            .map_err(|e| AudioError::device_unavailable(&output_name, e))?;
        input
            .play()
            .map_err(|e| AudioError::device_unavailable(&input_name, e))?;

        tracing::info!(
            input = %input_name,
            output = %output_name,
            input_channels = spec.input_channels,
            output_channels = spec.output_channels,
            sample_rate = spec.sample_rate,
            "CPAL duplex streams playing"
        );

        Ok(Self { input, output })
    }

    /// Pauses capture first so nothing new is queued, then drops both.
    fn halt(self) {
        if let Err(e) = self.input.pause() {
            tracing::debug!("input pause failed: {}", e);
        }
        if let Err(e) = self.output.pause() {
            tracing::debug!("output pause failed: {}", e);
        }
        drop(self.input);
        drop(self.output);
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn find_device(
    host: &Host,
    selection: DeviceSelection,
    direction: Direction,
) -> Result<Device, AudioError> {
    let device = match (selection, direction) {
        (DeviceSelection::SystemDefault, Direction::Input) => host.default_input_device(),
        (DeviceSelection::SystemDefault, Direction::Output) => host.default_output_device(),
        (DeviceSelection::Index(index), _) => host
            .devices()
            .map_err(|e| AudioError::Backend(e.to_string()))?
            .nth(index),
    };

    device.ok_or_else(|| AudioError::device_unavailable(selection.to_string(), "device not found"))
}

fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "unknown".to_string())
}

fn describe_device(index: usize, device: &Device) -> DeviceInfo {
    let (max_input_channels, max_output_channels, default_sample_rate) = capabilities(device);
    DeviceInfo {
        index,
        name: device_name(device),
        max_input_channels,
        max_output_channels,
        default_sample_rate,
    }
}

/// Max input channels, max output channels and default rate of a device.
fn capabilities(device: &Device) -> (u16, u16, u32) {
    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let default_sample_rate = device
        .default_output_config()
        .or_else(|_| device.default_input_config())
        .map(|config| config.sample_rate().0)
        .unwrap_or(0);

    (max_input_channels, max_output_channels, default_sample_rate)
}

/// Uses the requested block size when the device advertises it for this
/// channel count and rate, otherwise lets the driver pick.
fn buffer_size_for(
    device: &Device,
    direction: Direction,
    spec: &DeviceSpec,
    block_size: u32,
) -> BufferSize {
    let channels = match direction {
        Direction::Input => spec.input_channels,
        Direction::Output => spec.output_channels,
    };
    let ranges: Vec<_> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(Iterator::collect)
            .unwrap_or_default(),
        Direction::Output => device
            .supported_output_configs()
            .map(Iterator::collect)
            .unwrap_or_default(),
    };

    let supported = ranges.iter().any(|range| {
        range.channels() == channels
            && (range.min_sample_rate().0..=range.max_sample_rate().0).contains(&spec.sample_rate)
            && match range.buffer_size() {
                SupportedBufferSize::Range { min, max } => (*min..=*max).contains(&block_size),
                SupportedBufferSize::Unknown => true,
            }
    });

    if supported {
        BufferSize::Fixed(block_size)
    } else {
        tracing::warn!(
            ?direction,
            block_size,
            "device does not advertise the requested block size, using driver default"
        );
        BufferSize::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_doesnt_panic() {
        // This may return an empty list in CI, but shouldn't panic
        let _ = list_devices();
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_negotiate_default_devices() {
        let spec = CpalBackend::new()
            .negotiate(DeviceSelection::SystemDefault, DeviceSelection::SystemDefault)
            .unwrap();
        println!("Default spec: {spec:?}");
        assert!(spec.sample_rate > 0);
    }
}
