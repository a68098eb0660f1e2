//! Mock backend for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::{ActiveStream, AudioBackend, DeviceInfo, DeviceSelection, DeviceSpec, ErrorCallback};
use crate::pipeline::{CaptureHalf, RenderHalf};
use crate::AudioError;

/// Signal generator: maps a frame index (from stream start) to a sample.
pub type SignalFn = Arc<dyn Fn(u64) -> f32 + Send + Sync>;

/// A backend that drives the callback halves from a plain thread.
///
/// Each block, the driver thread synthesizes one capture block, feeds it to
/// the capture half, renders one playback block, and records the output.
/// This exercises the same code path as a real device, so sessions can be
/// tested in CI.
///
/// # Example
///
/// ```
/// use speech_jammer::{MockBackend, SpeechJammer};
///
/// let backend = MockBackend::new(1000);
/// let handle = backend.handle();
///
/// let mut session = SpeechJammer::builder().backend(backend).build();
/// session.start().unwrap();
/// session.stop();
///
/// assert_eq!(handle.opens(), 1);
/// assert!(!handle.is_streaming());
/// ```
pub struct MockBackend {
    devices: Vec<DeviceInfo>,
    signal: SignalFn,
    block_interval: Duration,
    fail_reason: Option<String>,
    /// Opens left to fail; `None` fails every open.
    fail_remaining: Option<usize>,
    handle: MockHandle,
}

/// Observation handle for a [`MockBackend`], usable after the backend has
/// been moved into a session.
#[derive(Clone, Default)]
pub struct MockHandle {
    output: Arc<Mutex<Vec<f32>>>,
    opens: Arc<AtomicUsize>,
    blocks: Arc<AtomicU64>,
    streaming: Arc<AtomicBool>,
    last_spec: Arc<Mutex<Option<DeviceSpec>>>,
}

impl MockHandle {
    /// Output rendered by the current (or last) stream, interleaved.
    pub fn output(&self) -> Vec<f32> {
        self.output.lock().clone()
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Blocks rendered across all streams.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::SeqCst)
    }

    /// Returns `true` while a driver thread is running.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Spec of the most recent open.
    pub fn last_spec(&self) -> Option<DeviceSpec> {
        *self.last_spec.lock()
    }
}

impl MockBackend {
    /// Creates a backend with one duplex device: stereo in, stereo out, at
    /// `sample_rate`, fed a constant 0.5 signal.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            devices: vec![DeviceInfo {
                index: 0,
                name: "Mock Duplex".to_string(),
                max_input_channels: 2,
                max_output_channels: 2,
                default_sample_rate: sample_rate,
            }],
            signal: Arc::new(|_| 0.5),
            block_interval: Duration::from_millis(1),
            fail_reason: None,
            fail_remaining: None,
            handle: MockHandle::default(),
        }
    }

    /// Replaces the device list. The first input-capable and first
    /// output-capable devices act as system defaults.
    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Sets the capture signal.
    pub fn with_signal<F>(mut self, signal: F) -> Self
    where
        F: Fn(u64) -> f32 + Send + Sync + 'static,
    {
        self.signal = Arc::new(signal);
        self
    }

    /// Sets the pause between blocks.
    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = interval;
        self
    }

    /// Makes every open fail with `DeviceUnavailable`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_reason = Some(reason.into());
        self.fail_remaining = None;
        self
    }

    /// Makes the next `opens` opens fail, then succeeds.
    pub fn failing_first(mut self, opens: usize, reason: impl Into<String>) -> Self {
        self.fail_reason = Some(reason.into());
        self.fail_remaining = Some(opens);
        self
    }

    fn should_fail(&mut self) -> bool {
        if self.fail_reason.is_none() {
            return false;
        }
        match self.fail_remaining.as_mut() {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    /// Returns an observation handle.
    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    fn find(&self, selection: DeviceSelection, input: bool) -> Result<&DeviceInfo, AudioError> {
        let found = match selection {
            DeviceSelection::Index(index) => self.devices.iter().find(|d| d.index == index),
            DeviceSelection::SystemDefault if input => self.devices.iter().find(|d| d.is_input()),
            DeviceSelection::SystemDefault => self.devices.iter().find(|d| d.is_output()),
        };
        found.ok_or_else(|| AudioError::device_unavailable(selection.to_string(), "device not found"))
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn negotiate(
        &self,
        input: DeviceSelection,
        output: DeviceSelection,
    ) -> Result<DeviceSpec, AudioError> {
        let input_info = self.find(input, true)?;
        let output_info = self.find(output, false)?;
        DeviceSpec::from_capabilities(
            input,
            output,
            input_info.max_input_channels,
            output_info.max_output_channels,
            output_info.default_sample_rate,
        )
    }

    fn open(
        &mut self,
        spec: &DeviceSpec,
        block_size: u32,
        mut capture: CaptureHalf,
        mut render: RenderHalf,
        _on_error: ErrorCallback,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        if self.should_fail() {
            let reason = self.fail_reason.as_deref().unwrap_or("open failed");
            return Err(AudioError::device_unavailable(
                spec.output_device.to_string(),
                reason,
            ));
        }

        let input_channels = usize::from(spec.input_channels);
        let output_channels = usize::from(spec.output_channels);
        let frames = block_size as usize;
        let signal = Arc::clone(&self.signal);
        let interval = self.block_interval;
        let handle = self.handle.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        handle.output.lock().clear();
        *handle.last_spec.lock() = Some(*spec);
        handle.streaming.store(true, Ordering::SeqCst);
        handle.opens.fetch_add(1, Ordering::SeqCst);

        let thread = thread::Builder::new()
            .name("speech-jammer-mock".to_string())
            .spawn(move || {
                let mut input = vec![0.0f32; frames * input_channels];
                let mut output = vec![0.0f32; frames * output_channels];
                let mut frame_index = 0u64;

                while !stop_flag.load(Ordering::SeqCst) {
                    for frame in input.chunks_exact_mut(input_channels.max(1)) {
                        frame.fill(signal(frame_index));
                        frame_index += 1;
                    }
                    capture.push_block(&input);
                    render.render_block(&mut output);

                    handle.output.lock().extend_from_slice(&output);
                    handle.blocks.fetch_add(1, Ordering::SeqCst);

                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                handle.streaming.store(false, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::device_unavailable(spec.output_device.to_string(), e))?;

        Ok(Box::new(MockStream {
            stop,
            thread: Some(thread),
        }))
    }
}

struct MockStream {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockStream {
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl ActiveStream for MockStream {
    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_defaults() {
        let backend = MockBackend::new(8000);
        let spec = backend
            .negotiate(DeviceSelection::SystemDefault, DeviceSelection::SystemDefault)
            .unwrap();
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.input_channels, 2);
        assert_eq!(spec.output_channels, 2);
        assert_eq!(backend.name(), "mock");
    }

    #[test]
    fn test_negotiate_unknown_index() {
        let backend = MockBackend::new(8000);
        let err = backend
            .negotiate(DeviceSelection::SystemDefault, DeviceSelection::Index(7))
            .unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_default_picks_direction_capable_devices() {
        let backend = MockBackend::new(8000).with_devices(vec![
            DeviceInfo {
                index: 0,
                name: "Speakers".to_string(),
                max_input_channels: 0,
                max_output_channels: 2,
                default_sample_rate: 48000,
            },
            DeviceInfo {
                index: 1,
                name: "Headset Mic".to_string(),
                max_input_channels: 1,
                max_output_channels: 0,
                default_sample_rate: 16000,
            },
        ]);
        let spec = backend
            .negotiate(DeviceSelection::SystemDefault, DeviceSelection::SystemDefault)
            .unwrap();
        assert_eq!(spec.input_channels, 1);
        assert_eq!(spec.output_channels, 2);
        assert_eq!(spec.sample_rate, 48000);
    }

    #[test]
    fn test_handle_defaults() {
        let handle = MockBackend::new(8000).handle();
        assert_eq!(handle.opens(), 0);
        assert_eq!(handle.blocks(), 0);
        assert!(!handle.is_streaming());
        assert!(handle.output().is_empty());
        assert!(handle.last_spec().is_none());
    }

    #[test]
    fn test_failing_first_recovers() {
        let mut backend = MockBackend::new(8000).failing_first(1, "busy");
        assert!(backend.should_fail());
        assert!(!backend.should_fail());
        assert!(!backend.should_fail());
    }
}
