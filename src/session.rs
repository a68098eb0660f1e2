//! Audio session lifecycle and control surface.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::{random_delay_seconds, DelayConfig, JammerConfig};
use crate::device::{ActiveStream, AudioBackend, DeviceSelection, DeviceSpec, ErrorCallback};
use crate::pipeline::{duplex_pair, DelayEngine, StreamStats};
use crate::{AudioError, EventCallback, JammerEvent};

/// Engine width and rate used before the first stream negotiates real ones.
const IDLE_CHANNELS: u16 = 2;
const IDLE_SAMPLE_RATE: u32 = 48000;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream open. Configuration may change freely.
    Idle,
    /// A stream is open and the callbacks own the engine.
    Running,
}

/// Snapshot of a session for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Whether a stream is running.
    pub running: bool,
    /// Configured delay in seconds.
    pub delay_seconds: f32,
    /// Configured feedback gain.
    pub gain: f32,
    /// Whether the delayed signal is phase-inverted.
    pub invert_phase: bool,
    /// Whether output is clipped to [-1, 1].
    pub clip_output: bool,
    /// Spec of the running (or last) stream.
    pub device: Option<DeviceSpec>,
    /// Delay line length in frames at the stream's rate.
    pub delay_frames: Option<usize>,
    /// Frames rendered by the current (or last) stream.
    pub frames_processed: u64,
    /// Underrun blocks in the current (or last) stream.
    pub underruns: u64,
    /// Captured frames dropped on a full queue or trimmed from a backlog.
    pub dropped_frames: u64,
    /// Driver errors reported by the current (or last) stream.
    pub stream_errors: u64,
}

impl Status {
    /// Reports underruns as a diagnostic, if any occurred.
    pub fn underrun_report(&self) -> Option<AudioError> {
        (self.underruns > 0).then_some(AudioError::BufferUnderrun {
            count: self.underruns,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] delay {:.0}ms | gain {:.2} | phase {}",
            if self.running { "running" } else { "stopped" },
            self.delay_seconds * 1000.0,
            self.gain,
            if self.invert_phase { "inverted" } else { "normal" },
        )?;
        if let Some(spec) = self.device {
            write!(
                f,
                " | {}Hz {}->{}ch",
                spec.sample_rate, spec.input_channels, spec.output_channels
            )?;
        }
        write!(
            f,
            " | frames {} | underruns {} | dropped {}",
            self.frames_processed, self.underruns, self.dropped_frames
        )?;
        if self.stream_errors > 0 {
            write!(f, " | errors {}", self.stream_errors)?;
        }
        Ok(())
    }
}

struct ActiveSession {
    stream: Box<dyn ActiveStream>,
    spec: DeviceSpec,
}

/// A speech jammer session: one delay engine and at most one live stream.
///
/// Created by [`SpeechJammerBuilder::build()`]. All engine configuration is
/// routed through stop/configure/start, so the audio callbacks never share
/// the engine with the control thread while a stream runs. Every parameter
/// change therefore costs a brief gap in the audio.
///
/// # Lifecycle
///
/// ```text
/// Idle --start--> Running --stop--> Idle
/// Running --reconfigure--> Running (internal stop + start)
/// ```
///
/// `start` while Running and `stop` while Idle are no-ops. Dropping a
/// running session stops it.
///
/// # Example
///
/// ```ignore
/// let mut session = SpeechJammer::builder()
///     .delay(DelayConfig::new(0.2, 0.8))
///     .build();
///
/// session.start()?;
/// session.set_delay(0.25)?;
/// println!("{:?}", session.status());
/// session.stop();
/// ```
///
/// [`SpeechJammerBuilder::build()`]: crate::SpeechJammerBuilder::build
pub struct AudioSession {
    backend: Box<dyn AudioBackend>,
    engine: Arc<Mutex<DelayEngine>>,
    config: JammerConfig,
    input_device: DeviceSelection,
    output_device: DeviceSelection,
    active: Option<ActiveSession>,
    last_spec: Option<DeviceSpec>,
    stats: Arc<StreamStats>,
    event_callback: Option<EventCallback>,
}

impl AudioSession {
    pub(crate) fn new(
        backend: Box<dyn AudioBackend>,
        config: JammerConfig,
        input_device: DeviceSelection,
        output_device: DeviceSelection,
        event_callback: Option<EventCallback>,
    ) -> Self {
        let engine = DelayEngine::new(config.delay, IDLE_CHANNELS, IDLE_SAMPLE_RATE);
        Self {
            backend,
            engine: Arc::new(Mutex::new(engine)),
            config,
            input_device,
            output_device,
            active: None,
            last_spec: None,
            stats: Arc::new(StreamStats::new()),
            event_callback,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    /// Returns `true` if a stream is running.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Negotiates the selected devices and starts streaming.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the devices cannot be resolved or
    /// opened. The session stays idle.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.active.is_some() {
            return Ok(());
        }
        let spec = self
            .backend
            .negotiate(self.input_device, self.output_device)
            .map_err(|e| self.as_device_error(e))?;
        self.start_with(spec)
    }

    /// Starts streaming with an already negotiated spec.
    ///
    /// The engine is rebuilt for the spec before the stream opens, so
    /// playback always begins from a silent delay line.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the backend cannot open the stream.
    pub fn start_with(&mut self, spec: DeviceSpec) -> Result<(), AudioError> {
        if self.active.is_some() {
            return Ok(());
        }

        let delay = self.config.delay;
        self.engine()
            .configure(delay, spec.output_channels, spec.sample_rate);

        let mapping = spec.channel_mapping();
        if !mapping.is_passthrough() {
            let diagnostic = AudioError::ChannelMismatch {
                source_channels: spec.input_channels,
                target_channels: spec.output_channels,
            };
            tracing::warn!(%diagnostic, ?mapping, "folding capture channels");
            self.emit(JammerEvent::ChannelMismatch {
                input_channels: spec.input_channels,
                output_channels: spec.output_channels,
            });
        }

        let stats = Arc::new(StreamStats::new());
        let (capture, render) = duplex_pair(
            Arc::clone(&self.engine),
            mapping,
            self.config.capture_queue_frames(spec.sample_rate),
            Arc::clone(&stats),
        );
        let on_error = self.stream_error_callback(&stats);

        let stream = self
            .backend
            .open(&spec, self.config.block_size(), capture, render, on_error)
            .map_err(|e| {
                let e = self.as_device_error(e);
                tracing::error!(backend = self.backend.name(), error = %e, "failed to start stream");
                e
            })?;

        self.stats = stats;
        self.last_spec = Some(spec);
        self.active = Some(ActiveSession { stream, spec });

        tracing::info!(
            backend = self.backend.name(),
            sample_rate = spec.sample_rate,
            input_channels = spec.input_channels,
            output_channels = spec.output_channels,
            block_size = self.config.block_size(),
            delay_ms = delay.delay_seconds() * 1000.0,
            gain = delay.feedback_gain(),
            "speech jammer started"
        );
        self.emit(JammerEvent::Started { spec });
        Ok(())
    }

    /// Stops streaming.
    ///
    /// Blocks until the backend guarantees no further callbacks, then
    /// releases the device. No-op when idle.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.stream.stop();

        tracing::info!(
            frames_processed = self.stats.frames_processed.load(Ordering::Relaxed),
            underruns = self.stats.underruns.load(Ordering::Relaxed),
            "speech jammer stopped"
        );
        self.emit(JammerEvent::Stopped);
    }

    /// Changes delay and gain.
    ///
    /// Values are clamped into range. A running stream is restarted with
    /// the same device spec because the delay line must be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the restart fails; the new values are
    /// kept and the session is left idle.
    pub fn reconfigure(&mut self, delay_seconds: f32, feedback_gain: f32) -> Result<(), AudioError> {
        let mut delay = self.config.delay;
        delay.set_delay_seconds(delay_seconds);
        delay.set_feedback_gain(feedback_gain);
        self.apply_delay_config(delay)
    }

    /// Changes the delay, keeping the gain.
    pub fn set_delay(&mut self, seconds: f32) -> Result<(), AudioError> {
        self.reconfigure(seconds, self.config.delay.feedback_gain())
    }

    /// Changes the gain, keeping the delay.
    pub fn set_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        self.reconfigure(self.config.delay.delay_seconds(), gain)
    }

    /// Enables or disables phase inversion of the delayed signal.
    pub fn set_invert_phase(&mut self, invert: bool) -> Result<(), AudioError> {
        let delay = self.config.delay.with_invert_phase(invert);
        self.apply_delay_config(delay)
    }

    /// Enables or disables output clipping.
    pub fn set_clip_output(&mut self, clip: bool) -> Result<(), AudioError> {
        let delay = self.config.delay.with_clip_output(clip);
        self.apply_delay_config(delay)
    }

    /// Picks a random delay in the disruptive 180-220ms range.
    ///
    /// Returns the chosen delay in seconds.
    pub fn randomize_delay(&mut self) -> Result<f32, AudioError> {
        let seconds = random_delay_seconds();
        self.set_delay(seconds)?;
        Ok(self.config.delay.delay_seconds())
    }

    /// Replaces the whole delay configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if a running stream fails to restart.
    pub fn apply_delay_config(&mut self, delay: DelayConfig) -> Result<(), AudioError> {
        self.config.delay = delay;

        match self.active.as_ref().map(|active| active.spec) {
            Some(spec) => {
                self.stop();
                self.start_with(spec)?;
            }
            None => {
                let mut engine = self.engine();
                let channels = u16::try_from(engine.channels()).unwrap_or(IDLE_CHANNELS);
                let sample_rate = engine.sample_rate();
                engine.configure(delay, channels, sample_rate);
            }
        }

        self.emit(JammerEvent::Reconfigured {
            delay_seconds: delay.delay_seconds(),
            gain: delay.feedback_gain(),
            invert_phase: delay.invert_phase,
        });
        Ok(())
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> Status {
        let delay = self.config.delay;
        let spec = self.active.as_ref().map(|a| a.spec).or(self.last_spec);
        Status {
            running: self.is_running(),
            delay_seconds: delay.delay_seconds(),
            gain: delay.feedback_gain(),
            invert_phase: delay.invert_phase,
            clip_output: delay.clip_output,
            device: spec,
            delay_frames: spec.map(|s| delay.delay_frames(s.sample_rate)),
            frames_processed: self.stats.frames_processed.load(Ordering::Relaxed),
            underruns: self.stats.underruns.load(Ordering::Relaxed),
            dropped_frames: self.stats.dropped_frames.load(Ordering::Relaxed),
            stream_errors: self.stats.stream_errors.load(Ordering::Relaxed),
        }
    }

    /// Current delay configuration.
    pub fn delay_config(&self) -> DelayConfig {
        self.config.delay
    }

    /// Stream configuration.
    pub fn config(&self) -> &JammerConfig {
        &self.config
    }

    /// Spec of the running stream, if any.
    pub fn device_spec(&self) -> Option<DeviceSpec> {
        self.active.as_ref().map(|a| a.spec)
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Locks the engine from the control thread.
    ///
    /// Only reached while idle or during start, when no callback holds it.
    fn engine(&self) -> MutexGuard<'_, DelayEngine> {
        self.engine.lock()
    }

    fn as_device_error(&self, error: AudioError) -> AudioError {
        match error {
            AudioError::Backend(reason) => {
                AudioError::device_unavailable(self.output_device.to_string(), reason)
            }
            other => other,
        }
    }

    fn stream_error_callback(&self, stats: &Arc<StreamStats>) -> ErrorCallback {
        let stats = Arc::clone(stats);
        let events = self.event_callback.clone();
        Arc::new(move |reason: String| {
            stats.stream_errors.fetch_add(1, Ordering::Relaxed);
            if let Some(ref callback) = events {
                callback(JammerEvent::StreamError { reason });
            }
        })
    }

    fn emit(&self, event: JammerEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockBackend;

    fn session(backend: MockBackend) -> AudioSession {
        AudioSession::new(
            Box::new(backend),
            JammerConfig::default(),
            DeviceSelection::SystemDefault,
            DeviceSelection::SystemDefault,
            None,
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = session(MockBackend::new(1000));
        assert_eq!(session.state(), SessionState::Idle);
        let status = session.status();
        assert!(!status.running);
        assert!(status.device.is_none());
        assert_eq!(status.frames_processed, 0);
    }

    #[test]
    fn test_start_stop_transitions() {
        let mut session = session(MockBackend::new(1000));
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.device_spec().is_some());
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.device_spec().is_none());
        assert!(session.status().device.is_some());
    }

    #[test]
    fn test_failed_open_stays_idle() {
        let mut session = session(MockBackend::new(1000).failing("device busy"));
        let err = session.start().unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
        assert!(err.to_string().contains("device busy"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_idle_reconfigure_does_not_start() {
        let backend = MockBackend::new(1000);
        let handle = backend.handle();
        let mut session = session(backend);
        session.reconfigure(0.3, 0.4).unwrap();
        assert!(!session.is_running());
        assert_eq!(handle.opens(), 0);
        assert_eq!(session.delay_config().delay_seconds(), 0.3);
        assert_eq!(session.delay_config().feedback_gain(), 0.4);
    }

    #[test]
    fn test_setters_clamp() {
        let mut session = session(MockBackend::new(1000));
        session.set_delay(5.0).unwrap();
        session.set_gain(-1.0).unwrap();
        let status = session.status();
        assert_eq!(status.delay_seconds, crate::config::MAX_DELAY_SECONDS);
        assert_eq!(status.gain, 0.0);
    }

    #[test]
    fn test_underrun_report() {
        let mut status = session(MockBackend::new(1000)).status();
        assert!(status.underrun_report().is_none());
        status.underruns = 2;
        assert_eq!(
            status.underrun_report(),
            Some(AudioError::BufferUnderrun { count: 2 })
        );
    }

    #[test]
    fn test_status_display() {
        let mut status = session(MockBackend::new(1000)).status();
        let line = status.to_string();
        assert!(line.starts_with("[stopped] delay 180ms | gain 0.70 | phase normal"));
        assert!(!line.contains("errors"));
        status.stream_errors = 1;
        assert!(status.to_string().ends_with("errors 1"));
    }

    #[test]
    fn test_drop_stops_stream() {
        let backend = MockBackend::new(1000);
        let handle = backend.handle();
        let mut session = session(backend);
        session.start().unwrap();
        assert!(handle.is_streaming());
        drop(session);
        assert!(!handle.is_streaming());
    }
}
