//! Configuration types for the delay engine and its stream.

use std::time::Duration;

/// Shortest supported delay interval.
pub const MIN_DELAY_SECONDS: f32 = 0.05;
/// Longest supported delay interval.
pub const MAX_DELAY_SECONDS: f32 = 0.5;
/// Default delay interval (180ms sits in the most disruptive range).
pub const DEFAULT_DELAY_SECONDS: f32 = 0.18;
/// Step used by the console controls for delay changes.
pub const DELAY_STEP_SECONDS: f32 = 0.01;

/// Lowest feedback gain.
pub const MIN_GAIN: f32 = 0.0;
/// Highest feedback gain.
pub const MAX_GAIN: f32 = 1.0;
/// Default feedback gain.
pub const DEFAULT_GAIN: f32 = 0.7;
/// Step used by the console controls for gain changes.
pub const GAIN_STEP: f32 = 0.05;

/// Range for randomized delays, in seconds.
pub const RANDOM_DELAY_RANGE: (f32, f32) = (0.18, 0.22);

/// Default callback block size in frames.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;
/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: u32 = 64;
/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: u32 = 4096;

/// Parameters of the delay line.
///
/// Constructors and setters clamp into the supported ranges, so a
/// `DelayConfig` held by a session is always valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayConfig {
    delay_seconds: f32,
    feedback_gain: f32,
    /// Negate the delayed signal before playback.
    pub invert_phase: bool,
    /// Clamp output samples to [-1.0, 1.0].
    ///
    /// Off by default: the engine never limits unless asked to.
    pub clip_output: bool,
}

impl DelayConfig {
    /// Creates a config, clamping delay and gain into range.
    #[must_use]
    pub fn new(delay_seconds: f32, feedback_gain: f32) -> Self {
        Self {
            delay_seconds: clamp_delay(delay_seconds),
            feedback_gain: clamp_gain(feedback_gain),
            invert_phase: false,
            clip_output: false,
        }
    }

    /// Delay interval in seconds.
    #[must_use]
    pub fn delay_seconds(&self) -> f32 {
        self.delay_seconds
    }

    /// Feedback gain applied to the delayed signal.
    #[must_use]
    pub fn feedback_gain(&self) -> f32 {
        self.feedback_gain
    }

    /// Sets the delay, clamped to [`MIN_DELAY_SECONDS`]..=[`MAX_DELAY_SECONDS`].
    pub fn set_delay_seconds(&mut self, seconds: f32) {
        self.delay_seconds = clamp_delay(seconds);
    }

    /// Sets the gain, clamped to [`MIN_GAIN`]..=[`MAX_GAIN`].
    pub fn set_feedback_gain(&mut self, gain: f32) {
        self.feedback_gain = clamp_gain(gain);
    }

    /// Builder-style phase inversion toggle.
    #[must_use]
    pub fn with_invert_phase(mut self, invert: bool) -> Self {
        self.invert_phase = invert;
        self
    }

    /// Builder-style output clipping toggle.
    #[must_use]
    pub fn with_clip_output(mut self, clip: bool) -> Self {
        self.clip_output = clip;
        self
    }

    /// Delay expressed in frames at the given sample rate (at least one).
    #[must_use]
    pub fn delay_frames(&self, sample_rate: u32) -> usize {
        delay_frames(self.delay_seconds, sample_rate)
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_SECONDS, DEFAULT_GAIN)
    }
}

/// Stream-level configuration.
///
/// # Example
///
/// ```
/// use speech_jammer::{DelayConfig, JammerConfig};
///
/// let config = JammerConfig {
///     delay: DelayConfig::new(0.2, 0.8),
///     block_size: 256,
///     ..Default::default()
/// };
/// assert_eq!(config.block_size(), 256);
/// ```
#[derive(Debug, Clone)]
pub struct JammerConfig {
    /// Delay line parameters.
    pub delay: DelayConfig,

    /// Frames per callback block.
    ///
    /// Smaller blocks reduce latency, larger blocks are more robust on
    /// Bluetooth outputs. Fixed for the lifetime of a stream.
    /// Default: 512
    pub block_size: u32,

    /// Capacity of the queue between the capture and playback callbacks.
    ///
    /// Absorbs scheduling jitter between the two device callbacks. When it
    /// is full, newly captured frames are dropped and counted.
    /// Default: 200ms
    pub capture_queue: Duration,
}

impl JammerConfig {
    /// Block size clamped to [`MIN_BLOCK_SIZE`]..=[`MAX_BLOCK_SIZE`].
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }

    /// Capture queue capacity in frames, never smaller than two blocks.
    #[must_use]
    pub fn capture_queue_frames(&self, sample_rate: u32) -> usize {
        let frames = (f64::from(sample_rate) * self.capture_queue.as_secs_f64()) as usize;
        frames.max(self.block_size() as usize * 2)
    }
}

impl Default for JammerConfig {
    fn default() -> Self {
        Self {
            delay: DelayConfig::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            capture_queue: Duration::from_millis(200),
        }
    }
}

/// Number of frames in `seconds` at `sample_rate`, rounded, minimum one.
#[must_use]
pub fn delay_frames(seconds: f32, sample_rate: u32) -> usize {
    let frames = (f64::from(seconds) * f64::from(sample_rate)).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

/// Picks a uniformly random delay from [`RANDOM_DELAY_RANGE`].
#[must_use]
pub fn random_delay_seconds() -> f32 {
    let (low, high) = RANDOM_DELAY_RANGE;
    low + fastrand::f32() * (high - low)
}

fn clamp_delay(seconds: f32) -> f32 {
    if seconds.is_nan() {
        return DEFAULT_DELAY_SECONDS;
    }
    seconds.clamp(MIN_DELAY_SECONDS, MAX_DELAY_SECONDS)
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return DEFAULT_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_config_defaults() {
        let config = DelayConfig::default();
        assert_eq!(config.delay_seconds(), DEFAULT_DELAY_SECONDS);
        assert_eq!(config.feedback_gain(), DEFAULT_GAIN);
        assert!(!config.invert_phase);
        assert!(!config.clip_output);
    }

    #[test]
    fn test_delay_config_clamps() {
        let config = DelayConfig::new(2.0, -0.5);
        assert_eq!(config.delay_seconds(), MAX_DELAY_SECONDS);
        assert_eq!(config.feedback_gain(), MIN_GAIN);

        let config = DelayConfig::new(0.001, 3.0);
        assert_eq!(config.delay_seconds(), MIN_DELAY_SECONDS);
        assert_eq!(config.feedback_gain(), MAX_GAIN);
    }

    #[test]
    fn test_delay_config_nan_falls_back() {
        let config = DelayConfig::new(f32::NAN, f32::NAN);
        assert_eq!(config.delay_seconds(), DEFAULT_DELAY_SECONDS);
        assert_eq!(config.feedback_gain(), DEFAULT_GAIN);
    }

    #[test]
    fn test_delay_frames_rounds() {
        assert_eq!(delay_frames(0.18, 44100), 7938);
        assert_eq!(delay_frames(0.1, 48000), 4800);
        // 0.00001s at 44.1kHz is 0.441 frames, rounds to 0, floored at 1
        assert_eq!(delay_frames(0.000_01, 44100), 1);
    }

    #[test]
    fn test_jammer_config_defaults() {
        let config = JammerConfig::default();
        assert_eq!(config.block_size(), DEFAULT_BLOCK_SIZE);
        assert_eq!(config.capture_queue, Duration::from_millis(200));
        assert_eq!(config.capture_queue_frames(48000), 9600);
    }

    #[test]
    fn test_block_size_clamped() {
        let config = JammerConfig {
            block_size: 8,
            ..Default::default()
        };
        assert_eq!(config.block_size(), MIN_BLOCK_SIZE);
    }

    #[test]
    fn test_capture_queue_at_least_two_blocks() {
        let config = JammerConfig {
            capture_queue: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.capture_queue_frames(44100), 1024);
    }

    #[test]
    fn test_random_delay_in_range() {
        for _ in 0..100 {
            let delay = random_delay_seconds();
            assert!((RANDOM_DELAY_RANGE.0..=RANDOM_DELAY_RANGE.1).contains(&delay));
        }
    }
}
