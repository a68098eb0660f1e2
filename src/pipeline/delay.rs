//! The delay line driven by the playback callback.

use crate::config::DelayConfig;
use crate::pipeline::RingBuffer;

/// Delays every frame by exactly one buffer capacity and scales it.
///
/// The engine holds a zero-filled [`RingBuffer`] of `C` frames where
/// `C = round(delay_seconds * sample_rate)`. Each step reads the slot under
/// the write cursor (the frame written `C` steps ago) before overwriting it,
/// so the first `C` outputs are silence and output `n` is `input[n - C]`
/// scaled by the gain.
///
/// The engine does no synchronization of its own. Configuration changes go
/// through [`configure`](Self::configure), which the session only calls
/// while no stream is running.
#[derive(Debug)]
pub struct DelayEngine {
    ring: RingBuffer,
    write_cursor: usize,
    config: DelayConfig,
    gain: f32,
    sample_rate: u32,
}

impl DelayEngine {
    /// Creates an engine with a freshly allocated delay line.
    pub fn new(config: DelayConfig, channels: u16, sample_rate: u32) -> Self {
        let mut engine = Self {
            ring: RingBuffer::new(1, 1),
            write_cursor: 0,
            config,
            gain: 0.0,
            sample_rate,
        };
        engine.configure(config, channels, sample_rate);
        engine
    }

    /// Rebuilds the delay line for new parameters.
    ///
    /// Allocates a new zero-filled buffer and resets the cursor, so no audio
    /// captured under the previous configuration is ever played back.
    pub fn configure(&mut self, config: DelayConfig, channels: u16, sample_rate: u32) {
        let capacity = config.delay_frames(sample_rate);
        self.ring = RingBuffer::new(capacity, usize::from(channels));
        self.write_cursor = 0;
        self.config = config;
        self.gain = if config.invert_phase {
            -config.feedback_gain()
        } else {
            config.feedback_gain()
        };
        self.sample_rate = sample_rate;

        tracing::debug!(
            delay_frames = capacity,
            channels,
            sample_rate,
            gain = self.gain,
            "delay line configured"
        );
    }

    /// Creates an engine with an unclamped multiplier.
    ///
    /// `gain` replaces the config's feedback gain as given, so values above
    /// 1.0 amplify. Phase inversion still negates it. The override lasts
    /// until the next [`configure`](Self::configure).
    pub fn with_raw_gain(config: DelayConfig, gain: f32, channels: u16, sample_rate: u32) -> Self {
        let mut engine = Self::new(config, channels, sample_rate);
        engine.gain = if config.invert_phase { -gain } else { gain };
        engine
    }

    /// Runs one frame through the delay line.
    ///
    /// `input` is stored for playback `C` frames from now; `output` receives
    /// the frame stored `C` frames ago, scaled. Bounded time, no allocation.
    #[inline]
    pub fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
        // (write_cursor - C) mod C == write_cursor
        let read_index = self.write_cursor;
        let delayed = self.ring.read(read_index);

        for (out, &sample) in output.iter_mut().zip(delayed) {
            *out = sample * self.gain;
        }
        if self.config.clip_output {
            for out in output.iter_mut() {
                *out = out.clamp(-1.0, 1.0);
            }
        }
        if output.len() > delayed.len() {
            output[delayed.len()..].fill(0.0);
        }

        self.ring.write(input, self.write_cursor);
        self.write_cursor = (self.write_cursor + 1) % self.ring.capacity();
    }

    /// Runs an interleaved block through the delay line.
    ///
    /// Both slices hold whole frames of [`channels`](Self::channels)
    /// samples; a trailing partial frame in `output` is zero-filled.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let channels = self.channels();
        let mut out_frames = output.chunks_exact_mut(channels);
        for (in_frame, out_frame) in input.chunks_exact(channels).zip(&mut out_frames) {
            self.process_frame(in_frame, out_frame);
        }
        for out_frame in out_frames {
            out_frame.fill(0.0);
        }
        let tail_start = output.len() - output.len() % channels;
        output[tail_start..].fill(0.0);
    }

    /// Delay line length in frames.
    pub fn delay_frames(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples per frame.
    pub fn channels(&self) -> usize {
        self.ring.channels()
    }

    /// Sample rate the delay line was sized for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Parameters of the last [`configure`](Self::configure).
    pub fn config(&self) -> &DelayConfig {
        &self.config
    }

    /// Effective multiplier, negative when the phase is inverted.
    pub fn gain(&self) -> f32 {
        self.gain
    }
}
