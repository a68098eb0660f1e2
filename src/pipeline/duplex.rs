//! Capture/playback bridge.
//!
//! Platform hosts deliver capture and playback as two independent callbacks.
//! The bridge connects them through a lock-free SPSC queue:
//!
//! ```text
//! capture callback → CaptureHalf (adapt channels) → queue → RenderHalf (delay) → playback callback
//! ```
//!
//! Neither half blocks, allocates, or logs once constructed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::format::ChannelMapping;
use crate::pipeline::DelayEngine;

/// Counters written by the audio callbacks and read by the control thread.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Frames rendered through the delay engine.
    pub frames_processed: AtomicU64,
    /// Playback blocks that ran short of captured frames.
    pub underruns: AtomicU64,
    /// Captured frames discarded because the queue was full or the
    /// backlog was trimmed.
    pub dropped_frames: AtomicU64,
    /// Errors reported by the driver's error callback.
    pub stream_errors: AtomicU64,
    /// Set once the first captured frame reaches the queue.
    pub capture_started: AtomicBool,
}

impl StreamStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }
}

/// The capture-side callback state.
pub struct CaptureHalf {
    producer: HeapProd<f32>,
    mapping: ChannelMapping,
    frame: Vec<f32>,
    stats: Arc<StreamStats>,
}

impl CaptureHalf {
    /// Adapts an interleaved capture block and queues it for playback.
    ///
    /// A trailing partial frame is ignored. Frames that do not fit in the
    /// queue are dropped and counted rather than waited on.
    pub fn push_block(&mut self, data: &[f32]) {
        let source = self.mapping.source_channels().max(1);
        let mut dropped = 0u64;
        let mut pushed = false;

        for input in data.chunks_exact(source) {
            self.mapping.apply(input, &mut self.frame);
            if self.producer.vacant_len() < self.frame.len() {
                dropped += 1;
                continue;
            }
            self.producer.push_slice(&self.frame);
            pushed = true;
        }

        if dropped > 0 {
            self.stats
                .dropped_frames
                .fetch_add(dropped, Ordering::Relaxed);
        }
        if pushed && !self.stats.capture_started.load(Ordering::Relaxed) {
            self.stats.capture_started.store(true, Ordering::Release);
        }
    }

    /// Channels expected per captured frame.
    pub fn source_channels(&self) -> usize {
        self.mapping.source_channels()
    }
}

/// The playback-side callback state.
pub struct RenderHalf {
    consumer: HeapCons<f32>,
    engine: Arc<Mutex<DelayEngine>>,
    frame: Vec<f32>,
    stats: Arc<StreamStats>,
}

impl RenderHalf {
    /// Fills an interleaved playback block with delayed audio.
    ///
    /// Each output frame consumes one captured frame. When the queue runs
    /// dry, silence is fed into the delay line in its place so the delay
    /// stays locked to wall-clock time, and the block counts as an underrun
    /// once capture has started. If the engine is unavailable (only
    /// possible while the session is reconfiguring) the block is silent.
    ///
    /// A backlog of two blocks or more is trimmed to the newest block before
    /// rendering, so capture running ahead of playback never adds latency
    /// on top of the delay line. Trimmed frames count as dropped.
    pub fn render_block(&mut self, data: &mut [f32]) {
        let channels = self.frame.len().max(1);

        let Some(mut engine) = self.engine.try_lock() else {
            data.fill(0.0);
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let needed = data.len() / channels;
        let queued = self.consumer.occupied_len() / channels;
        if needed > 0 && queued >= needed * 2 {
            let stale = queued - needed;
            let skipped = self.consumer.skip(stale * channels) / channels;
            self.stats
                .dropped_frames
                .fetch_add(skipped as u64, Ordering::Relaxed);
        }

        let mut starved = false;
        let mut frames = 0u64;
        for output in data.chunks_exact_mut(channels) {
            if self.consumer.occupied_len() >= channels {
                self.consumer.pop_slice(&mut self.frame);
            } else {
                starved = true;
                self.frame.fill(0.0);
            }
            engine.process_frame(&self.frame, output);
            frames += 1;
        }
        drop(engine);

        let tail = data.len() - data.len() % channels;
        data[tail..].fill(0.0);

        self.stats
            .frames_processed
            .fetch_add(frames, Ordering::Relaxed);
        if starved && self.stats.capture_started.load(Ordering::Acquire) {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Channels written per playback frame.
    pub fn target_channels(&self) -> usize {
        self.frame.len()
    }
}

/// Builds the two callback halves around a shared engine.
///
/// `queue_frames` sizes the SPSC queue between them. The engine must
/// already be configured for `mapping.target_channels()` channels.
pub fn duplex_pair(
    engine: Arc<Mutex<DelayEngine>>,
    mapping: ChannelMapping,
    queue_frames: usize,
    stats: Arc<StreamStats>,
) -> (CaptureHalf, RenderHalf) {
    let target = mapping.target_channels().max(1);
    let queue = HeapRb::<f32>::new(queue_frames.max(1) * target);
    let (producer, consumer) = queue.split();

    let capture = CaptureHalf {
        producer,
        mapping,
        frame: vec![0.0; target],
        stats: Arc::clone(&stats),
    };
    let render = RenderHalf {
        consumer,
        engine,
        frame: vec![0.0; target],
        stats,
    };
    (capture, render)
}
