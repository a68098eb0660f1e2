//! Real-time audio pipeline.
//!
//! ```text
//! Capture Callback → CaptureHalf → SPSC Queue → RenderHalf → DelayEngine → Playback Callback
//! ```
//!
//! - **RingBuffer**: Fixed-capacity frame store holding one delay interval
//! - **DelayEngine**: Per-frame delay, gain and optional phase inversion
//! - **Duplex bridge**: Lock-free queue joining the two device callbacks
//!
//! Everything here runs on the audio threads and never blocks.

mod delay;
mod duplex;
mod ring_buffer;

pub use delay::DelayEngine;
pub use duplex::{duplex_pair, CaptureHalf, RenderHalf, StreamStats};
pub use ring_buffer::RingBuffer;
