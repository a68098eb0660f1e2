//! Channel layout conversion.
//!
//! Capture devices and playback devices rarely agree on channel counts
//! (built-in microphone arrays, mono headsets, stereo Bluetooth buds). This
//! module folds any input layout into the playback layout:
//! - Same width passes through
//! - Mono duplicates into stereo
//! - Quad averages down to a duplicated stereo mean
//! - Anything else truncates or zero-pads positionally

mod channels;

pub use channels::{adapt, ChannelMapping};
