//! # speech-jammer
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time delayed auditory feedback.
//!
//! `speech-jammer` captures the microphone via CPAL and plays it back through
//! headphones after a short, configurable delay (50-500ms). Hearing your own
//! voice about 200ms late disrupts fluent speech.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use speech_jammer::{DelayConfig, SpeechJammer};
//!
//! let mut session = SpeechJammer::builder()
//!     .delay(DelayConfig::new(0.18, 0.7))
//!     .on_event(|e| tracing::info!(?e, "jammer event"))
//!     .build();
//!
//! session.start()?;
//! // ... speak ...
//! session.set_delay(0.22)?;
//! println!("{}", session.status());
//! session.stop();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Capture callback**: folds device channels to the output width and
//!   pushes frames into a lock-free SPSC queue
//! - **Playback callback**: pulls frames through the [`DelayEngine`] and
//!   writes the delayed, scaled signal to the device
//! - **Control thread**: owns the [`AudioSession`]; every parameter change
//!   stops the stream, rebuilds the engine and restarts
//!
//! Neither callback allocates, logs or blocks.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
pub mod config;
pub mod control;
pub mod device;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod session;

pub use builder::{SpeechJammer, SpeechJammerBuilder};
pub use config::{DelayConfig, JammerConfig};
pub use device::{
    list_devices, AudioBackend, CpalBackend, DeviceInfo, DeviceSelection, DeviceSpec, MockBackend,
    MockHandle,
};
pub use error::AudioError;
pub use event::{event_callback, EventCallback, JammerEvent};
pub use format::{adapt, ChannelMapping};
pub use pipeline::{DelayEngine, RingBuffer};
pub use session::{AudioSession, SessionState, Status};
