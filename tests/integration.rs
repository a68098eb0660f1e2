//! Integration tests for speech-jammer.
//!
//! Sessions are driven through `MockBackend`, which runs the real capture
//! and render halves on a plain thread. Tests that require actual audio
//! hardware are marked with `#[ignore]` and should be run manually.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use speech_jammer::{
    AudioError, AudioSession, DelayConfig, DeviceInfo, JammerConfig, JammerEvent, MockBackend,
    MockHandle, SessionState, SpeechJammer,
};

const SAMPLE_RATE: u32 = 1000;
const BLOCK: usize = 64;

fn config(delay_seconds: f32, gain: f32) -> JammerConfig {
    JammerConfig {
        delay: DelayConfig::new(delay_seconds, gain),
        block_size: BLOCK as u32,
        ..Default::default()
    }
}

fn ramp(frame: u64) -> f32 {
    (frame % 100) as f32 / 100.0 + 0.01
}

fn wait_for_blocks(handle: &MockHandle, blocks: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.blocks() < blocks {
        assert!(Instant::now() < deadline, "mock stream stalled");
        thread::sleep(Duration::from_millis(1));
    }
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-6
}

fn collect_events(session: speech_jammer::SpeechJammerBuilder) -> (AudioSession, Arc<Mutex<Vec<JammerEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let session = session
        .on_event(move |e| sink.lock().unwrap().push(e))
        .build();
    (session, events)
}

#[test]
fn test_output_is_input_delayed_and_scaled() {
    let backend = MockBackend::new(SAMPLE_RATE).with_signal(ramp);
    let handle = backend.handle();
    let mut session = SpeechJammer::builder()
        .backend(backend)
        .with_config(config(0.05, 0.5))
        .build();

    session.start().unwrap();
    wait_for_blocks(&handle, 4);
    session.stop();

    let output = handle.output();
    let delay = 50;
    assert!(output.len() >= 4 * BLOCK * 2);
    for (n, frame) in output.chunks_exact(2).enumerate() {
        let expected = if n < delay {
            0.0
        } else {
            ramp((n - delay) as u64) * 0.5
        };
        assert!(approx(frame[0], expected), "frame {n}: {} != {expected}", frame[0]);
        assert!(approx(frame[1], expected), "frame {n}: {} != {expected}", frame[1]);
    }
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let backend = MockBackend::new(SAMPLE_RATE);
    let handle = backend.handle();
    let (mut session, events) = collect_events(
        SpeechJammer::builder()
            .backend(backend)
            .with_config(config(0.1, 0.7)),
    );

    session.stop();
    session.start().unwrap();
    session.start().unwrap();
    assert_eq!(handle.opens(), 1);
    assert_eq!(session.state(), SessionState::Running);

    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!handle.is_streaming());

    let events = events.lock().unwrap();
    let started = events
        .iter()
        .filter(|e| matches!(e, JammerEvent::Started { .. }))
        .count();
    let stopped = events
        .iter()
        .filter(|e| matches!(e, JammerEvent::Stopped))
        .count();
    assert_eq!(started, 1);
    assert_eq!(stopped, 1);
}

#[test]
fn test_failed_start_leaves_session_idle() {
    let backend = MockBackend::new(SAMPLE_RATE).failing("exclusive mode in use");
    let handle = backend.handle();
    let mut session = SpeechJammer::builder().backend(backend).build();

    let err = session.start().unwrap_err();
    assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(handle.opens(), 0);
    assert!(!session.status().running);
}

#[test]
fn test_missing_device_is_unavailable() {
    let backend = MockBackend::new(SAMPLE_RATE).with_devices(vec![DeviceInfo {
        index: 0,
        name: "Speakers".to_string(),
        max_input_channels: 0,
        max_output_channels: 2,
        default_sample_rate: SAMPLE_RATE,
    }]);
    let mut session = SpeechJammer::builder().backend(backend).build();

    let err = session.start().unwrap_err();
    assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
    assert!(!session.is_running());
}

#[test]
fn test_reconfigure_discards_history() {
    let backend = MockBackend::new(SAMPLE_RATE);
    let handle = backend.handle();
    let mut session = SpeechJammer::builder()
        .backend(backend)
        .with_config(config(0.05, 1.0))
        .build();

    session.start().unwrap();
    wait_for_blocks(&handle, 3);

    session.reconfigure(0.1, 0.5).unwrap();
    assert!(session.is_running());
    assert_eq!(handle.opens(), 2);

    let before = handle.blocks();
    wait_for_blocks(&handle, before + 3);
    session.stop();

    let output = handle.output();
    let new_delay = 100;
    // Nothing captured before the restart may leak into the new stream
    assert!(output[..new_delay * 2].iter().all(|&s| s == 0.0));
    assert!(output[new_delay * 2..].iter().all(|&s| approx(s, 0.25)));

    let status = session.status();
    assert!(approx(status.delay_seconds, 0.1));
    assert!(approx(status.gain, 0.5));
    assert_eq!(status.delay_frames, Some(new_delay));
}

#[test]
fn test_stop_from_another_thread() {
    let backend = MockBackend::new(SAMPLE_RATE);
    let handle = backend.handle();
    let session = SpeechJammer::builder()
        .backend(backend)
        .with_config(config(0.05, 0.8))
        .build();
    let session = Arc::new(Mutex::new(session));

    session.lock().unwrap().start().unwrap();
    wait_for_blocks(&handle, 2);

    let remote = Arc::clone(&session);
    thread::spawn(move || remote.lock().unwrap().stop())
        .join()
        .unwrap();

    assert!(!handle.is_streaming());
    let blocks = handle.blocks();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.blocks(), blocks, "callbacks ran after stop returned");

    let mut session = session.lock().unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    // A restarted stream begins from a silent delay line
    session.start().unwrap();
    wait_for_blocks(&handle, blocks + 2);
    session.stop();
    let output = handle.output();
    assert!(output[..50 * 2].iter().all(|&s| s == 0.0));
    assert!(approx(output[50 * 2], 0.4));
}

#[test]
fn test_zero_gain_is_silent() {
    let backend = MockBackend::new(SAMPLE_RATE).with_signal(ramp);
    let handle = backend.handle();
    let mut session = SpeechJammer::builder()
        .backend(backend)
        .with_config(config(0.05, 0.0))
        .build();

    session.start().unwrap();
    wait_for_blocks(&handle, 3);
    session.stop();

    let output = handle.output();
    assert!(!output.is_empty());
    assert!(output.iter().all(|&s| s == 0.0));
}

#[test]
fn test_invert_phase_negates_output() {
    let backend = MockBackend::new(SAMPLE_RATE);
    let handle = backend.handle();
    let mut session = SpeechJammer::builder()
        .backend(backend)
        .delay(DelayConfig::new(0.05, 1.0).with_invert_phase(true))
        .block_size(BLOCK as u32)
        .build();

    session.start().unwrap();
    wait_for_blocks(&handle, 2);
    session.stop();

    let output = handle.output();
    assert!(output[..100].iter().all(|&s| s == 0.0));
    assert!(output[100..].iter().all(|&s| approx(s, -0.5)));
}

#[test]
fn test_mono_microphone_fills_both_ears() {
    let backend = MockBackend::new(SAMPLE_RATE)
        .with_signal(ramp)
        .with_devices(vec![
            DeviceInfo {
                index: 0,
                name: "USB Mic".to_string(),
                max_input_channels: 1,
                max_output_channels: 0,
                default_sample_rate: 16000,
            },
            DeviceInfo {
                index: 1,
                name: "Headphones".to_string(),
                max_input_channels: 0,
                max_output_channels: 2,
                default_sample_rate: SAMPLE_RATE,
            },
        ]);
    let handle = backend.handle();
    let (mut session, events) = collect_events(
        SpeechJammer::builder()
            .backend(backend)
            .with_config(config(0.05, 1.0)),
    );

    session.start().unwrap();
    wait_for_blocks(&handle, 2);
    session.stop();

    let spec = handle.last_spec().unwrap();
    assert_eq!(spec.input_channels, 1);
    assert_eq!(spec.output_channels, 2);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);

    let output = handle.output();
    for frame in output.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
    assert!(approx(output[50 * 2], ramp(0)));

    assert!(events.lock().unwrap().contains(&JammerEvent::ChannelMismatch {
        input_channels: 1,
        output_channels: 2,
    }));
}

#[test]
fn test_status_tracks_stream() {
    let backend = MockBackend::new(SAMPLE_RATE);
    let handle = backend.handle();
    let mut session = SpeechJammer::builder()
        .backend(backend)
        .with_config(config(0.05, 0.6))
        .build();

    session.start().unwrap();
    wait_for_blocks(&handle, 3);
    assert!(session.status().running);
    session.stop();

    let status = session.status();
    assert!(!status.running);
    assert_eq!(status.frames_processed, handle.blocks() * BLOCK as u64);
    assert_eq!(status.underruns, 0);
    assert_eq!(status.dropped_frames, 0);
    assert_eq!(status.delay_frames, Some(50));
    assert!(status.underrun_report().is_none());
    assert_eq!(status.device, handle.last_spec());
}

#[test]
fn test_reconfigure_emits_event() {
    let (mut session, events) = collect_events(
        SpeechJammer::builder().backend(MockBackend::new(SAMPLE_RATE)),
    );

    session.set_invert_phase(true).unwrap();
    session.reconfigure(0.3, 0.9).unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events.last(),
        Some(&JammerEvent::Reconfigured {
            delay_seconds: 0.3,
            gain: 0.9,
            invert_phase: true,
        })
    );
}

#[test]
#[ignore = "requires audio hardware"]
fn test_real_duplex_stream() {
    let mut session = SpeechJammer::builder()
        .delay(DelayConfig::new(0.2, 0.5))
        .build();

    session.start().unwrap();
    thread::sleep(Duration::from_secs(1));
    let status = session.status();
    session.stop();

    println!("{status}");
    assert!(status.frames_processed > 0);
}
