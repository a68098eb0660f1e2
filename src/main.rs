//! Console front end: plays the microphone back through headphones with a
//! short delay.
//!
//! Run with: `cargo run -- --delay-ms 200 --prefer "airpods"`
//!
//! Type a command and press enter (`enter` toggles, `q` quits). Set
//! `RUST_LOG=speech_jammer=debug` for stream diagnostics.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use speech_jammer::control::{self, Command, Flow};
use speech_jammer::device::{select_output_device, DEFAULT_PREFERRED_KEYWORDS};
use speech_jammer::{list_devices, DelayConfig, DeviceSelection, SpeechJammer};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL: Duration = Duration::from_millis(500);
const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Parser, Clone)]
#[command(name = "speech-jammer")]
#[command(about = "Delayed auditory feedback through your headphones")]
struct Cli {
    /// List audio devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Capture device index (see --list-devices).
    #[arg(long)]
    input_device: Option<usize>,

    /// Playback device index (see --list-devices). Overrides --prefer.
    #[arg(long)]
    output_device: Option<usize>,

    /// Prefer an output device whose name contains this keyword.
    /// Repeatable. Defaults to common headphone brands.
    #[arg(long = "prefer", value_name = "KEYWORD")]
    prefer: Vec<String>,

    /// Delay in milliseconds (50-500).
    #[arg(long, default_value_t = 180.0)]
    delay_ms: f32,

    /// Feedback gain (0.0-1.0).
    #[arg(long, default_value_t = 0.7)]
    gain: f32,

    /// Invert the phase of the delayed signal.
    #[arg(long)]
    invert_phase: bool,

    /// Clamp output samples to [-1, 1].
    #[arg(long)]
    clip: bool,

    /// Frames per audio callback.
    #[arg(long, default_value_t = 512)]
    block_size: u32,

    /// Wait for a toggle command instead of starting immediately.
    #[arg(long)]
    no_autostart: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        print_devices()?;
        return Ok(());
    }

    let delay = DelayConfig::new(cli.delay_ms / 1000.0, cli.gain)
        .with_invert_phase(cli.invert_phase)
        .with_clip_output(cli.clip);

    let mut session = SpeechJammer::builder()
        .input_device(
            cli.input_device
                .map_or(DeviceSelection::SystemDefault, DeviceSelection::Index),
        )
        .output_device(choose_output(&cli))
        .delay(delay)
        .block_size(cli.block_size)
        .on_event(|e| tracing::debug!(?e, "jammer event"))
        .build();

    println!("{}", control::HELP);

    if !cli.no_autostart {
        if let Err(e) = session.start() {
            tracing::error!(error = %e, "could not start, press enter to retry");
        }
    }

    let (command_tx, mut command_rx) = mpsc::channel::<Command>(COMMAND_QUEUE);
    // Detached: a pending stdin read must not hold up exit
    std::thread::Builder::new()
        .name("speech-jammer-stdin".to_string())
        .spawn(move || control::forward_commands(std::io::stdin().lock(), command_tx))?;

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(command) = command_rx.recv() => {
                match control::apply(&mut session, command) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => println!("{}", session.status()),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            _ = ticker.tick() => {
                if session.is_running() {
                    let status = session.status();
                    eprint!("\r{status}  ");
                    let _ = std::io::stderr().flush();
                    if let Some(report) = status.underrun_report() {
                        tracing::debug!(%report, "underruns so far");
                    }
                }
            }
            () = &mut shutdown => {
                println!();
                break;
            }
        }
    }

    session.stop();
    println!("{}", session.status());
    Ok(())
}

/// Completes on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Resolves the playback device: explicit index, then keyword match, then
/// the system default.
fn choose_output(cli: &Cli) -> DeviceSelection {
    if let Some(index) = cli.output_device {
        return DeviceSelection::Index(index);
    }

    let devices = match list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!(error = %e, "cannot enumerate devices, using system default");
            return DeviceSelection::SystemDefault;
        }
    };

    let chosen = if cli.prefer.is_empty() {
        select_output_device(&devices, DEFAULT_PREFERRED_KEYWORDS)
    } else {
        select_output_device(&devices, cli.prefer.as_slice())
    };

    match chosen {
        Some(device) => {
            tracing::info!(index = device.index, name = %device.name, "using preferred output");
            DeviceSelection::Index(device.index)
        }
        None => DeviceSelection::SystemDefault,
    }
}

fn print_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found");
        return Ok(());
    }
    println!("{:>3}  {:<40} {:>4} {:>4} {:>7}", "#", "name", "in", "out", "rate");
    for device in devices {
        println!(
            "{:>3}  {:<40} {:>4} {:>4} {:>7}",
            device.index,
            device.name,
            device.max_input_channels,
            device.max_output_channels,
            device.default_sample_rate
        );
    }
    Ok(())
}
