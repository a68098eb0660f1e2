//! Console commands for driving a session interactively.

use std::io::BufRead;
use std::str::FromStr;

use tokio::sync::mpsc;

use crate::config::{DELAY_STEP_SECONDS, GAIN_STEP};
use crate::session::AudioSession;
use crate::AudioError;

/// Lowest gain reachable by stepping down from the console.
pub const CONSOLE_MIN_GAIN: f32 = 0.1;

/// A single console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start if idle, stop if running.
    Toggle,
    /// Lengthen the delay by one step.
    DelayUp,
    /// Shorten the delay by one step.
    DelayDown,
    /// Raise the gain by one step.
    GainUp,
    /// Lower the gain by one step.
    GainDown,
    /// Pick a random delay in the disruptive range.
    RandomDelay,
    /// Flip phase inversion.
    InvertPhase,
    /// Print the current status.
    Status,
    /// Stop and exit.
    Quit,
}

/// A console line that names no command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parses one line of console input.
    ///
    /// Accepts short keys (`t`, `r`, `i`, `s`, `q`), words (`up`, `left`,
    /// `quit`, ...) and raw arrow-key escape sequences. An empty line
    /// toggles, like a bare space bar press.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_matches(|c| c == '\r' || c == '\n');

        let command = match line {
            "\x1b[A" => Self::DelayUp,
            "\x1b[B" => Self::DelayDown,
            "\x1b[C" => Self::GainUp,
            "\x1b[D" => Self::GainDown,
            "\x1b" => Self::Quit,
            _ => match line.trim().to_lowercase().as_str() {
                "" | "t" | "toggle" | "space" => Self::Toggle,
                "up" | "u" | "+" => Self::DelayUp,
                "down" | "d" | "-" => Self::DelayDown,
                "right" | ">" => Self::GainUp,
                "left" | "<" => Self::GainDown,
                "r" | "random" => Self::RandomDelay,
                "i" | "invert" => Self::InvertPhase,
                "s" | "status" => Self::Status,
                "q" | "quit" | "exit" | "esc" => Self::Quit,
                other => return Err(UnknownCommand(other.to_string())),
            },
        };
        Ok(command)
    }
}

/// What the console loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands.
    Continue,
    /// Leave the loop.
    Quit,
}

/// Applies a command to a session.
///
/// Delay and gain steps restart a running stream. `Quit` stops the session
/// before returning [`Flow::Quit`].
///
/// # Errors
///
/// Returns `DeviceUnavailable` if a start or restart fails. The session is
/// left idle in that case.
pub fn apply(session: &mut AudioSession, command: Command) -> Result<Flow, AudioError> {
    let delay = session.delay_config();

    match command {
        Command::Toggle => {
            if session.is_running() {
                session.stop();
            } else {
                session.start()?;
            }
        }
        Command::DelayUp => session.set_delay(delay.delay_seconds() + DELAY_STEP_SECONDS)?,
        Command::DelayDown => session.set_delay(delay.delay_seconds() - DELAY_STEP_SECONDS)?,
        Command::GainUp => session.set_gain(delay.feedback_gain() + GAIN_STEP)?,
        Command::GainDown => {
            let gain = delay.feedback_gain();
            session.set_gain((gain - GAIN_STEP).max(CONSOLE_MIN_GAIN.min(gain)))?;
        }
        Command::RandomDelay => {
            let seconds = session.randomize_delay()?;
            tracing::debug!(delay_ms = seconds * 1000.0, "randomized delay");
        }
        Command::InvertPhase => session.set_invert_phase(!delay.invert_phase)?,
        Command::Status => {}
        Command::Quit => {
            session.stop();
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}

/// Reads console lines and queues the commands they name.
///
/// Blocks on `reader`; run it on a dedicated thread, never on the async
/// runtime. Unknown lines are logged and skipped. End of input queues
/// [`Command::Quit`]. Returns early once the receiver is gone.
pub fn forward_commands<R: BufRead>(reader: R, commands: mpsc::Sender<Command>) {
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        match line.parse::<Command>() {
            Ok(command) => {
                if commands.blocking_send(command).is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %e, "{}", HELP),
        }
    }
    let _ = commands.blocking_send(Command::Quit);
}

/// One-line help for the console.
pub const HELP: &str = "enter/t: start-stop | up/down: delay 10ms | right/left: gain | \
                        r: random delay | i: invert phase | s: status | q: quit";
