//! Discrete commands consumed by the detection loop.

use crate::calibration::Adjustment;
use crossbeam_channel::{Receiver, Sender};
use std::str::FromStr;

/// Events pushed by an external command source (hotkeys, stdin, tests).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    AdjustLeft,
    AdjustRight,
    AdjustUp,
    AdjustDown,
    ToggleMonitoring,
    /// Grab the capture region and store it under this name.
    CaptureReference(String),
    ReloadReferences,
    Stop,
}

impl Command {
    /// The calibration step carried by an adjust command.
    pub fn adjustment(&self) -> Option<Adjustment> {
        match self {
            Command::AdjustLeft => Some(Adjustment::Left),
            Command::AdjustRight => Some(Adjustment::Right),
            Command::AdjustUp => Some(Adjustment::Up),
            Command::AdjustDown => Some(Adjustment::Down),
            _ => None,
        }
    }
}

/// Error for unrecognized command text.
#[derive(Debug, thiserror::Error)]
#[error("unknown command '{0}'")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    /// Parses the line protocol used by the CLI: `left`, `right`, `up`,
    /// `down`, `toggle`, `capture <name>`, `reload`, `quit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let command = match word.to_ascii_lowercase().as_str() {
            "left" => Command::AdjustLeft,
            "right" => Command::AdjustRight,
            "up" => Command::AdjustUp,
            "down" => Command::AdjustDown,
            "toggle" => Command::ToggleMonitoring,
            "capture" => Command::CaptureReference(rest.trim().to_string()),
            "reload" => Command::ReloadReferences,
            "quit" | "stop" | "exit" => Command::Stop,
            _ => return Err(ParseCommandError(line.to_string())),
        };
        Ok(command)
    }
}

/// Cloneable sending side of the command channel.
#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: Sender<Command>,
}

impl CommandSender {
    /// Queues `command`; returns false once the loop is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }
}

/// Creates an unbounded command channel.
pub fn channel() -> (CommandSender, Receiver<Command>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CommandSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::Command;
    use crate::calibration::Adjustment;

    #[test]
    fn parses_line_protocol() {
        assert_eq!("left".parse::<Command>().unwrap(), Command::AdjustLeft);
        assert_eq!(" Toggle ".parse::<Command>().unwrap(), Command::ToggleMonitoring);
        assert_eq!(
            "capture  rocket launcher".parse::<Command>().unwrap(),
            Command::CaptureReference("rocket launcher".to_string())
        );
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Stop);
        assert!("jump".parse::<Command>().is_err());
    }

    #[test]
    fn only_adjust_commands_carry_adjustments() {
        assert_eq!(Command::AdjustDown.adjustment(), Some(Adjustment::Down));
        assert_eq!(Command::ReloadReferences.adjustment(), None);
    }
}
