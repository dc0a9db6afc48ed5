//! The serial command/telemetry protocol.
//!
//! One command per line, case-sensitive, newline-terminated; carriage
//! returns are ignored. Parsing produces a typed [`Command`] up front, so the
//! dispatcher (in `visualizer`) only ever sees well-formed instructions and
//! protocol behavior is testable without touching any animation state.
//!
//! Outbound traffic is one JSON object per line: a periodic
//! `{"ema":<value>}` telemetry frame and immediate `{"status":"<TOKEN>"}`
//! events.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, i32},
    combinator::{all_consuming, map, value},
    error::Error,
    sequence::{preceded, tuple},
    Finish, IResult,
};
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;

use crate::color::{clamp_group, Rgb};

/// Longest accepted command line, in bytes. A line that grows past this
/// without a terminator is discarded through its next newline.
pub const MAX_LINE_LEN: usize = 128;

/// A parsed host instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Restart the calibration procedure.
    Calibrate,
    /// Rebase the baseline to the current filtered value.
    Reset,
    /// Select the device group (already clamped to the palette range).
    Group(u8),
    /// Toggle simulation mode.
    ToggleSimulation,
    /// Inject a simulated filtered value (consumed while simulating).
    InjectEma(f32),
    /// Switch to the off mode.
    LedOff,
    /// Switch to the rainbow mode.
    LedRainbow,
    /// Switch to the pulse mode.
    LedPulse,
    /// Switch to the signal-driven mode.
    LedGsr,
    /// Switch to solid color with the given channels (clamped to 0..=255).
    LedColor(Rgb),
    /// Set global brightness (already clamped to 0..=255).
    Brightness(u8),
    /// Liveness check; answered with PONG.
    Ping,
}

/// Payload shape of the `{"ema":<float>}` injection command.
#[derive(Debug, Deserialize)]
struct EmaInjection {
    ema: f32,
}

fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn parse_color(s: &str) -> IResult<&str, Command> {
    map(
        preceded(
            tag("LED:COLOR:"),
            tuple((i32, preceded(char(','), i32), preceded(char(','), i32))),
        ),
        |(r, g, b)| Command::LedColor(Rgb::new(clamp_channel(r), clamp_channel(g), clamp_channel(b))),
    )(s)
}

fn parse_plain(s: &str) -> IResult<&str, Command> {
    alt((
        value(Command::Calibrate, tag("CALIBRATE")),
        value(Command::Reset, tag("RESET")),
        map(preceded(tag("GROUP:"), i32), |n| Command::Group(clamp_group(n))),
        value(Command::ToggleSimulation, tag("sim")),
        parse_color,
        value(Command::LedOff, tag("LED:OFF")),
        value(Command::LedRainbow, tag("LED:RAINBOW")),
        value(Command::LedPulse, tag("LED:PULSE")),
        value(Command::LedGsr, tag("LED:GSR")),
        map(preceded(tag("BRIGHTNESS:"), i32), |n| {
            Command::Brightness(n.clamp(0, 255) as u8)
        }),
        value(Command::Ping, tag("PING")),
    ))(s)
}

/// Why a line failed to parse as a command.
#[derive(Debug)]
pub enum CommandParseError {
    /// The line matched no known command shape.
    Syntax(Error<String>),
    /// The line looked like JSON but did not decode as an injection.
    Json(serde_json::Error),
}

impl Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandParseError::Syntax(e) => write!(f, "unrecognized command: {e}"),
            CommandParseError::Json(e) => write!(f, "bad injection payload: {e}"),
        }
    }
}

impl std::error::Error for CommandParseError {}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        if line.starts_with('{') {
            return match serde_json::from_str::<EmaInjection>(line) {
                Ok(payload) => Ok(Command::InjectEma(payload.ema)),
                Err(e) => Err(CommandParseError::Json(e)),
            };
        }
        match all_consuming(parse_plain)(line).finish() {
            Ok((_remaining, cmd)) => Ok(cmd),
            Err(Error { input, code }) => Err(CommandParseError::Syntax(Error {
                input: input.to_string(),
                code,
            })),
        }
    }
}

/// A discrete device-to-host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Startup complete, pipeline live.
    Ready,
    /// Calibration pass has begun.
    Calibrating,
    /// Calibration pass finished and a baseline exists.
    CalibrationComplete,
    /// Baseline rebased on host request.
    ResetComplete,
    /// Group index changed (carries the clamped value).
    GroupChanged(u8),
    /// Simulation mode turned on.
    SimulationOn,
    /// Simulation mode turned off.
    SimulationOff,
    /// Reply to PING.
    Pong,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ready => write!(f, "READY"),
            Status::Calibrating => write!(f, "CALIBRATING"),
            Status::CalibrationComplete => write!(f, "CALIBRATION_COMPLETE"),
            Status::ResetComplete => write!(f, "RESET_COMPLETE"),
            Status::GroupChanged(n) => write!(f, "GROUP_CHANGED_TO_{n}"),
            Status::SimulationOn => write!(f, "SIMULATION_ON"),
            Status::SimulationOff => write!(f, "SIMULATION_OFF"),
            Status::Pong => write!(f, "PONG"),
        }
    }
}

/// Formats a status event as a wire line (no terminator).
pub fn status_line(status: Status) -> String {
    format!("{{\"status\":\"{status}\"}}")
}

/// Formats the periodic filtered-value frame, fixed at two decimals.
pub fn telemetry_line(ema: f32) -> String {
    format!("{{\"ema\":{ema:.2}}}")
}

/// Accumulates serial bytes into complete command lines.
///
/// Carriage returns are dropped, a newline completes the line, and anything
/// longer than [`MAX_LINE_LEN`] is discarded up to its terminator so a
/// stream with no newline can never grow the buffer without bound.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
    overflowed: bool,
}

impl LineAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns a complete line when the terminator arrives.
    ///
    /// Overlong or non-UTF-8 lines yield `None` at their terminator and the
    /// assembler keeps going; bad input never wedges the stream.
    pub fn push_byte(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let overflowed = std::mem::take(&mut self.overflowed);
                let raw = std::mem::take(&mut self.buf);
                if overflowed {
                    return None;
                }
                String::from_utf8(raw).ok()
            }
            _ => {
                if self.buf.len() >= MAX_LINE_LEN {
                    self.overflowed = true;
                } else {
                    self.buf.push(byte);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_plain_command() {
        assert_eq!("CALIBRATE".parse::<Command>().unwrap(), Command::Calibrate);
        assert_eq!("RESET".parse::<Command>().unwrap(), Command::Reset);
        assert_eq!("sim".parse::<Command>().unwrap(), Command::ToggleSimulation);
        assert_eq!("LED:OFF".parse::<Command>().unwrap(), Command::LedOff);
        assert_eq!("LED:RAINBOW".parse::<Command>().unwrap(), Command::LedRainbow);
        assert_eq!("LED:PULSE".parse::<Command>().unwrap(), Command::LedPulse);
        assert_eq!("LED:GSR".parse::<Command>().unwrap(), Command::LedGsr);
        assert_eq!("PING".parse::<Command>().unwrap(), Command::Ping);
    }

    #[test]
    fn color_command_round_trips_channels() {
        assert_eq!(
            "LED:COLOR:10,20,30".parse::<Command>().unwrap(),
            Command::LedColor(Rgb::new(10, 20, 30))
        );
        // Out-of-range channels clamp instead of failing.
        assert_eq!(
            "LED:COLOR:300,-5,128".parse::<Command>().unwrap(),
            Command::LedColor(Rgb::new(255, 0, 128))
        );
    }

    #[test]
    fn brightness_clamps_at_parse_time() {
        assert_eq!(
            "BRIGHTNESS:999".parse::<Command>().unwrap(),
            Command::Brightness(255)
        );
        assert_eq!(
            "BRIGHTNESS:-5".parse::<Command>().unwrap(),
            Command::Brightness(0)
        );
    }

    #[test]
    fn group_clamps_to_palette_range() {
        assert_eq!("GROUP:7".parse::<Command>().unwrap(), Command::Group(5));
        assert_eq!("GROUP:0".parse::<Command>().unwrap(), Command::Group(1));
        assert_eq!("GROUP:3".parse::<Command>().unwrap(), Command::Group(3));
    }

    #[test]
    fn ema_injection_decodes_via_json() {
        assert_eq!(
            r#"{"ema":500.0}"#.parse::<Command>().unwrap(),
            Command::InjectEma(500.0)
        );
        // Extra whitespace is fine, it is JSON.
        assert_eq!(
            r#"{ "ema": 12.5 }"#.parse::<Command>().unwrap(),
            Command::InjectEma(12.5)
        );
    }

    #[test]
    fn garbage_is_rejected_not_crashed_on() {
        assert!("FROBNICATE".parse::<Command>().is_err());
        assert!("calibrate".parse::<Command>().is_err()); // case-sensitive
        assert!("LED:".parse::<Command>().is_err());
        assert!(r#"{"nope":1}"#.parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn trailing_junk_is_rejected() {
        assert!("PINGPONG".parse::<Command>().is_err());
        assert!("RESET now".parse::<Command>().is_err());
    }

    #[test]
    fn wire_formats_are_exact() {
        assert_eq!(telemetry_line(523.456), r#"{"ema":523.46}"#);
        assert_eq!(telemetry_line(0.0), r#"{"ema":0.00}"#);
        assert_eq!(status_line(Status::Pong), r#"{"status":"PONG"}"#);
        assert_eq!(
            status_line(Status::GroupChanged(3)),
            r#"{"status":"GROUP_CHANGED_TO_3"}"#
        );
    }

    #[test]
    fn assembler_splits_lines_and_drops_cr() {
        let mut asm = LineAssembler::new();
        let mut lines = Vec::new();
        for &b in b"PING\r\nRESET\n" {
            if let Some(line) = asm.push_byte(b) {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["PING".to_string(), "RESET".to_string()]);
    }

    #[test]
    fn assembler_discards_overlong_lines() {
        let mut asm = LineAssembler::new();
        for _ in 0..(MAX_LINE_LEN * 4) {
            assert!(asm.push_byte(b'A').is_none());
        }
        // The oversize line is dropped at its terminator...
        assert!(asm.push_byte(b'\n').is_none());
        // ...and the assembler recovers for the next one.
        let mut out = None;
        for &b in b"PING\n" {
            out = asm.push_byte(b);
        }
        assert_eq!(out.as_deref(), Some("PING"));
    }
}
