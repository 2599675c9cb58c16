// SPDX-License-Identifier: Apache-2.0

//! Line-oriented host command protocol.
//!
//! Every command is one line: a single command letter (either case) followed by
//! whitespace-separated arguments, terminated by `\r` or `\n`. Numbers saturate into `u32` and
//! negative numbers read as zero; range checking is left to [`Configuration::apply`], which
//! clamps.
//!
//! | Command                          | Effect                                     |
//! |----------------------------------|--------------------------------------------|
//! | `c <n>`                          | number of channels                         |
//! | `p <us>`                         | channel-cycle period                       |
//! | `m <l\|x\|r\|f\|e>`              | live, external, rising, falling, either    |
//! | `t <ch>`                         | trigger channel                            |
//! | `v <level>`                      | trigger threshold                          |
//! | `b <n>`                          | pre-trigger samples per channel            |
//! | `d <n>`                          | acquisition delay in sample periods        |
//! | `s <n>`                          | samples per channel                        |
//! | `a <10\|8>`                      | ADC resolution                             |
//! | `o <r\|c>`                       | raw or calibrated output                   |
//! | `k <ch> n`                       | no calibration                             |
//! | `k <ch> p a0 [a1 [a2 [a3]]]`     | polynomial calibration                     |
//! | `k <ch> t series beta r0 t0`     | thermistor calibration                     |
//! | `w <us>`                         | square-wave period, 0 switches it off      |
//! | `?`                              | print the settings                         |
//!
//! [`Configuration::apply`]: crate::config::Configuration::apply

use core::fmt::{self, Write};

use heapless::Vec;

use crate::{
    calibration::{Calibration, CalibrationTable},
    config::{ConfigRequest, Configuration, OutputMode, Resolution, TriggerMode, MAX_CHANNELS},
};

/// Longest accepted command line, terminator excluded
pub const MAX_LINE: usize = 64;

/// A decoded host command
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Update acquisition settings
    Configure(ConfigRequest),
    /// Replace the calibration of one channel
    Calibrate {
        /// Channel to calibrate
        channel: usize,
        /// New transform
        calibration: Calibration,
    },
    /// Reprogram the square-wave generator
    SquareWave {
        /// Full period in µs, 0 for off
        period_us: u32,
    },
    /// Print the current settings
    Settings,
}

/// Why a command line was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Line exceeded [`MAX_LINE`] bytes and was dropped
    #[error("line longer than {} bytes", MAX_LINE)]
    LineTooLong,
    /// Line contained bytes that are not UTF-8
    #[error("line is not text")]
    NotText,
    /// First word is not a known command
    #[error("unknown command '{0}'")]
    UnknownCommand(char),
    /// A required argument is absent
    #[error("missing argument")]
    MissingArgument,
    /// An argument could not be parsed, or there were too many
    #[error("invalid argument")]
    InvalidArgument,
}

/// Collects bytes from the serial port into command lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes of the current line
    line: Vec<u8, MAX_LINE>,
    /// Current line exceeded [`MAX_LINE`]; dropped when its terminator arrives
    overflowed: bool,
}

impl LineDecoder {
    /// Empty decoder
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one received byte. Returns a result once a non-blank line is terminated.
    pub fn push(&mut self, byte: u8) -> Option<Result<Command, ProtocolError>> {
        if byte != b'\r' && byte != b'\n' {
            if self.line.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        let result = if self.overflowed {
            Some(Err(ProtocolError::LineTooLong))
        } else {
            match core::str::from_utf8(&self.line) {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(parse_command(text)),
                Err(_) => Some(Err(ProtocolError::NotText)),
            }
        };
        self.line.clear();
        self.overflowed = false;
        result
    }
}

/// Parse one command line (without terminator)
pub fn parse_command(line: &str) -> Result<Command, ProtocolError> {
    let mut words = line.split_ascii_whitespace();
    let head = words.next().ok_or(ProtocolError::MissingArgument)?;
    let mut letters = head.chars();
    let letter = letters.next().ok_or(ProtocolError::MissingArgument)?;
    if letters.next().is_some() {
        return Err(ProtocolError::UnknownCommand(letter));
    }

    let mut request = ConfigRequest::default();
    let command = match letter.to_ascii_lowercase() {
        'c' => {
            request.n_channels = Some(number(words.next())?);
            Command::Configure(request)
        }
        'p' => {
            request.samp_period = Some(number(words.next())?);
            Command::Configure(request)
        }
        'm' => {
            request.trig_mode = Some(trigger_mode(words.next())?);
            Command::Configure(request)
        }
        't' => {
            request.trig_channel = Some(number(words.next())?);
            Command::Configure(request)
        }
        'v' => {
            request.trig_threshold = Some(number(words.next())?);
            Command::Configure(request)
        }
        'b' => {
            request.pre_trigger = Some(number(words.next())?);
            Command::Configure(request)
        }
        'd' => {
            request.acquisition_delay = Some(number(words.next())?);
            Command::Configure(request)
        }
        's' => {
            request.n_samples = Some(number(words.next())?);
            Command::Configure(request)
        }
        'a' => {
            request.resolution = Some(match words.next() {
                Some("10") => Resolution::TenBit,
                Some("8") => Resolution::EightBit,
                Some(_) => return Err(ProtocolError::InvalidArgument),
                None => return Err(ProtocolError::MissingArgument),
            });
            Command::Configure(request)
        }
        'o' => {
            request.output = Some(match words.next() {
                Some("r") => OutputMode::Raw,
                Some("c") => OutputMode::Calibrated,
                Some(_) => return Err(ProtocolError::InvalidArgument),
                None => return Err(ProtocolError::MissingArgument),
            });
            Command::Configure(request)
        }
        'k' => {
            let channel = number(words.next())? as usize;
            if channel >= MAX_CHANNELS {
                return Err(ProtocolError::InvalidArgument);
            }
            let calibration = calibration(&mut words)?;
            Command::Calibrate {
                channel,
                calibration,
            }
        }
        'w' => Command::SquareWave {
            period_us: number(words.next())?,
        },
        '?' => Command::Settings,
        _ => return Err(ProtocolError::UnknownCommand(letter)),
    };

    if words.next().is_some() {
        return Err(ProtocolError::InvalidArgument);
    }
    Ok(command)
}

/// Decimal integer, saturating at `u32::MAX`; negative values read as 0
fn number(word: Option<&str>) -> Result<u32, ProtocolError> {
    let word = word.ok_or(ProtocolError::MissingArgument)?;
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word.strip_prefix('+').unwrap_or(word)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidArgument);
    }
    if negative {
        return Ok(0);
    }
    Ok(digits.bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
    }))
}

/// Floating-point calibration coefficient
fn coefficient(word: &str) -> Result<f32, ProtocolError> {
    word.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(ProtocolError::InvalidArgument)
}

/// Trigger mode letter
fn trigger_mode(word: Option<&str>) -> Result<TriggerMode, ProtocolError> {
    match word {
        Some("l") => Ok(TriggerMode::Live),
        Some("x") => Ok(TriggerMode::External),
        Some("r") => Ok(TriggerMode::RisingEdge),
        Some("f") => Ok(TriggerMode::FallingEdge),
        Some("e") => Ok(TriggerMode::EitherEdge),
        Some(_) => Err(ProtocolError::InvalidArgument),
        None => Err(ProtocolError::MissingArgument),
    }
}

/// Letter of `mode` in the `m` command
fn mode_letter(mode: TriggerMode) -> char {
    match mode {
        TriggerMode::Live => 'l',
        TriggerMode::External => 'x',
        TriggerMode::RisingEdge => 'r',
        TriggerMode::FallingEdge => 'f',
        TriggerMode::EitherEdge => 'e',
    }
}

/// Arguments of the `k` command after the channel number
fn calibration<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Calibration, ProtocolError> {
    match words.next() {
        Some("n") => Ok(Calibration::None),
        Some("p") => {
            let mut terms = [0.0; 4];
            let mut given = 0;
            for term in terms.iter_mut() {
                match words.next() {
                    Some(word) => *term = coefficient(word)?,
                    None => break,
                }
                given += 1;
            }
            if given == 0 {
                return Err(ProtocolError::MissingArgument);
            }
            Ok(Calibration::Polynomial(terms))
        }
        Some("t") => {
            let mut next = || {
                words
                    .next()
                    .ok_or(ProtocolError::MissingArgument)
                    .and_then(coefficient)
            };
            let series_ohms = next()?;
            let beta = next()?;
            let nominal_ohms = next()?;
            let nominal_celsius = next()?;
            if beta == 0.0 || nominal_ohms <= 0.0 {
                return Err(ProtocolError::InvalidArgument);
            }
            Ok(Calibration::Thermistor {
                series_ohms,
                beta,
                nominal_ohms,
                nominal_celsius,
            })
        }
        Some(_) => Err(ProtocolError::InvalidArgument),
        None => Err(ProtocolError::MissingArgument),
    }
}

/// Print every setting as the command that would restore it, one per line.
pub fn write_settings<W: Write>(
    out: &mut W,
    config: &Configuration,
    square_wave_us: u32,
    calibrations: &CalibrationTable,
) -> fmt::Result {
    writeln!(out, "c {}", config.n_channels())?;
    writeln!(out, "p {}", config.samp_period())?;
    writeln!(out, "m {}", mode_letter(config.trig_mode()))?;
    writeln!(out, "t {}", config.trig_channel())?;
    writeln!(out, "v {}", config.trig_threshold())?;
    writeln!(out, "b {}", config.pre_trigger())?;
    writeln!(out, "d {}", config.acquisition_delay())?;
    writeln!(out, "s {}", config.n_samples())?;
    writeln!(out, "a {}", config.resolution().bits())?;
    let output = match config.output() {
        OutputMode::Raw => 'r',
        OutputMode::Calibrated => 'c',
    };
    writeln!(out, "o {}", output)?;
    writeln!(out, "w {}", square_wave_us)?;
    for channel in 0..config.n_channels() {
        writeln!(out, "k {} {}", channel, calibrations.get(channel))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> std::vec::Vec<Result<Command, ProtocolError>> {
        let mut decoder = LineDecoder::new();
        text.bytes().filter_map(|b| decoder.push(b)).collect()
    }

    #[test]
    fn configuration_commands() {
        assert_eq!(
            parse_command("c 3"),
            Ok(Command::Configure(ConfigRequest {
                n_channels: Some(3),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_command("  m   f "),
            Ok(Command::Configure(ConfigRequest {
                trig_mode: Some(TriggerMode::FallingEdge),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_command("a 8"),
            Ok(Command::Configure(ConfigRequest {
                resolution: Some(Resolution::EightBit),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_command("S 40"),
            Ok(Command::Configure(ConfigRequest {
                n_samples: Some(40),
                ..Default::default()
            }))
        );
        assert_eq!(parse_command("?"), Ok(Command::Settings));
        assert_eq!(
            parse_command("w 250"),
            Ok(Command::SquareWave { period_us: 250 })
        );
    }

    #[test]
    fn numbers_saturate() {
        assert_eq!(number(Some("-12")), Ok(0));
        assert_eq!(number(Some("+7")), Ok(7));
        assert_eq!(number(Some("99999999999999")), Ok(u32::MAX));
        assert_eq!(number(Some("12a")), Err(ProtocolError::InvalidArgument));
        assert_eq!(number(Some("-")), Err(ProtocolError::InvalidArgument));
        assert_eq!(number(None), Err(ProtocolError::MissingArgument));
    }

    #[test]
    fn malformed_commands() {
        assert_eq!(parse_command("z 1"), Err(ProtocolError::UnknownCommand('z')));
        assert_eq!(parse_command("cc 1"), Err(ProtocolError::UnknownCommand('c')));
        assert_eq!(parse_command("s"), Err(ProtocolError::MissingArgument));
        assert_eq!(parse_command("m q"), Err(ProtocolError::InvalidArgument));
        assert_eq!(parse_command("a 12"), Err(ProtocolError::InvalidArgument));
        assert_eq!(parse_command("c 1 2"), Err(ProtocolError::InvalidArgument));
    }

    #[test]
    fn calibration_commands() {
        assert_eq!(
            parse_command("k 1 p 0.5 2"),
            Ok(Command::Calibrate {
                channel: 1,
                calibration: Calibration::Polynomial([0.5, 2.0, 0.0, 0.0]),
            })
        );
        assert_eq!(
            parse_command("k 0 t 10000 3950 10000 25"),
            Ok(Command::Calibrate {
                channel: 0,
                calibration: Calibration::Thermistor {
                    series_ohms: 10000.0,
                    beta: 3950.0,
                    nominal_ohms: 10000.0,
                    nominal_celsius: 25.0,
                },
            })
        );
        assert_eq!(
            parse_command("k 2 n"),
            Ok(Command::Calibrate {
                channel: 2,
                calibration: Calibration::None,
            })
        );
        assert_eq!(parse_command("k 6 n"), Err(ProtocolError::InvalidArgument));
        assert_eq!(parse_command("k 0 p"), Err(ProtocolError::MissingArgument));
        assert_eq!(parse_command("k 0 t 1 2 3"), Err(ProtocolError::MissingArgument));
        assert_eq!(parse_command("k 0 p 1 2 3 4 5"), Err(ProtocolError::InvalidArgument));
    }

    #[test]
    fn decoder_splits_lines_and_skips_blanks() {
        let results = decode("c 2\r\n\r\n  \np 500\n");
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[1],
            Ok(Command::Configure(ConfigRequest {
                samp_period: Some(500),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn decoder_drops_overlong_lines_and_recovers() {
        let mut text = std::string::String::from("s ");
        text.extend(core::iter::repeat('9').take(MAX_LINE));
        text.push_str("\n?\n");
        assert_eq!(
            decode(&text),
            [Err(ProtocolError::LineTooLong), Ok(Command::Settings)]
        );
    }

    #[test]
    fn settings_replay_as_commands() {
        let mut calibrations = CalibrationTable::new();
        calibrations.set(1, Calibration::Polynomial([1.0, 0.5, 0.0, 0.0]));
        let (config, _) = Configuration::DEFAULT.apply(&ConfigRequest {
            n_channels: Some(2),
            trig_mode: Some(TriggerMode::RisingEdge),
            ..Default::default()
        });

        let mut text = std::string::String::new();
        write_settings(&mut text, &config, 0, &calibrations).unwrap();
        assert!(text.starts_with("c 2\np 1000\nm r\n"));
        assert!(text.ends_with("w 0\nk 0 n\nk 1 p 1 0.5 0 0\n"));

        let mut replayed = Configuration::DEFAULT;
        for line in text.lines() {
            if let Ok(Command::Configure(request)) = parse_command(line) {
                replayed = replayed.apply(&request).0;
            }
        }
        assert_eq!(replayed, config);
    }
}
