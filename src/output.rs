// SPDX-License-Identifier: Apache-2.0

//! Text rendering of live sample groups and captured windows for the host.

use core::fmt::{self, Write};

use crate::{
    acquisition::{LiveSet, Window},
    calibration::CalibrationTable,
    config::OutputMode,
};

/// Write one value in the selected [`OutputMode`]
fn write_value<W: Write>(
    out: &mut W,
    mode: OutputMode,
    calibrations: &CalibrationTable,
    channel: usize,
    raw: u16,
) -> fmt::Result {
    match mode {
        OutputMode::Raw => write!(out, "{}", raw),
        OutputMode::Calibrated => write!(out, "{:.3}", calibrations.apply(channel, raw)),
    }
}

/// One line of tab-separated values, channel 0 first
pub fn write_live<W: Write>(
    out: &mut W,
    live: &LiveSet,
    mode: OutputMode,
    calibrations: &CalibrationTable,
) -> fmt::Result {
    for (channel, &raw) in live.values().iter().enumerate() {
        if channel > 0 {
            out.write_char('\t')?;
        }
        write_value(out, mode, calibrations, channel, raw)?;
    }
    out.write_char('\n')
}

/// Header line, one line per sample group prefixed with its timestamp, then a blank line.
pub fn write_window<W: Write>(
    out: &mut W,
    window: &Window,
    mode: OutputMode,
    calibrations: &CalibrationTable,
) -> fmt::Result {
    writeln!(
        out,
        "# {} samples, {} channels",
        window.len(),
        window.n_channels()
    )?;
    for group in 0..window.groups() {
        write!(out, "{}", window.timestamp_us(group))?;
        for (channel, &raw) in window.group(group).iter().enumerate() {
            out.write_char('\t')?;
            write_value(out, mode, calibrations, channel, raw)?;
        }
        out.write_char('\n')?;
    }
    out.write_char('\n')
}
