// SPDX-License-Identifier: Apache-2.0

//! Sample clock planning and the skip-count throttle.
//!
//! One conversion happens every `samp_period / n_channels` µs so that a full channel-cycle spans
//! one sample period. The alarm driving the conversions is never armed further than
//! [`MAX_TICK_US`] ahead; longer intervals are split into several shorter ticks and all but the
//! last conversion of each interval are discarded by the [`Throttle`].

use crate::config::Configuration;

/// Longest single sample clock tick, in µs
pub const MAX_TICK_US: u32 = 65_535;

/// Tick period and skip count derived from a [`Configuration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockPlan {
    /// Period of the hardware tick, in µs
    pub tick_us: u32,
    /// Ticks per kept conversion (1 = keep every conversion)
    pub ticks_per_conversion: u32,
}

impl ClockPlan {
    /// Plan for converting one channel every `samp_period / n_channels` µs.
    pub fn for_config(config: &Configuration) -> Self {
        let interval = (config.samp_period() / config.n_channels() as u32).max(1);
        Self::for_interval(interval)
    }

    /// Plan for one kept conversion every `interval_us`.
    ///
    /// When the interval has to be split, the tick is rounded down, so the real interval may be
    /// short by less than `ticks_per_conversion` µs.
    pub fn for_interval(interval_us: u32) -> Self {
        let interval_us = interval_us.max(1);
        let ticks_per_conversion = interval_us.div_ceil(MAX_TICK_US);
        Self {
            tick_us: interval_us / ticks_per_conversion,
            ticks_per_conversion,
        }
    }

    /// Effective time between kept conversions, in µs
    pub fn conversion_interval_us(&self) -> u32 {
        self.tick_us * self.ticks_per_conversion
    }
}

/// Counts sample clock ticks and lets every `every`-th conversion through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    /// Ticks per kept conversion
    every: u32,
    /// Ticks seen since the last kept conversion
    count: u32,
}

impl Throttle {
    /// Throttle keeping one conversion out of `every` (0 is treated as 1)
    pub const fn new(every: u32) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
            count: 0,
        }
    }

    /// Register one conversion. Returns `true` if it should be kept.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.every {
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// Forget partially counted ticks
    pub fn restart(&mut self) {
        self.count = 0;
    }
}

/// Divider and wrap value of a PWM slice producing a square wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmSetting {
    /// Integer clock divider, 1..=255
    pub div: u8,
    /// Counter wrap value; the period is `top + 1` divided clock cycles
    pub top: u16,
}

impl PwmSetting {
    /// Setting for a `period_us` square wave from a `sys_hz` system clock.
    ///
    /// Returns `None` for a zero period. Periods beyond the slowest reachable setting are
    /// clamped to it.
    pub fn for_period(period_us: u32, sys_hz: u32) -> Option<Self> {
        if period_us == 0 {
            return None;
        }
        let cycles = (u64::from(period_us) * u64::from(sys_hz) / 1_000_000).max(2);
        let div = cycles.div_ceil(1 << 16).clamp(1, u64::from(u8::MAX));
        let top = (cycles / div).clamp(2, 1 << 16) - 1;
        Some(Self {
            div: div as u8,
            top: top as u16,
        })
    }

    /// Period actually produced with a `sys_hz` system clock, in µs
    pub fn period_us(&self, sys_hz: u32) -> u32 {
        let cycles = u64::from(self.div) * (u64::from(self.top) + 1);
        (cycles * 1_000_000 / u64::from(sys_hz)) as u32
    }
}
