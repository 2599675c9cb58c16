// SPDX-License-Identifier: Apache-2.0

//! Acquisition settings and the clamping update applied by the command layer.
//!
//! A [`Configuration`] is never edited field by field. The protocol layer decodes a
//! [`ConfigRequest`] holding only the fields the host sent, and [`Configuration::apply`] turns it
//! into a new, internally consistent configuration plus the [`ResetFlags`] the
//! [`Acquisition`](crate::acquisition::Acquisition) must honour. Out-of-range values are clamped
//! to the nearest bound, never rejected.

/// Highest number of multiplexed input channels
pub const MAX_CHANNELS: usize = 6;
/// Absolute sample capacity of the circular buffer, shared by all channels
pub const BUFFER_CAPACITY: usize = 1200;
/// Smallest number of samples per channel in a capture window
pub const MIN_SAMPLES: usize = 2;
/// Shortest sample period, in µs
pub const MIN_SAMP_PERIOD: u32 = 1;
/// Longest sample period, in µs
pub const MAX_SAMP_PERIOD: u32 = 900_000;
/// Full-scale value of a stored sample (10 bits)
pub const MAX_THRESHOLD: u16 = 1023;
/// Longest acquisition delay, in sample periods
pub const MAX_ACQUISITION_DELAY: u16 = 2000;

/// How a capture window is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerMode {
    /// No capture; every completed channel-cycle is streamed as a live sample group
    Live,
    /// Fire on a pulse at the external trigger input
    External,
    /// Fire when the trigger channel rises through the threshold
    RisingEdge,
    /// Fire when the trigger channel falls through the threshold
    FallingEdge,
    /// Fire on either crossing direction
    EitherEdge,
}

/// ADC conversion width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// Top 10 bits of the conversion
    TenBit,
    /// Top 8 bits, scaled back into the 10-bit range
    EightBit,
}

impl Resolution {
    /// Reduce a 12-bit conversion result to a stored 10-bit sample.
    ///
    /// [`Resolution::EightBit`] keeps the two low bits clear so thresholds compare the same way
    /// in both modes.
    pub fn quantize(self, raw12: u16) -> u16 {
        let raw12 = raw12 & 0x0fff;
        match self {
            Resolution::TenBit => raw12 >> 2,
            Resolution::EightBit => (raw12 >> 4) << 2,
        }
    }

    /// Number of significant bits
    pub fn bits(self) -> u8 {
        match self {
            Resolution::TenBit => 10,
            Resolution::EightBit => 8,
        }
    }
}

/// Whether the formatter prints raw samples or calibrated physical values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    /// Raw 10-bit integers
    Raw,
    /// Values passed through the channel's [`Calibration`](crate::calibration::Calibration)
    Calibrated,
}

/// Acquisition settings. See the module documentation for how it is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    /// Number of multiplexed channels, 1..=[`MAX_CHANNELS`]
    n_channels: usize,
    /// Period of one channel-cycle in µs
    samp_period: u32,
    /// Trigger mode
    trig_mode: TriggerMode,
    /// Channel whose samples are compared against the threshold
    trig_channel: usize,
    /// Level for the edge modes, 0..=[`MAX_THRESHOLD`]
    trig_threshold: u16,
    /// Samples per channel kept from before the trigger point
    pre_trigger: usize,
    /// Sample periods to wait after the trigger fires
    acquisition_delay: u16,
    /// Samples per channel in a capture window
    n_samples: usize,
    /// ADC resolution
    resolution: Resolution,
    /// Output formatting
    output: OutputMode,
}

impl Configuration {
    /// Settings used at power-up.
    pub const DEFAULT: Self = Self {
        n_channels: 1,
        samp_period: 1000,
        trig_mode: TriggerMode::Live,
        trig_channel: 0,
        trig_threshold: 512,
        pre_trigger: 0,
        acquisition_delay: 0,
        n_samples: 600,
        resolution: Resolution::TenBit,
        output: OutputMode::Raw,
    };

    /// Number of multiplexed channels
    pub const fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Channel-cycle period in µs
    pub const fn samp_period(&self) -> u32 {
        self.samp_period
    }

    /// Trigger mode
    pub const fn trig_mode(&self) -> TriggerMode {
        self.trig_mode
    }

    /// Trigger channel index
    pub const fn trig_channel(&self) -> usize {
        self.trig_channel
    }

    /// Edge threshold
    pub const fn trig_threshold(&self) -> u16 {
        self.trig_threshold
    }

    /// Pre-trigger samples per channel
    pub const fn pre_trigger(&self) -> usize {
        self.pre_trigger
    }

    /// Post-trigger delay in sample periods
    pub const fn acquisition_delay(&self) -> u16 {
        self.acquisition_delay
    }

    /// Samples per channel in a window
    pub const fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// ADC resolution
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Output formatting
    pub const fn output(&self) -> OutputMode {
        self.output
    }

    /// Slots used in the circular buffer, `n_channels * n_samples`
    pub const fn buf_size(&self) -> usize {
        self.n_channels * self.n_samples
    }

    /// Produce the configuration resulting from `request`, clamping every field into range.
    ///
    /// The returned [`ResetFlags`] tell the caller which parts of the acquisition state are no
    /// longer valid. The trigger is always reset, so a pending capture is dropped by any request.
    pub fn apply(&self, request: &ConfigRequest) -> (Configuration, ResetFlags) {
        let mut next = *self;

        if let Some(n) = request.n_channels {
            next.n_channels = clamped("channels", n, 1, MAX_CHANNELS as u32) as usize;
        }
        if let Some(n) = request.n_samples {
            next.n_samples = n.min(BUFFER_CAPACITY as u32) as usize;
        }
        // Capacity is checked even when only the channel count changed
        let max_samples = BUFFER_CAPACITY / next.n_channels;
        if next.n_samples > max_samples || next.n_samples < MIN_SAMPLES {
            let fitted = next.n_samples.clamp(MIN_SAMPLES, max_samples);
            warn!(
                "samples clamped from {} to {} for {} channels",
                next.n_samples as u32, fitted as u32, next.n_channels as u32
            );
            next.n_samples = fitted;
        }

        if let Some(period) = request.samp_period {
            next.samp_period = clamped("period", period, MIN_SAMP_PERIOD, MAX_SAMP_PERIOD);
        }
        if let Some(mode) = request.trig_mode {
            next.trig_mode = mode;
        }
        if let Some(channel) = request.trig_channel {
            next.trig_channel = channel.min(u32::from(u16::MAX)) as usize;
        }
        next.trig_channel = next.trig_channel.min(next.n_channels - 1);
        if let Some(level) = request.trig_threshold {
            next.trig_threshold = clamped("threshold", level, 0, MAX_THRESHOLD.into()) as u16;
        }
        if let Some(pre) = request.pre_trigger {
            next.pre_trigger = pre.min(BUFFER_CAPACITY as u32) as usize;
        }
        next.pre_trigger = next.pre_trigger.min(next.n_samples - 1);
        if let Some(delay) = request.acquisition_delay {
            next.acquisition_delay =
                clamped("delay", delay, 0, MAX_ACQUISITION_DELAY.into()) as u16;
        }
        if let Some(resolution) = request.resolution {
            next.resolution = resolution;
        }
        if let Some(output) = request.output {
            next.output = output;
        }

        let flags = ResetFlags {
            buffer: next.n_channels != self.n_channels || next.n_samples != self.n_samples,
            trigger: true,
            resolution: next.resolution != self.resolution,
            clock: next.samp_period != self.samp_period || next.n_channels != self.n_channels,
        };
        (next, flags)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Clamp `value` into `[lo, hi]`, logging when it had to move
fn clamped(name: &str, value: u32, lo: u32, hi: u32) -> u32 {
    let fitted = value.clamp(lo, hi);
    if fitted != value {
        warn!("{} clamped from {} to {}", name, value, fitted);
    }
    fitted
}

/// Fields decoded from one host command. `None` leaves the current value untouched.
///
/// Numbers are kept as the parsed `u32` so that [`Configuration::apply`] can clamp them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigRequest {
    /// Number of channels
    pub n_channels: Option<u32>,
    /// Channel-cycle period in µs
    pub samp_period: Option<u32>,
    /// Trigger mode
    pub trig_mode: Option<TriggerMode>,
    /// Trigger channel
    pub trig_channel: Option<u32>,
    /// Edge threshold
    pub trig_threshold: Option<u32>,
    /// Pre-trigger samples per channel
    pub pre_trigger: Option<u32>,
    /// Delay in sample periods
    pub acquisition_delay: Option<u32>,
    /// Samples per channel
    pub n_samples: Option<u32>,
    /// ADC resolution
    pub resolution: Option<Resolution>,
    /// Output formatting
    pub output: Option<OutputMode>,
}

/// Parts of the acquisition state invalidated by a configuration update
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetFlags {
    /// Buffer geometry changed; indices and contents must be rebuilt
    pub buffer: bool,
    /// Trigger state must return to idle, dropping any pending capture
    pub trigger: bool,
    /// Conversion width changed; old samples are not comparable to new ones
    pub resolution: bool,
    /// The sample clock must be reprogrammed
    pub clock: bool,
}

impl ResetFlags {
    /// Whether the buffer and trigger need a full reset with settling
    pub fn needs_full_reset(&self) -> bool {
        self.buffer || self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConfigRequest {
        ConfigRequest::default()
    }

    #[test]
    fn capacity_holds_for_every_channel_count() {
        for channels in 0..=10 {
            for samples in [0, 1, 2, 199, 200, 201, 600, 1200, 5000] {
                let (config, _) = Configuration::DEFAULT.apply(&ConfigRequest {
                    n_channels: Some(channels),
                    n_samples: Some(samples),
                    ..request()
                });
                assert!(config.buf_size() <= BUFFER_CAPACITY);
                assert!(config.n_samples() >= MIN_SAMPLES);
                assert!((1..=MAX_CHANNELS).contains(&config.n_channels()));
            }
        }
    }

    #[test]
    fn samples_shrink_when_channels_grow() {
        let (config, _) = Configuration::DEFAULT.apply(&ConfigRequest {
            n_samples: Some(1200),
            ..request()
        });
        assert_eq!(config.n_samples(), 1200);

        let (config, flags) = config.apply(&ConfigRequest {
            n_channels: Some(4),
            ..request()
        });
        assert_eq!(config.n_samples(), 300);
        assert!(flags.buffer);
        assert!(flags.clock);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let (config, _) = Configuration::DEFAULT.apply(&ConfigRequest {
            n_channels: Some(2),
            n_samples: Some(10),
            samp_period: Some(2_000_000),
            trig_channel: Some(7),
            trig_threshold: Some(4000),
            pre_trigger: Some(50),
            acquisition_delay: Some(9999),
            ..request()
        });
        assert_eq!(config.samp_period(), MAX_SAMP_PERIOD);
        assert_eq!(config.trig_channel(), 1);
        assert_eq!(config.trig_threshold(), MAX_THRESHOLD);
        assert_eq!(config.pre_trigger(), 9);
        assert_eq!(config.acquisition_delay(), MAX_ACQUISITION_DELAY);

        let (config, _) = config.apply(&ConfigRequest {
            samp_period: Some(0),
            ..request()
        });
        assert_eq!(config.samp_period(), MIN_SAMP_PERIOD);
    }

    #[test]
    fn reset_flags_follow_changed_fields() {
        let (_, flags) = Configuration::DEFAULT.apply(&ConfigRequest {
            trig_threshold: Some(100),
            ..request()
        });
        assert_eq!(
            flags,
            ResetFlags {
                buffer: false,
                trigger: true,
                resolution: false,
                clock: false
            }
        );

        let (_, flags) = Configuration::DEFAULT.apply(&ConfigRequest {
            resolution: Some(Resolution::EightBit),
            ..request()
        });
        assert!(flags.resolution && flags.needs_full_reset() && !flags.buffer);

        let (_, flags) = Configuration::DEFAULT.apply(&ConfigRequest {
            n_samples: Some(Configuration::DEFAULT.n_samples() as u32),
            ..request()
        });
        assert!(!flags.needs_full_reset());
    }

    #[test]
    fn quantize_keeps_ten_bit_scale() {
        assert_eq!(Resolution::TenBit.quantize(4095), 1023);
        assert_eq!(Resolution::TenBit.quantize(2048), 512);
        assert_eq!(Resolution::EightBit.quantize(4095), 1020);
        assert_eq!(Resolution::EightBit.quantize(2063), 512);
    }
}
