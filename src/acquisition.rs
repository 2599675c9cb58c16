// SPDX-License-Identifier: Apache-2.0

//! Per-sample orchestration of buffer, scheduler and trigger, plus the readout boundary.
//!
//! The sampling interrupt calls [`Acquisition::on_conversion`] once per conversion. The main loop
//! polls [`Acquisition::take_live`] and [`Acquisition::take_window`] and acknowledges a drained
//! window with [`Acquisition::acknowledge`]. All of it happens with sampling suspended, see
//! [`interrupt::with_sampling_suspended`](crate::interrupt::with_sampling_suspended).

use crate::{
    buffer::{SampleBuffer, SAMPLE_MASK},
    clock::{ClockPlan, Throttle},
    config::{ConfigRequest, Configuration, ResetFlags, TriggerMode, BUFFER_CAPACITY, MAX_CHANNELS},
    scheduler::ChannelScheduler,
    trigger::{TriggerEngine, TriggerEvent, TriggerState},
};

/// Most recent sample of every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LiveSet {
    /// Latest value per channel; only the first `n_channels` are meaningful
    values: [u16; MAX_CHANNELS],
    /// Channels in use
    n_channels: usize,
}

impl LiveSet {
    /// All-zero set for `n_channels` channels
    pub const fn new(n_channels: usize) -> Self {
        Self {
            values: [0; MAX_CHANNELS],
            n_channels,
        }
    }

    /// Latest values of the active channels, indexed by channel
    pub fn values(&self) -> &[u16] {
        &self.values[..self.n_channels]
    }
}

/// One sample handed to the formatter during replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WindowSample {
    /// Input channel the sample belongs to
    pub channel: usize,
    /// Sample group (per-channel sample index) within the window
    pub group: usize,
    /// Raw 10-bit value
    pub raw: u16,
    /// Time relative to the trigger point, in µs
    pub timestamp_us: i64,
}

/// Chronological copy of a completed capture window.
#[derive(Clone)]
pub struct Window {
    /// Samples, oldest first
    samples: [u16; BUFFER_CAPACITY],
    /// Samples in use
    len: usize,
    /// Channels interleaved in `samples`
    n_channels: usize,
    /// Pre-trigger samples per channel
    pre_trigger: usize,
    /// Acquisition delay in sample periods
    acquisition_delay: u16,
    /// Channel-cycle period in µs
    samp_period: u32,
}

impl Window {
    /// Number of samples across all channels
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Channels interleaved in the window
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Raw samples in chronological order, interleaved by channel
    pub fn raw(&self) -> &[u16] {
        &self.samples[..self.len]
    }

    /// Time of sample group `group` relative to the trigger point, in µs:
    /// `(group - pre_trigger + acquisition_delay) * samp_period`.
    pub fn timestamp_us(&self, group: usize) -> i64 {
        (group as i64 - self.pre_trigger as i64 + i64::from(self.acquisition_delay))
            * i64::from(self.samp_period)
    }

    /// Samples with channel attribution and timestamps, oldest first
    pub fn iter(&self) -> impl Iterator<Item = WindowSample> + '_ {
        self.raw().iter().enumerate().map(|(k, &raw)| {
            let group = k / self.n_channels;
            WindowSample {
                channel: k % self.n_channels,
                group,
                raw,
                timestamp_us: self.timestamp_us(group),
            }
        })
    }

    /// Samples of one sample group (one value per channel)
    pub fn group(&self, group: usize) -> &[u16] {
        let start = (group * self.n_channels).min(self.len);
        let end = (start + self.n_channels).min(self.len);
        &self.samples[start..end]
    }

    /// Number of sample groups
    pub fn groups(&self) -> usize {
        self.len / self.n_channels
    }
}

/// The acquisition controller: owns the configuration and all state shared with the sampling
/// interrupt.
pub struct Acquisition {
    /// Active configuration
    config: Configuration,
    /// Interleaved sample history
    buffer: SampleBuffer,
    /// Channel of the next conversion
    scheduler: ChannelScheduler,
    /// Capture state machine
    trigger: TriggerEngine,
    /// Skip-count throttle for split clock ticks
    throttle: Throttle,
    /// Latest sample group
    live: LiveSet,
    /// A channel-cycle completed since the live set was last taken
    live_available: bool,
    /// A capture window is complete; sampling is suspended until acknowledged
    capture_ready: bool,
    /// Complete channel-cycles written since the last buffer reset
    cycles_since_reset: usize,
}

impl Acquisition {
    /// Controller with the power-up [`Configuration`]. The trigger starts settling as it would
    /// after any buffer reset.
    pub const fn new() -> Self {
        let config = Configuration::DEFAULT;
        Self {
            config,
            buffer: SampleBuffer::new(),
            scheduler: ChannelScheduler::new(config.n_channels()),
            trigger: TriggerEngine::settling(config.pre_trigger() + 1),
            throttle: Throttle::new(1),
            live: LiveSet::new(config.n_channels()),
            live_available: false,
            capture_ready: false,
            cycles_since_reset: 0,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Sample clock plan for the active configuration
    pub fn clock_plan(&self) -> ClockPlan {
        ClockPlan::for_config(&self.config)
    }

    /// Channel the next conversion should sample
    pub fn current_channel(&self) -> usize {
        self.scheduler.current()
    }

    /// Whether conversions are currently accepted
    pub fn is_sampling(&self) -> bool {
        !self.capture_ready
    }

    /// Trigger state, for status reporting
    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }

    /// Buffer slot the next sample goes to
    pub fn pivot(&self) -> usize {
        self.buffer.pivot()
    }

    /// Apply a decoded configuration request in one transaction.
    ///
    /// Buffer or resolution changes reset everything with settling, and so does any change while
    /// a window awaits readout. Other changes drop the pending capture and keep the trigger idle
    /// until `pre_trigger + 1` complete channel-cycles have been written since the last buffer
    /// reset. The caller reprograms the sample clock when [`ResetFlags::clock`] is set.
    pub fn apply(&mut self, request: &ConfigRequest) -> ResetFlags {
        let (config, flags) = self.config.apply(request);
        self.config = config;

        if flags.needs_full_reset() || (flags.trigger && self.capture_ready) {
            self.reset();
        } else if flags.trigger {
            let settle = (config.pre_trigger() + 1).saturating_sub(self.cycles_since_reset);
            self.trigger.reset(settle);
        }
        if flags.clock {
            self.throttle = Throttle::new(self.clock_plan().ticks_per_conversion);
        }
        info!(
            "config applied: {} ch x {} samples, period {} us, mode {:?}",
            config.n_channels() as u32,
            config.n_samples() as u32,
            config.samp_period(),
            config.trig_mode()
        );
        flags
    }

    /// Clear the buffer, restart the channel cycle and put the trigger into settling.
    pub fn reset(&mut self) {
        let n_channels = self.config.n_channels();
        self.buffer.reset(n_channels, self.config.n_samples());
        self.scheduler.reset(n_channels);
        self.trigger.reset(self.config.pre_trigger() + 1);
        self.throttle.restart();
        self.live = LiveSet::new(n_channels);
        self.live_available = false;
        self.capture_ready = false;
        self.cycles_since_reset = 0;
        debug!("acquisition reset, buffer size {}", self.buffer.size() as u32);
    }

    /// Handle one completed conversion of [`current_channel`](Self::current_channel).
    ///
    /// `value` is the 10-bit sample. Conversions are ignored while a captured window awaits
    /// readout and when the throttle skips them.
    pub fn on_conversion(&mut self, value: u16) {
        if self.capture_ready || !self.throttle.tick() {
            return;
        }
        let value = value & SAMPLE_MASK;
        let channel = self.scheduler.current();
        let slot = self.buffer.pivot();

        self.buffer.write(value, slot);
        self.live.values[channel] = value;

        match self
            .trigger
            .observe(channel, value, slot, &self.config, self.buffer.size())
        {
            Some(TriggerEvent::Fired { capture_start }) => debug!(
                "trigger fired at slot {}, window starts at {}",
                slot as u32, capture_start as u32
            ),
            Some(TriggerEvent::DelayElapsed) => debug!("acquisition delay elapsed"),
            None => {}
        }

        let pivot = self.buffer.advance();
        if self.scheduler.advance() {
            self.live_available = true;
            self.cycles_since_reset = self.cycles_since_reset.saturating_add(1);
            self.trigger.on_cycle_complete(self.config.trig_mode());
        }
        if self.trigger.window_complete(pivot) {
            self.capture_ready = true;
            info!("capture ready, {} samples", self.buffer.size() as u32);
        }
    }

    /// Latch an external trigger pulse. Pulses are ignored outside [`TriggerMode::External`] and
    /// while not armed.
    pub fn on_external_edge(&mut self) {
        if self.config.trig_mode() != TriggerMode::External {
            return;
        }
        if !self.trigger.external_edge() {
            warn!("external trigger dropped in state {:?}", self.trigger.state());
        }
    }

    /// Whether a channel-cycle completed since the live set was last taken
    pub fn live_available(&self) -> bool {
        self.live_available
    }

    /// Take the latest sample group if a new one landed
    pub fn take_live(&mut self) -> Option<LiveSet> {
        if core::mem::take(&mut self.live_available) {
            Some(self.live)
        } else {
            None
        }
    }

    /// Whether a completed window awaits readout
    pub fn capture_ready(&self) -> bool {
        self.capture_ready
    }

    /// Copy the completed window, if any. Sampling stays suspended until
    /// [`acknowledge`](Self::acknowledge).
    pub fn take_window(&self) -> Option<Window> {
        if !self.capture_ready {
            return None;
        }
        let mut samples = [0u16; BUFFER_CAPACITY];
        let len = self
            .buffer
            .copy_from(self.trigger.capture_start(), &mut samples);
        Some(Window {
            samples,
            len,
            n_channels: self.config.n_channels(),
            pre_trigger: self.config.pre_trigger(),
            acquisition_delay: self.config.acquisition_delay(),
            samp_period: self.config.samp_period(),
        })
    }

    /// Mark the window as drained: reset for the next capture and resume sampling.
    pub fn acknowledge(&mut self) {
        if self.capture_ready {
            self.reset();
        }
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}
