// SPDX-License-Identifier: Apache-2.0

//! Trigger state machine deciding when a capture window opens and closes.
//!
//! ```text
//! Idle --settled--> Armed --fire--> DelayCounting --delay elapsed--> Capturing --pivot at start--> ready
//!   ^                                 (skipped when the delay is 0)                                  |
//!   +------------------------------------- reset after readout --------------------------------------+
//! ```
//!
//! The engine only ever holds one outstanding capture. Fire requests while not
//! [`Armed`](TriggerState::Armed) are dropped.

use crate::{
    buffer::normalize,
    config::{Configuration, TriggerMode},
};

/// Where the engine is in the capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerState {
    /// Not eligible to fire: settling after a reset, or in [`TriggerMode::Live`]
    Idle,
    /// Waiting for a threshold crossing or an external pulse
    Armed,
    /// Fired; counting trigger-channel samples until the acquisition delay has passed
    DelayCounting {
        /// Trigger-channel samples seen since firing
        elapsed: u16,
    },
    /// Collecting post-trigger samples until the window closes
    Capturing,
}

/// Notable outcome of feeding one sample to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerEvent {
    /// The trigger fired on this sample
    Fired {
        /// First slot of the capture window
        capture_start: usize,
    },
    /// The acquisition delay ran out on this sample
    DelayElapsed,
}

/// Whether the step `previous -> current` crosses `threshold` in the direction `mode` asks for.
///
/// Rising: `previous < threshold <= current`. Falling: `previous > threshold >= current`.
/// Non-edge modes never cross.
pub fn crossed(mode: TriggerMode, previous: u16, current: u16, threshold: u16) -> bool {
    let rising = previous < threshold && threshold <= current;
    let falling = previous > threshold && threshold >= current;
    match mode {
        TriggerMode::RisingEdge => rising,
        TriggerMode::FallingEdge => falling,
        TriggerMode::EitherEdge => rising || falling,
        TriggerMode::Live | TriggerMode::External => false,
    }
}

/// First slot of the capture window for a trigger observed at `current_pivot`.
///
/// `triggerPivot = normalize(current_pivot + delay)` and the window starts `pre_trigger` sample
/// groups plus `trig_channel` slots before it, normalized into `[0, buf_size)`.
pub fn capture_start_index(
    current_pivot: usize,
    delay: usize,
    trig_channel: usize,
    pre_trigger: usize,
    n_channels: usize,
    buf_size: usize,
) -> usize {
    let trigger_pivot = normalize(current_pivot as isize + delay as isize, buf_size);
    normalize(
        trigger_pivot as isize - trig_channel as isize - (pre_trigger * n_channels) as isize,
        buf_size,
    )
}

/// Trigger arming, edge detection and window tracking.
pub struct TriggerEngine {
    /// Current state
    state: TriggerState,
    /// Last sample seen on the trigger channel
    previous: Option<u16>,
    /// First slot of the pending window, valid once fired
    capture_start: usize,
    /// Complete channel-cycles left before the engine may arm
    suppressed_cycles: usize,
    /// An external pulse arrived while armed and fires on the next trigger-channel sample
    external_pending: bool,
}

impl TriggerEngine {
    /// Idle engine with no settling period
    pub const fn new() -> Self {
        Self {
            state: TriggerState::Idle,
            previous: None,
            capture_start: 0,
            suppressed_cycles: 0,
            external_pending: false,
        }
    }

    /// Idle engine that ignores the next `settle_cycles` channel-cycles
    pub const fn settling(settle_cycles: usize) -> Self {
        Self {
            suppressed_cycles: settle_cycles,
            ..Self::new()
        }
    }

    /// Return to [`TriggerState::Idle`] and ignore the next `settle_cycles` channel-cycles,
    /// dropping any in-flight capture.
    ///
    /// With `settle_cycles == 0` the engine re-arms at the end of the current channel-cycle.
    pub fn reset(&mut self, settle_cycles: usize) {
        *self = Self::settling(settle_cycles);
    }

    /// Current state
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// First slot of the pending window. Only meaningful after the trigger fired
    pub fn capture_start(&self) -> usize {
        self.capture_start
    }

    /// Channel-cycles still blanked by settling
    pub fn suppressed_cycles(&self) -> usize {
        self.suppressed_cycles
    }

    /// Latch an external trigger pulse. Returns `false` if the pulse was dropped because the
    /// engine is not armed or a pulse is already pending.
    ///
    /// A latched pulse fires on the next trigger-channel sample, so time zero lags the pulse by
    /// up to `n_channels - 1` conversions.
    pub fn external_edge(&mut self) -> bool {
        if self.state == TriggerState::Armed && !self.external_pending {
            self.external_pending = true;
            true
        } else {
            false
        }
    }

    /// Feed one stored sample.
    ///
    /// `slot` is the buffer index the sample was written to and `buf_size` the buffer size.
    /// Samples of channels other than the trigger channel are ignored.
    pub fn observe(
        &mut self,
        channel: usize,
        value: u16,
        slot: usize,
        config: &Configuration,
        buf_size: usize,
    ) -> Option<TriggerEvent> {
        if channel != config.trig_channel() {
            return None;
        }
        let previous = self.previous.replace(value);

        match self.state {
            TriggerState::Armed => {
                let fire = match config.trig_mode() {
                    TriggerMode::Live => false,
                    TriggerMode::External => core::mem::take(&mut self.external_pending),
                    mode => previous
                        .is_some_and(|prev| crossed(mode, prev, value, config.trig_threshold())),
                };
                if fire {
                    return Some(self.fire(slot, config, buf_size));
                }
            }
            TriggerState::DelayCounting { elapsed } => {
                let elapsed = elapsed + 1;
                if elapsed >= config.acquisition_delay() {
                    self.state = TriggerState::Capturing;
                    return Some(TriggerEvent::DelayElapsed);
                }
                self.state = TriggerState::DelayCounting { elapsed };
            }
            TriggerState::Idle | TriggerState::Capturing => {}
        }
        None
    }

    /// Open the capture window anchored at `slot`
    fn fire(&mut self, slot: usize, config: &Configuration, buf_size: usize) -> TriggerEvent {
        // Delay is counted in channel-cycles, so it spans `n_channels` slots per period
        let delay_slots = usize::from(config.acquisition_delay()) * config.n_channels();
        self.capture_start = capture_start_index(
            slot,
            delay_slots,
            config.trig_channel(),
            config.pre_trigger(),
            config.n_channels(),
            buf_size,
        );
        self.state = if config.acquisition_delay() == 0 {
            TriggerState::Capturing
        } else {
            TriggerState::DelayCounting { elapsed: 0 }
        };
        TriggerEvent::Fired {
            capture_start: self.capture_start,
        }
    }

    /// Account for a completed channel-cycle, arming the engine once settling is over.
    pub fn on_cycle_complete(&mut self, mode: TriggerMode) {
        if self.suppressed_cycles > 0 {
            self.suppressed_cycles -= 1;
        }
        let settled = self.suppressed_cycles == 0;
        if self.state == TriggerState::Idle && settled && mode != TriggerMode::Live {
            self.state = TriggerState::Armed;
        }
    }

    /// Whether the window is complete now that the write pivot moved to `pivot`.
    ///
    /// True once capturing and the pivot is back at the window start: the last `buf_size`
    /// writes then fill the window in chronological order.
    pub fn window_complete(&self, pivot: usize) -> bool {
        self.state == TriggerState::Capturing && pivot == self.capture_start
    }
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRequest;

    fn config(mode: TriggerMode, threshold: u32) -> Configuration {
        Configuration::DEFAULT
            .apply(&ConfigRequest {
                trig_mode: Some(mode),
                trig_threshold: Some(threshold),
                n_samples: Some(100),
                ..Default::default()
            })
            .0
    }

    /// Feed single-channel samples to an armed engine and count fires
    fn fires(engine: &mut TriggerEngine, config: &Configuration, values: &[u16]) -> usize {
        let mut fired = 0;
        for (slot, &value) in values.iter().enumerate() {
            if let Some(TriggerEvent::Fired { .. }) =
                engine.observe(0, value, slot, config, config.buf_size())
            {
                fired += 1;
            }
            engine.on_cycle_complete(config.trig_mode());
        }
        fired
    }

    fn armed() -> TriggerEngine {
        let mut engine = TriggerEngine::new();
        engine.on_cycle_complete(TriggerMode::RisingEdge);
        assert_eq!(engine.state(), TriggerState::Armed);
        engine
    }

    #[test]
    fn capture_start_matches_reference_arithmetic() {
        assert_eq!(capture_start_index(50, 3, 1, 5, 2, 100), 42);
        assert_eq!(capture_start_index(2, 0, 1, 5, 2, 100), 91);
        assert_eq!(capture_start_index(98, 5, 0, 0, 1, 100), 3);
    }

    #[test]
    fn edge_crossings() {
        assert!(crossed(TriggerMode::RisingEdge, 498, 502, 500));
        assert!(crossed(TriggerMode::RisingEdge, 499, 500, 500));
        assert!(!crossed(TriggerMode::RisingEdge, 502, 498, 500));
        assert!(!crossed(TriggerMode::RisingEdge, 500, 502, 500));
        assert!(crossed(TriggerMode::FallingEdge, 502, 498, 500));
        assert!(!crossed(TriggerMode::FallingEdge, 498, 502, 500));
        assert!(crossed(TriggerMode::EitherEdge, 498, 502, 500));
        assert!(crossed(TriggerMode::EitherEdge, 502, 498, 500));
        assert!(!crossed(TriggerMode::Live, 0, 1023, 500));
    }

    #[test]
    fn rising_edge_fires_once() {
        let config = config(TriggerMode::RisingEdge, 500);
        assert_eq!(fires(&mut armed(), &config, &[498, 502]), 1);
        assert_eq!(fires(&mut armed(), &config, &[502, 498]), 0);
        // Already capturing: later crossings are ignored
        assert_eq!(fires(&mut armed(), &config, &[498, 502, 400, 600]), 1);
    }

    #[test]
    fn either_edge_fires_both_ways() {
        let config = config(TriggerMode::EitherEdge, 500);
        assert_eq!(fires(&mut armed(), &config, &[498, 502]), 1);
        assert_eq!(fires(&mut armed(), &config, &[502, 498]), 1);
    }

    #[test]
    fn settling_blanks_the_first_cycles() {
        let config = config(TriggerMode::RisingEdge, 500);
        let mut engine = TriggerEngine::new();
        engine.reset(6);
        // Crossings on cycles 2, 4 and 6 fall inside the blind period
        let blanked = [0, 600, 0, 600, 0, 600];
        assert_eq!(fires(&mut engine, &config, &blanked), 0);
        assert_eq!(engine.state(), TriggerState::Armed);
        assert_eq!(fires(&mut engine, &config, &[0, 600]), 1);
    }

    #[test]
    fn delay_counts_trigger_channel_samples() {
        let (config, _) = config(TriggerMode::RisingEdge, 500).apply(&ConfigRequest {
            acquisition_delay: Some(2),
            ..Default::default()
        });
        let mut engine = armed();
        engine.observe(0, 0, 0, &config, 100);
        assert!(matches!(
            engine.observe(0, 600, 1, &config, 100),
            Some(TriggerEvent::Fired { capture_start: 3 })
        ));
        assert_eq!(engine.state(), TriggerState::DelayCounting { elapsed: 0 });
        // Other channels do not count
        assert_eq!(engine.observe(1, 0, 2, &config, 100), None);
        assert_eq!(engine.observe(0, 0, 2, &config, 100), None);
        assert_eq!(
            engine.observe(0, 0, 3, &config, 100),
            Some(TriggerEvent::DelayElapsed)
        );
        assert_eq!(engine.state(), TriggerState::Capturing);
        assert!(engine.window_complete(3));
        assert!(!engine.window_complete(4));
    }

    #[test]
    fn external_pulse_fires_on_next_trigger_sample() {
        let config = config(TriggerMode::External, 500);
        let mut engine = TriggerEngine::new();
        assert!(!engine.external_edge(), "idle engine must drop pulses");

        engine.on_cycle_complete(TriggerMode::External);
        assert!(engine.external_edge());
        assert!(!engine.external_edge(), "second pulse is a duplicate");
        assert!(matches!(
            engine.observe(0, 10, 7, &config, 100),
            Some(TriggerEvent::Fired { capture_start: 7 })
        ));
        assert!(!engine.external_edge());
    }

    #[test]
    fn live_mode_never_arms() {
        let mut engine = TriggerEngine::new();
        engine.on_cycle_complete(TriggerMode::Live);
        assert_eq!(engine.state(), TriggerState::Idle);
    }

    #[test]
    fn reset_drops_pending_capture() {
        let config = config(TriggerMode::RisingEdge, 500);
        let mut engine = armed();
        assert_eq!(fires(&mut engine, &config, &[0, 600]), 1);
        engine.reset(0);
        assert_eq!(engine.state(), TriggerState::Idle);
        engine.on_cycle_complete(config.trig_mode());
        assert_eq!(fires(&mut engine, &config, &[0, 600]), 1);
    }
}
