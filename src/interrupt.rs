// SPDX-License-Identifier: Apache-2.0

//! Interrupt-shared state, plus the entry points the interrupt handlers call.
//!
//! Everything the sampling interrupt touches lives in a static [`Mutex`]. The main loop only
//! reaches it through [`with_sampling_suspended`], which masks interrupts for the duration of the
//! closure and unmasks them on every exit path. No other locking exists: the interrupt side never
//! blocks, it runs inside its own critical section while the main loop is held off.

use core::cell::RefCell;
use critical_section::{CriticalSection, Mutex};

use crate::{acquisition::Acquisition, config::Resolution};
#[cfg(feature = "firmware")]
use crate::components::{ActivityLed, AdcBank, ExternalTrigger, SampleClock, SquareWave};

/// Acquisition controller shared between the sampling interrupt and the main loop
pub static ACQUISITION: Mutex<RefCell<Acquisition>> =
    Mutex::new(RefCell::new(Acquisition::new()));

/// ADC inputs, for access in the sample clock interrupt
#[cfg(feature = "firmware")]
pub static ADC_BANK: Mutex<RefCell<Option<AdcBank>>> = Mutex::new(RefCell::new(None));
/// Timer alarm pacing the conversions
#[cfg(feature = "firmware")]
pub static SAMPLE_CLOCK: Mutex<RefCell<Option<SampleClock>>> = Mutex::new(RefCell::new(None));
/// External trigger input, for access in the GPIO interrupt
#[cfg(feature = "firmware")]
pub static EXTERNAL_TRIGGER: Mutex<RefCell<Option<ExternalTrigger>>> =
    Mutex::new(RefCell::new(None));
/// Square-wave generator, reprogrammed from the main loop
#[cfg(feature = "firmware")]
pub static SQUARE_WAVE: Mutex<RefCell<Option<SquareWave>>> = Mutex::new(RefCell::new(None));
/// Activity LED, lit while a triggered capture is pending
#[cfg(feature = "firmware")]
pub static ACTIVITY_LED: Mutex<RefCell<Option<ActivityLed>>> = Mutex::new(RefCell::new(None));

/// Run `f` on the shared [`Acquisition`] with the sampling interrupt held off.
///
/// Interrupts are masked on entry and restored when `f` returns, so the sampling context resumes
/// from whatever consistent state `f` left behind. Keep `f` short: conversions due while it runs
/// are delayed, not lost.
pub fn with_sampling_suspended<R>(f: impl FnOnce(&mut Acquisition) -> R) -> R {
    critical_section::with(|cs| f(&mut ACQUISITION.borrow_ref_mut(cs)))
}

/// Sample clock tick: convert the scheduled channel and feed the result to the controller.
///
/// `convert` receives the channel to sample and the configured resolution and returns the 10-bit
/// sample. It is not called while a captured window awaits readout.
pub fn sample_tick(cs: CriticalSection, convert: impl FnOnce(usize, Resolution) -> u16) {
    let mut acquisition = ACQUISITION.borrow_ref_mut(cs);
    if !acquisition.is_sampling() {
        return;
    }
    let channel = acquisition.current_channel();
    let value = convert(channel, acquisition.config().resolution());
    acquisition.on_conversion(value);
}

/// External trigger pulse observed
pub fn external_edge(cs: CriticalSection) {
    ACQUISITION.borrow_ref_mut(cs).on_external_edge();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigRequest, TriggerMode};

    #[test]
    fn interrupt_entry_points_drive_the_shared_controller() {
        with_sampling_suspended(|acquisition| {
            acquisition.apply(&ConfigRequest {
                n_channels: Some(2),
                n_samples: Some(3),
                trig_mode: Some(TriggerMode::External),
                ..Default::default()
            })
        });

        let mut requested = [0usize; 8];
        for (tick, channel) in requested.iter_mut().enumerate() {
            critical_section::with(|cs| {
                if tick == 2 {
                    external_edge(cs);
                }
                sample_tick(cs, |ch, resolution| {
                    assert_eq!(resolution, Resolution::TenBit);
                    *channel = ch;
                    100 + tick as u16
                })
            });
        }
        assert_eq!(requested, [0, 1, 0, 1, 0, 1, 0, 1]);

        // Fired on tick 2 (channel 0), window closes once the pivot wraps back to slot 2
        let window = with_sampling_suspended(|acquisition| acquisition.take_window()).unwrap();
        assert_eq!(window.raw(), &[102, 103, 104, 105, 106, 107]);

        critical_section::with(|cs| {
            sample_tick(cs, |_, _| panic!("no conversion while the window is pending"))
        });
        with_sampling_suspended(Acquisition::acknowledge);
        assert!(with_sampling_suspended(|acquisition| acquisition.is_sampling()));
    }
}
