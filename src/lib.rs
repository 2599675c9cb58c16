//! This [RP2040](https://docs.rs/rp2040-hal) project turns a Raspberry Pi Pico into a small
//! multi-channel data acquisition unit: an interrupt-paced ADC samples up to six multiplexed
//! channels into a circular buffer, and a trigger engine cuts out capture windows with pre-trigger
//! history. A host drives it over USB serial with one-letter commands (see [`protocol`]).
//!
//! The acquisition core ([`acquisition`], [`buffer`], [`trigger`], [`scheduler`], [`clock`]) is
//! hardware independent and tested on the host. Board code lives behind the `firmware` feature.
//!
//! ## Crate features
//!
//! - `firmware`: Board support ([`components`]) and the binary crate. Pulls in the RP2040 HAL,
//!   USB serial, and `defmt` logging over RTT.
//! - `defmt`: Log through [`defmt`](https://docs.rs/defmt) instead of the
//!   [`log`](https://docs.rs/log) facade. Enabled by `firmware`.
//! - `trace_samples`: Logs every stored sample and every ADC conversion. Very noisy!
//!
//! ## Data flow
//!
//! ```text
//! TIMER_IRQ_0 -> interrupt::sample_tick -> Acquisition::on_conversion
//!                                            |- SampleBuffer::write
//!                                            |- TriggerEngine::observe
//!                                            '- ChannelScheduler::advance
//! main loop   -> interrupt::with_sampling_suspended
//!                  |- Acquisition::apply        (commands)
//!                  |- Acquisition::take_live    (live mode)
//!                  '- Acquisition::take_window  (then acknowledge)
//! ```
//!
//! ## Demo
//!
//! Driving the acquisition core by hand, as the sampling interrupt would:
//!
//! ```
//! use pico_daq::{
//!     acquisition::Acquisition,
//!     config::{ConfigRequest, TriggerMode},
//! };
//!
//! let mut acquisition = Acquisition::new();
//! acquisition.apply(&ConfigRequest {
//!     n_channels: Some(1),
//!     n_samples: Some(4),
//!     pre_trigger: Some(1),
//!     trig_mode: Some(TriggerMode::RisingEdge),
//!     trig_threshold: Some(500),
//!     ..Default::default()
//! });
//!
//! for value in [100, 200, 300, 600, 700, 800, 900] {
//!     acquisition.on_conversion(value);
//! }
//! let window = acquisition.take_window().unwrap();
//! assert_eq!(window.raw(), &[300, 600, 700, 800]);
//! assert_eq!(window.timestamp_us(1), 0);
//! ```

// Copyright 2024 The pico_daq developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg), feature(doc_cfg_hide))]

#[macro_use]
mod fmt;

pub mod acquisition;
pub mod buffer;
pub mod calibration;
pub mod clock;
#[cfg(feature = "firmware")]
pub mod components;
pub mod config;
pub mod interrupt;
pub mod output;
pub mod protocol;
pub mod scheduler;
pub mod trigger;
