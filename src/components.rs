// SPDX-License-Identifier: Apache-2.0

//! Board components of the Raspberry Pi Pico used by the firmware.
//!
//! Each component owns its HAL peripheral and lives in one of the static [`Mutex`] cells of
//! [`interrupt`](crate::interrupt) once the board is initialized.
//!
//! [`Mutex`]: critical_section::Mutex

use core::fmt;

use embedded_hal::{
    digital::{OutputPin, PinState},
    pwm::SetDutyCycle,
};
use embedded_hal_0_2::adc::OneShot;
use rp2040_hal::{
    adc::{AdcPin, TempSense},
    fugit::MicrosDurationU64,
    gpio::{
        bank0::{Gpio15, Gpio25, Gpio26, Gpio27, Gpio28, Gpio29},
        FunctionSioInput, FunctionSioOutput, Interrupt, Pin, PullDown, PullNone, PullUp,
    },
    pwm::{FreeRunning, Pwm3, Slice},
    timer::{Alarm, Alarm0, Instant},
    usb::UsbBus,
    Adc, Timer,
};
use usb_device::{
    class_prelude::UsbBusAllocator,
    device::{StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbDeviceState, UsbVidPid},
    UsbError,
};
use usbd_serial::{SerialPort, USB_CLASS_CDC};

use crate::{
    clock::{ClockPlan, PwmSetting},
    config::Resolution,
};

/// Analog input on an ADC-capable GPIO
type AnalogPin<P> = AdcPin<Pin<P, FunctionSioInput, PullNone>>;

/// Physical inputs behind the logical channels: GPIO26..=29, then the temperature sensor
pub const PHYSICAL_INPUTS: usize = 5;

/// ADC with its four external inputs and the internal temperature sensor
pub struct AdcBank {
    /// Converter
    adc: Adc,
    /// GPIO26 (ADC0)
    adc0: AnalogPin<Gpio26>,
    /// GPIO27 (ADC1)
    adc1: AnalogPin<Gpio27>,
    /// GPIO28 (ADC2)
    adc2: AnalogPin<Gpio28>,
    /// GPIO29 (ADC3, VSYS/3 on the Pico)
    adc3: AnalogPin<Gpio29>,
    /// Internal temperature sensor (ADC4)
    temp_sensor: TempSense,
}

impl AdcBank {
    /// Take ownership of the converter and its inputs
    pub fn new(
        adc: Adc,
        adc0: AnalogPin<Gpio26>,
        adc1: AnalogPin<Gpio27>,
        adc2: AnalogPin<Gpio28>,
        adc3: AnalogPin<Gpio29>,
        temp_sensor: TempSense,
    ) -> Self {
        Self {
            adc,
            adc0,
            adc1,
            adc2,
            adc3,
            temp_sensor,
        }
    }

    /// Convert logical `channel` and reduce the result to a 10-bit sample.
    ///
    /// Channel `n` reads physical input `n % PHYSICAL_INPUTS`. A failed conversion reads as 0.
    pub fn convert(&mut self, channel: usize, resolution: Resolution) -> u16 {
        let result = match channel % PHYSICAL_INPUTS {
            0 => nb::block!(self.adc.read(&mut self.adc0)),
            1 => nb::block!(self.adc.read(&mut self.adc1)),
            2 => nb::block!(self.adc.read(&mut self.adc2)),
            3 => nb::block!(self.adc.read(&mut self.adc3)),
            _ => nb::block!(self.adc.read(&mut self.temp_sensor)),
        };
        let raw12: u16 = result.unwrap_or_else(|_| {
            warn!("ADC conversion failed on channel {}", channel as u32);
            0
        });
        #[cfg(feature = "trace_samples")]
        trace!("ADC channel {} raw {}", channel as u32, raw12);
        resolution.quantize(raw12)
    }
}

/// Timer alarm pacing the conversions.
///
/// Deadlines are absolute, so the time spent in the interrupt handler does not accumulate as
/// drift.
pub struct SampleClock {
    /// Free-running µs counter
    timer: Timer,
    /// Alarm raising `TIMER_IRQ_0`
    alarm: Alarm0,
    /// Tick period
    tick: MicrosDurationU64,
    /// Time of the pending tick
    deadline: Instant,
}

impl SampleClock {
    /// Wrap `alarm` and start ticking according to `plan`
    pub fn new(timer: Timer, mut alarm: Alarm0, plan: ClockPlan) -> Self {
        alarm.enable_interrupt();
        let mut clock = Self {
            timer,
            alarm,
            tick: MicrosDurationU64::micros(1),
            deadline: timer.get_counter(),
        };
        clock.start(plan);
        clock
    }

    /// Restart ticking with a new plan, first tick one period from now
    pub fn start(&mut self, plan: ClockPlan) {
        self.tick = MicrosDurationU64::micros(u64::from(plan.tick_us));
        self.deadline = self.timer.get_counter() + self.tick;
        self.schedule();
        debug!(
            "sample clock: {} us ticks, {} per conversion",
            plan.tick_us, plan.ticks_per_conversion
        );
    }

    /// Acknowledge the alarm interrupt and schedule the following tick.
    ///
    /// If the deadline already passed, the schedule restarts from now instead of firing a burst
    /// of late ticks.
    pub fn rearm(&mut self) {
        self.alarm.clear_interrupt();
        self.deadline += self.tick;
        let now = self.timer.get_counter();
        if self.deadline <= now {
            self.deadline = now + self.tick;
        }
        self.schedule();
    }

    /// Program the alarm for `deadline`
    fn schedule(&mut self) {
        if self.alarm.schedule_at(self.deadline).is_err() {
            error!("sample clock: unable to schedule alarm");
        }
    }
}

/// External trigger input on GPIO15, active on a falling edge
pub struct ExternalTrigger {
    /// Input with pull-up
    pin: Pin<Gpio15, FunctionSioInput, PullUp>,
}

impl ExternalTrigger {
    /// Enable the falling-edge interrupt on `pin`
    pub fn new(pin: Pin<Gpio15, FunctionSioInput, PullUp>) -> Self {
        pin.set_interrupt_enabled(Interrupt::EdgeLow, true);
        Self { pin }
    }

    /// Check and clear a latched falling edge
    pub fn take_edge(&mut self) -> bool {
        if self.pin.interrupt_status(Interrupt::EdgeLow) {
            self.pin.clear_interrupt(Interrupt::EdgeLow);
            true
        } else {
            false
        }
    }
}

/// 50% duty square wave on GPIO22, for probing the inputs
pub struct SquareWave {
    /// PWM slice 3, channel A drives the pin
    slice: Slice<Pwm3, FreeRunning>,
    /// System clock frequency feeding the slice
    sys_hz: u32,
    /// Period currently produced, 0 when off
    period_us: u32,
}

impl SquareWave {
    /// Stopped generator on `slice`. Channel A must already be routed to its pin.
    pub fn new(mut slice: Slice<Pwm3, FreeRunning>, sys_hz: u32) -> Self {
        slice.disable();
        Self {
            slice,
            sys_hz,
            period_us: 0,
        }
    }

    /// Produce a square wave of `period_us`, or stop the output for 0.
    ///
    /// Returns the period actually produced.
    pub fn set_period_us(&mut self, period_us: u32) -> u32 {
        let Some(setting) = PwmSetting::for_period(period_us, self.sys_hz) else {
            self.slice.disable();
            self.period_us = 0;
            debug!("square wave off");
            return 0;
        };

        self.slice.disable();
        self.slice.set_div_int(setting.div);
        self.slice.set_div_frac(0);
        self.slice.set_top(setting.top);
        if self.slice.channel_a.set_duty_cycle_percent(50).is_err() {
            warn!("square wave: unable to set duty cycle");
        }
        self.slice.enable();
        self.period_us = setting.period_us(self.sys_hz);
        info!("square wave at {} us", self.period_us);
        self.period_us
    }

    /// Period currently produced, 0 when off
    pub fn period_us(&self) -> u32 {
        self.period_us
    }
}

/// On-board LED, lit while a triggered capture is in progress
pub struct ActivityLed {
    /// GPIO25
    pin: Pin<Gpio25, FunctionSioOutput, PullDown>,
    /// Current state
    lit: bool,
}

impl ActivityLed {
    /// Take `pin`, initially off
    pub fn new(pin: Pin<Gpio25, FunctionSioOutput, PullDown>) -> Self {
        let mut led = Self { pin, lit: true };
        led.set(false);
        led
    }

    /// Switch the LED, touching the pin only on change
    pub fn set(&mut self, lit: bool) {
        if self.lit != lit {
            self.lit = lit;
            let _ = self.pin.set_state(PinState::from(lit));
        }
    }
}

/// USB CDC serial connection to the host
pub struct HostLink {
    /// USB device state machine
    device: UsbDevice<'static, UsbBus>,
    /// CDC-ACM class
    serial: SerialPort<'static, UsbBus>,
}

impl HostLink {
    /// Enumerate as a CDC-ACM serial device on `bus`
    pub fn new(bus: &'static UsbBusAllocator<UsbBus>) -> Self {
        let serial = SerialPort::new(bus);
        let builder = UsbDeviceBuilder::new(bus, UsbVidPid(0x16c0, 0x27dd)).device_class(USB_CLASS_CDC);
        let builder = match builder.strings(&[StringDescriptors::default()
            .manufacturer("pico_daq")
            .product("pico_daq data acquisition")
            .serial_number("DAQ0")])
        {
            Ok(builder) => builder,
            Err(_) => {
                warn!("USB string descriptors rejected");
                UsbDeviceBuilder::new(bus, UsbVidPid(0x16c0, 0x27dd)).device_class(USB_CLASS_CDC)
            }
        };
        Self {
            device: builder.build(),
            serial,
        }
    }

    /// Service the USB stack. Returns `true` if the serial port may have data.
    pub fn poll(&mut self) -> bool {
        self.device.poll(&mut [&mut self.serial])
    }

    /// Read received bytes into `buf`, returning how many arrived
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.serial.read(buf) {
            Ok(count) => count,
            Err(UsbError::WouldBlock) => 0,
            Err(_) => {
                warn!("USB serial read failed");
                0
            }
        }
    }

    /// Whether the host has configured the device
    pub fn is_connected(&self) -> bool {
        self.device.state() == UsbDeviceState::Configured
    }
}

/// Blocking writes. Output is dropped with [`fmt::Error`] while no host is connected.
impl fmt::Write for HostLink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut pending = s.as_bytes();
        while !pending.is_empty() {
            if !self.is_connected() {
                return Err(fmt::Error);
            }
            match self.serial.write(pending) {
                Ok(written) => pending = &pending[written..],
                Err(UsbError::WouldBlock) => {
                    self.poll();
                }
                Err(_) => return Err(fmt::Error),
            }
        }
        Ok(())
    }
}
