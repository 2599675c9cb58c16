//! Firmware for a Raspberry Pi Pico acting as a multi-channel data acquisition unit, controlled
//! over USB serial.
#![no_std]
#![no_main]
#![doc(html_playground_url = "https://play.rust-lang.org/")]
#![warn(missing_docs)]

use core::fmt::Write;

use cortex_m::singleton;
use defmt::{debug, info, warn};
#[allow(unused_imports)]
use defmt_rtt as _;
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::{
    adc::AdcPin,
    clocks::init_clocks_and_plls,
    entry,
    fugit::RateExtU32,
    gpio::Pins,
    pac::{self, interrupt},
    prelude::*,
    pwm::Slices,
    usb::UsbBus,
    Adc, Sio, Timer, Watchdog,
};
use usb_device::class_prelude::UsbBusAllocator;

use pico_daq::{
    calibration::CalibrationTable,
    components::{ActivityLed, AdcBank, ExternalTrigger, HostLink, SampleClock, SquareWave},
    config::TriggerMode,
    interrupt::{
        external_edge, sample_tick, with_sampling_suspended, ACTIVITY_LED, ADC_BANK,
        EXTERNAL_TRIGGER, SAMPLE_CLOCK, SQUARE_WAVE,
    },
    output::{write_live, write_window},
    protocol::{write_settings, Command, LineDecoder},
    trigger::TriggerState,
};

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
/// External high-speed crystal on the pico board is 12Mhz
pub const XOSC_FREQ_HZ: u32 = 12_000_000;
/// Run the system clock at 48 MHz, plenty for USB servicing between conversions
pub const SYS_CLOCK_FREQ: u32 = 48_000_000;

/// Main operation loop
#[entry]
fn main() -> ! {
    info!("Data acquisition startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let mut clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    clocks
        .system_clock
        .configure_clock(&clocks.reference_clock, SYS_CLOCK_FREQ.Hz())
        .unwrap_or_else(|err| {
            warn!(
                "Unable to downscale clock speed: {}\nClocks will continue to run at {=u32}",
                err,
                clocks.system_clock.freq().to_Hz()
            )
        });
    let sys_hz = clocks.system_clock.freq().to_Hz();
    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // USB serial
    let usb_bus = singleton!(: UsbBusAllocator<UsbBus> = UsbBusAllocator::new(UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    )))
    .unwrap();
    let mut link = HostLink::new(usb_bus);

    // ADC inputs
    let mut adc = Adc::new(pac.ADC, &mut pac.RESETS);
    let temp_sensor = adc.take_temp_sensor().unwrap();
    let adc_bank = AdcBank::new(
        adc,
        AdcPin::new(pins.gpio26.into_floating_input()).unwrap(),
        AdcPin::new(pins.gpio27.into_floating_input()).unwrap(),
        AdcPin::new(pins.gpio28.into_floating_input()).unwrap(),
        AdcPin::new(pins.gpio29.into_floating_input()).unwrap(),
        temp_sensor,
    );

    // Square wave generator, off until requested
    let mut pwm_slices = Slices::new(pac.PWM, &mut pac.RESETS);
    pwm_slices.pwm3.channel_a.output_to(pins.gpio22);
    let square_wave = SquareWave::new(pwm_slices.pwm3, sys_hz);

    let external_trigger = ExternalTrigger::new(pins.gpio15.into_pull_up_input());
    let activity_led = ActivityLed::new(pins.gpio25.into_push_pull_output());

    // Sample clock
    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let alarm = timer.alarm_0().unwrap();
    let plan = with_sampling_suspended(|acquisition| acquisition.clock_plan());
    let sample_clock = SampleClock::new(timer, alarm, plan);

    debug!("critical_section: transfer components to mutex");
    critical_section::with(|cs| {
        ADC_BANK.replace(cs, Some(adc_bank));
        SQUARE_WAVE.replace(cs, Some(square_wave));
        EXTERNAL_TRIGGER.replace(cs, Some(external_trigger));
        ACTIVITY_LED.replace(cs, Some(activity_led));
        SAMPLE_CLOCK.replace(cs, Some(sample_clock));
    });
    unsafe {
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_0);
        pac::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
    }
    info!("Initialization complete, sampling");

    let mut decoder = LineDecoder::new();
    let mut calibrations = CalibrationTable::new();
    let mut rx = [0u8; 64];
    loop {
        if link.poll() {
            let count = link.read(&mut rx);
            for &byte in &rx[..count] {
                match decoder.push(byte) {
                    Some(Ok(command)) => execute(command, &mut link, &mut calibrations),
                    Some(Err(err)) => {
                        warn!("rejected command: {}", err);
                        let _ = writeln!(link, "E {}", err);
                    }
                    None => {}
                }
            }
        }

        let (config, live, window, state) = with_sampling_suspended(|acquisition| {
            (
                *acquisition.config(),
                acquisition.take_live(),
                acquisition.take_window(),
                acquisition.trigger_state(),
            )
        });

        if let (TriggerMode::Live, Some(live)) = (config.trig_mode(), live) {
            let _ = write_live(&mut link, &live, config.output(), &calibrations);
        }
        if let Some(window) = window {
            if write_window(&mut link, &window, config.output(), &calibrations).is_err() {
                warn!("capture window not delivered, no host connected");
            }
            with_sampling_suspended(|acquisition| acquisition.acknowledge());
        }

        critical_section::with(|cs| {
            if let Some(led) = ACTIVITY_LED.borrow_ref_mut(cs).as_mut() {
                led.set(state != TriggerState::Idle);
            }
        });
    }
}

/// Carry out one decoded host command
fn execute(command: Command, link: &mut HostLink, calibrations: &mut CalibrationTable) {
    match command {
        Command::Configure(request) => {
            with_sampling_suspended(|acquisition| {
                let flags = acquisition.apply(&request);
                if flags.clock {
                    let plan = acquisition.clock_plan();
                    critical_section::with(|cs| {
                        if let Some(clock) = SAMPLE_CLOCK.borrow_ref_mut(cs).as_mut() {
                            clock.start(plan);
                        }
                    });
                }
            });
            report_settings(link, calibrations);
        }
        Command::Calibrate {
            channel,
            calibration,
        } => {
            calibrations.set(channel, calibration);
            info!("channel {} calibration updated", channel as u32);
        }
        Command::SquareWave { period_us } => critical_section::with(|cs| {
            if let Some(square_wave) = SQUARE_WAVE.borrow_ref_mut(cs).as_mut() {
                square_wave.set_period_us(period_us);
            }
        }),
        Command::Settings => report_settings(link, calibrations),
    }
}

/// Print the active settings to the host
fn report_settings(link: &mut HostLink, calibrations: &CalibrationTable) {
    let config = with_sampling_suspended(|acquisition| *acquisition.config());
    let square_wave_us = critical_section::with(|cs| {
        SQUARE_WAVE
            .borrow_ref(cs)
            .as_ref()
            .map_or(0, SquareWave::period_us)
    });
    let _ = write_settings(link, &config, square_wave_us, calibrations);
}

/// Sample clock tick
#[interrupt]
fn TIMER_IRQ_0() {
    critical_section::with(|cs| {
        if let Some(clock) = SAMPLE_CLOCK.borrow_ref_mut(cs).as_mut() {
            clock.rearm();
        }
        if let Some(adc_bank) = ADC_BANK.borrow_ref_mut(cs).as_mut() {
            sample_tick(cs, |channel, resolution| {
                adc_bank.convert(channel, resolution)
            });
        }
    });
}

/// External trigger edge
#[interrupt]
fn IO_IRQ_BANK0() {
    critical_section::with(|cs| {
        let edge = EXTERNAL_TRIGGER
            .borrow_ref_mut(cs)
            .as_mut()
            .is_some_and(ExternalTrigger::take_edge);
        if edge {
            external_edge(cs);
        }
    });
}
