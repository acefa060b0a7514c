// Copyright 2021-2022 Kenta Ida
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![no_std]
#![no_main]

mod util;

#[cfg(feature = "defmt")]
use defmt_rtt as _;
#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use panic_probe as _;

#[rtic::app(device = rp_pico::hal::pac, peripherals = true)]
mod app {
    use hal::gpio::{Output, Pin, PushPull};
    use rp_pico::hal;

    use hal::timer::{Alarm, Alarm0};
    use hal::usb::UsbBus;
    use usb_device::bus::UsbBusAllocator;
    use usb_device::prelude::*;

    use embedded_hal::digital::v2::ToggleableOutputPin;
    use fugit::ExtU32;

    use usb_jtag::BlasterConfig;

    use crate::util::{initialize_usb, CycleDelay, PicoJtagPins, PicoUsbBlaster};

    type GpioUsbLed = hal::gpio::bank0::Gpio25;

    // FrameTimer period (100 Hz)
    const FRAME_TICK_US: u32 = 10_000;

    #[shared]
    struct Shared {
        usb_blaster: PicoUsbBlaster<'static>,
    }

    #[local]
    struct Local {
        usb_bus: UsbDevice<'static, UsbBus>,
        usb_led: Pin<GpioUsbLed, Output<PushPull>>,
        frame_alarm: Alarm0,
    }

    #[init(local = [
        USB_ALLOCATOR: Option<UsbBusAllocator<UsbBus>> = None,
        ])]
    fn init(c: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut resets = c.device.RESETS;
        let sio = hal::Sio::new(c.device.SIO);
        let pins = rp_pico::Pins::new(
            c.device.IO_BANK0,
            c.device.PADS_BANK0,
            sio.gpio_bank0,
            &mut resets,
        );

        let mut watchdog = hal::Watchdog::new(c.device.WATCHDOG);
        let clocks = hal::clocks::init_clocks_and_plls(
            rp_pico::XOSC_CRYSTAL_FREQ,
            c.device.XOSC,
            c.device.CLOCKS,
            c.device.PLL_SYS,
            c.device.PLL_USB,
            &mut resets,
            &mut watchdog,
        )
        .ok()
        .unwrap();

        let usb_allocator = UsbBusAllocator::new(hal::usb::UsbBus::new(
            c.device.USBCTRL_REGS,
            c.device.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut resets,
        ));
        c.local.USB_ALLOCATOR.replace(usb_allocator);
        let usb_allocator = c.local.USB_ALLOCATOR.as_ref().unwrap();

        let config = BlasterConfig::default();
        let mut tck_pin = pins.gpio2.into_push_pull_output();
        let mut tms_pin = pins.gpio3.into_push_pull_output();
        let mut tdi_pin = pins.gpio4.into_push_pull_output();
        tck_pin.set_slew_rate(hal::gpio::OutputSlewRate::Fast);
        tms_pin.set_slew_rate(hal::gpio::OutputSlewRate::Fast);
        tdi_pin.set_slew_rate(hal::gpio::OutputSlewRate::Fast);
        let tdo_pin = pins.gpio5.into_floating_input();
        let jtag = PicoJtagPins::new(
            tck_pin,
            tms_pin,
            tdi_pin,
            tdo_pin,
            CycleDelay {},
            config.clock_wait_cycles,
        );
        let (usb_blaster, usb_bus) =
            initialize_usb(jtag, usb_allocator, &config, "00000000").unwrap();

        let mut timer = hal::Timer::new(c.device.TIMER, &mut resets);
        let mut frame_alarm = timer.alarm_0().unwrap();
        frame_alarm.schedule(FRAME_TICK_US.micros()).unwrap();
        frame_alarm.enable_interrupt();

        let usb_led = pins.led.into_push_pull_output();

        #[cfg(feature = "defmt")]
        defmt::info!("usb-jtag ready");

        (
            Shared { usb_blaster },
            Local {
                usb_bus,
                usb_led,
                frame_alarm,
            },
            init::Monotonics(),
        )
    }

    #[idle(shared = [usb_blaster])]
    fn idle(mut c: idle::Context) -> ! {
        loop {
            c.shared.usb_blaster.lock(|usb_blaster| {
                usb_blaster.process().ok();
            });
        }
    }

    #[task(
        binds = TIMER_IRQ_0,
        priority = 1,
        shared = [usb_blaster],
        local = [frame_alarm],
    )]
    fn frame_tick(mut c: frame_tick::Context) {
        let alarm = c.local.frame_alarm;
        alarm.clear_interrupt();
        alarm.schedule(FRAME_TICK_US.micros()).ok();

        c.shared.usb_blaster.lock(|usb_blaster| {
            usb_blaster.tick();
            usb_blaster.process().ok();
        });
    }

    #[task(
        binds = USBCTRL_IRQ,
        priority = 1,
        shared = [usb_blaster],
        local = [usb_bus, usb_led],
    )]
    fn usbctrl_irq(mut c: usbctrl_irq::Context) {
        let usb_bus = c.local.usb_bus;
        let poll_result = c.shared.usb_blaster.lock(|usb_blaster| {
            let poll_result = usb_bus.poll(&mut [usb_blaster]);
            usb_blaster.process().ok();
            poll_result
        });
        if poll_result {
            c.local.usb_led.toggle().ok();
        }
    }
}
