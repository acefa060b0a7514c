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

use rp_pico::hal;

use hal::gpio::{bank0, Floating, Input, Output, Pin, PushPull};
use hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::device::{UsbDevice, UsbDeviceBuilder, UsbVidPid};
use usb_jtag::bitbang::{DelayFunc, JtagPins};
use usb_jtag::{
    BlasterConfig, EepromImage, UsbBlaster, USB_DEVICE_RELEASE, USB_PID_BLASTER, USB_VID_ALTERA,
};

/// DelayFunc implementation which uses cortex_m::asm::delay
pub struct CycleDelay {}
impl DelayFunc for CycleDelay {
    fn cycle_delay(&self, cycles: u32) {
        cortex_m::asm::delay(cycles);
    }
}

// GPIO mappings
pub type GpioTck = bank0::Gpio2;
pub type GpioTms = bank0::Gpio3;
pub type GpioTdi = bank0::Gpio4;
pub type GpioTdo = bank0::Gpio5;

pub type PicoJtagPins = JtagPins<
    Pin<GpioTck, Output<PushPull>>,
    Pin<GpioTms, Output<PushPull>>,
    Pin<GpioTdi, Output<PushPull>>,
    Pin<GpioTdo, Input<Floating>>,
    CycleDelay,
>;

pub type PicoUsbBlaster<'a> = UsbBlaster<'a, UsbBus, PicoJtagPins, EepromImage>;

type PicoUsbBusAllocator = UsbBusAllocator<UsbBus>;

/// Initialize the USB-Blaster function and the USB device.
pub fn initialize_usb<'a>(
    jtag: PicoJtagPins,
    usb_allocator: &'a PicoUsbBusAllocator,
    config: &BlasterConfig,
    serial: &'a str,
) -> usb_device::Result<(PicoUsbBlaster<'a>, UsbDevice<'a, UsbBus>)> {
    let usb_blaster = UsbBlaster::new(usb_allocator, jtag, EepromImage::default(), config)?;
    let usb_bus = UsbDeviceBuilder::new(usb_allocator, UsbVidPid(USB_VID_ALTERA, USB_PID_BLASTER))
        .manufacturer("Altera")
        .product("USB-Blaster")
        .serial_number(serial)
        .device_release(USB_DEVICE_RELEASE)
        .max_packet_size_0(64)
        .build();
    Ok((usb_blaster, usb_bus))
}
