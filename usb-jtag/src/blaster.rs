// Copyright 2021 Kenta Ida
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

use usb_device::class_prelude::*;

use crate::bitbang::JtagPort;
use crate::eeprom::Eeprom;
use crate::error::BlasterError;
use crate::framer::FRAME_MARKER;
use crate::interface::BlasterInterface;
use crate::link::{LinkContext, LinkState};

pub const USB_VID_ALTERA: u16 = 0x09fb;
pub const USB_PID_BLASTER: u16 = 0x6001;
pub const USB_DEVICE_RELEASE: u16 = 0x0400;

pub struct BlasterConfig {
    pub frame_marker: [u8; 2],
    pub modem_status: [u8; 2],
    pub latency_timer: u8,
    /// Half TCK period handed to the board's delay function.
    pub clock_wait_cycles: u32,
}

impl Default for BlasterConfig {
    fn default() -> Self {
        Self {
            frame_marker: FRAME_MARKER,
            modem_status: [0x36, 0x83],
            latency_timer: 16,
            clock_wait_cycles: 0,
        }
    }
}

/// USB-Blaster compatible JTAG adapter function.
///
/// Call [`UsbBlaster::process`] after every `UsbDevice::poll` and from the idle loop,
/// and [`UsbBlaster::tick`] from a 100 Hz timer.
pub struct UsbBlaster<'a, B, P, E>
where
    B: UsbBus,
    P: JtagPort,
    E: Eeprom,
{
    inner: BlasterInterface<'a, B, E>,
    port: P,
    link: LinkContext,
}

impl<'a, B, P, E> UsbBlaster<'a, B, P, E>
where
    B: UsbBus,
    P: JtagPort,
    E: Eeprom,
{
    pub fn new(
        alloc: &'a UsbBusAllocator<B>,
        port: P,
        eeprom: E,
        config: &BlasterConfig,
    ) -> usb_device::Result<Self> {
        Ok(UsbBlaster {
            inner: BlasterInterface::new(
                alloc,
                eeprom,
                config.modem_status,
                config.latency_timer,
            )?,
            port,
            link: LinkContext::new(config.frame_marker),
        })
    }

    pub fn process(&mut self) -> core::result::Result<(), BlasterError> {
        self.link.poll(&mut self.port, &mut self.inner)
    }

    pub fn tick(&mut self) {
        self.link.tick();
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    pub fn pending(&self) -> usize {
        self.link.pending()
    }

    pub fn overflow_count(&self) -> u32 {
        self.link.overflow_count()
    }

    pub fn latency_timer(&self) -> u8 {
        self.inner.latency_timer()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

impl<B, P, E> UsbClass<B> for UsbBlaster<'_, B, P, E>
where
    B: UsbBus,
    P: JtagPort,
    E: Eeprom,
{
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        self.inner.get_configuration_descriptors(writer)
    }
    fn get_string(&self, index: StringIndex, lang_id: u16) -> Option<&str> {
        self.inner.get_string(index, lang_id)
    }
    fn reset(&mut self) {
        self.link.bus_reset();
    }
    fn control_in(&mut self, xfer: ControlIn<B>) {
        self.inner.control_in(xfer)
    }
    fn control_out(&mut self, xfer: ControlOut<B>) {
        if let Some(purge) = self.inner.vendor_out(xfer) {
            self.link.start(purge);
        }
    }
}
