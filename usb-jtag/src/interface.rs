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

use num_enum::{IntoPrimitive, TryFromPrimitive};
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, RequestType};
use usb_device::device::DEFAULT_ALTERNATE_SETTING;
use usb_device::Result;

use crate::eeprom::Eeprom;
use crate::framer::MAX_PACKET_SIZE;
use crate::link::{BulkPipe, Purge};

const USB_IF_CLASS_VENDOR: u8 = 0xff;
const USB_IF_SUBCLASS_VENDOR: u8 = 0xff;
const USB_IF_PROTOCOL_VENDOR: u8 = 0xff;

/// Endpoint addresses of FT245 channel A, which host drivers open by number.
pub const IN_EP_ADDRESS: u8 = 0x81;
pub const OUT_EP_ADDRESS: u8 = 0x02;

/// FTDI SIO vendor requests.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SioRequest {
    Reset = 0x00,
    ModemCtrl = 0x01,
    SetFlowCtrl = 0x02,
    SetBaudRate = 0x03,
    SetData = 0x04,
    PollModemStatus = 0x05,
    SetLatencyTimer = 0x09,
    GetLatencyTimer = 0x0a,
    SetBitMode = 0x0b,
    ReadEeprom = 0x90,
    WriteEeprom = 0x91,
    EraseEeprom = 0x92,
}

pub struct BlasterInterface<'a, B: UsbBus, E: Eeprom> {
    interface: InterfaceNumber,
    name_string: StringIndex,
    in_ep: EndpointIn<'a, B>,
    out_ep: EndpointOut<'a, B>,
    eeprom: E,
    modem_status: [u8; 2],
    latency_timer: u8,
}

impl<'a, B: UsbBus, E: Eeprom> BlasterInterface<'a, B, E> {
    pub fn new(
        alloc: &'a UsbBusAllocator<B>,
        eeprom: E,
        modem_status: [u8; 2],
        latency_timer: u8,
    ) -> Result<Self> {
        Ok(BlasterInterface {
            interface: alloc.interface(),
            name_string: alloc.string(),
            in_ep: alloc.alloc(
                Some(EndpointAddress::from(IN_EP_ADDRESS)),
                EndpointType::Bulk,
                MAX_PACKET_SIZE as u16,
                0,
            )?,
            out_ep: alloc.alloc(
                Some(EndpointAddress::from(OUT_EP_ADDRESS)),
                EndpointType::Bulk,
                MAX_PACKET_SIZE as u16,
                0,
            )?,
            eeprom,
            modem_status,
            latency_timer,
        })
    }

    pub fn latency_timer(&self) -> u8 {
        self.latency_timer
    }

    /// Handles a vendor OUT request. Returns the purge selector when the host issued an
    /// SIO reset, which also starts the link.
    pub fn vendor_out(&mut self, xfer: ControlOut<B>) -> Option<Purge> {
        let request = *xfer.request();
        if request.request_type != RequestType::Vendor || request.recipient != Recipient::Device {
            return None;
        }
        let command = SioRequest::try_from(request.request).ok();
        #[cfg(feature = "defmt")]
        defmt::debug!("vendor out {:#x} value={:#x}", request.request, request.value);
        // The FT245 acknowledges every vendor OUT request, known or not.
        xfer.accept().ok();
        match command {
            Some(SioRequest::Reset) => Some(Purge::try_from(request.value).unwrap_or(Purge::All)),
            Some(SioRequest::SetLatencyTimer) => {
                self.latency_timer = (request.value & 0xff) as u8;
                None
            }
            _ => None,
        }
    }
}

impl<B: UsbBus, E: Eeprom> BulkPipe for BlasterInterface<'_, B, E> {
    fn read_packet(&mut self, data: &mut [u8]) -> Result<usize> {
        self.out_ep.read(data)
    }
    fn write_packet(&mut self, data: &[u8]) -> Result<usize> {
        self.in_ep.write(data)
    }
}

impl<B: UsbBus, E: Eeprom> UsbClass<B> for BlasterInterface<'_, B, E> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        writer.interface_alt(
            self.interface,
            DEFAULT_ALTERNATE_SETTING,
            USB_IF_CLASS_VENDOR,
            USB_IF_SUBCLASS_VENDOR,
            USB_IF_PROTOCOL_VENDOR,
            Some(self.name_string),
        )?;
        writer.endpoint(&self.in_ep)?;
        writer.endpoint(&self.out_ep)?;
        Ok(())
    }

    fn get_string(&self, index: StringIndex, lang_id: u16) -> Option<&str> {
        let _ = lang_id;
        if index == self.name_string {
            Some("USB-Blaster")
        } else {
            None
        }
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let request = *xfer.request();
        if request.request_type != RequestType::Vendor || request.recipient != Recipient::Device {
            return;
        }
        let word;
        let latency = [self.latency_timer];
        let response: &[u8] = match SioRequest::try_from(request.request) {
            Ok(SioRequest::GetLatencyTimer) => &latency,
            Ok(SioRequest::ReadEeprom) => {
                word = self.eeprom.read_word(request.index);
                &word
            }
            // Modem status doubles as the answer to anything else the host asks.
            _ => &self.modem_status,
        };
        let length = core::cmp::min(response.len(), request.length as usize);
        xfer.accept_with(&response[..length]).ok();
    }
}
