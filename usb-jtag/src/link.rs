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

use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use usb_device::UsbError;

use crate::bitbang::{JtagPort, JtagShifter};
use crate::decoder::{CommandDecoder, Effect};
use crate::error::BlasterError;
use crate::framer::{OutputFramer, MAX_PACKET_SIZE, OUT_BUFFER_LEN};

/// Inbound packets are only accepted while a worst case packet of captures still fits.
pub const INBOUND_HEADROOM: usize = MAX_PACKET_SIZE - 1;

/// The pair of bulk endpoints the pump talks through.
pub trait BulkPipe {
    fn read_packet(&mut self, data: &mut [u8]) -> usb_device::Result<usize>;
    fn write_packet(&mut self, data: &[u8]) -> usb_device::Result<usize>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    Active,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// SIO reset from the host driver.
    Start,
    /// USB bus reset or re-enumeration.
    BusReset,
}

impl LinkState {
    pub fn next(self, event: LinkEvent) -> Self {
        match event {
            LinkEvent::Start => LinkState::Active,
            LinkEvent::BusReset => LinkState::Idle,
        }
    }
}

/// `wValue` of the SIO reset request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Purge {
    All = 0,
    /// Device to host data.
    Outbound = 1,
    /// Host to device data.
    Inbound = 2,
}

/// All protocol state of one session.
pub struct LinkContext {
    state: LinkState,
    decoder: CommandDecoder,
    framer: OutputFramer,
    next_in_packet: Vec<u8, MAX_PACKET_SIZE>,
}

impl LinkContext {
    pub fn new(frame_marker: [u8; 2]) -> Self {
        Self {
            state: LinkState::Idle,
            decoder: CommandDecoder::new(),
            framer: OutputFramer::new(frame_marker),
            next_in_packet: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.framer.pending()
    }

    pub fn overflow_count(&self) -> u32 {
        self.framer.overflow_count()
    }

    pub fn has_headroom(&self) -> bool {
        self.framer.pending() < OUT_BUFFER_LEN - INBOUND_HEADROOM
    }

    pub fn tick(&mut self) {
        self.framer.tick();
    }

    fn transition(&mut self, event: LinkEvent) {
        let next = self.state.next(event);
        if next != self.state {
            #[cfg(feature = "defmt")]
            defmt::info!("link {} -> {} on {}", self.state, next, event);
            self.state = next;
        }
    }

    pub fn start(&mut self, purge: Purge) {
        match purge {
            Purge::All => {
                self.decoder.reset();
                self.purge_outbound();
            }
            Purge::Outbound => self.purge_outbound(),
            Purge::Inbound => self.decoder.reset(),
        }
        self.transition(LinkEvent::Start);
    }

    pub fn bus_reset(&mut self) {
        self.decoder.reset();
        self.framer.reset();
        self.next_in_packet.clear();
        self.transition(LinkEvent::BusReset);
    }

    fn purge_outbound(&mut self) {
        self.framer.purge();
        self.next_in_packet.clear();
    }

    /// Runs every byte of an inbound packet through the decoder, in order.
    pub fn process_inbound<P: JtagPort>(&mut self, port: &mut P, packet: &[u8]) {
        for byte in packet.iter() {
            let captured = match self.decoder.decode(*byte) {
                Effect::SetPins { pins, capture } => {
                    port.apply_pins(&pins);
                    if capture {
                        Some(0x02 | port.read_tdo() as u8)
                    } else {
                        None
                    }
                }
                Effect::BeginRun(_) => None,
                Effect::ContinueRun {
                    data,
                    capture: true,
                } => Some(port.shift_in_out(data)),
                Effect::ContinueRun {
                    data,
                    capture: false,
                } => {
                    port.shift_out(data);
                    None
                }
            };
            if let Some(value) = captured {
                // Counted and logged by the framer.
                self.framer.enqueue(value).ok();
            }
        }
    }

    /// One pump step: at most one IN packet and one OUT packet.
    pub fn poll<P: JtagPort, I: BulkPipe>(
        &mut self,
        port: &mut P,
        pipe: &mut I,
    ) -> Result<(), BlasterError> {
        if self.state == LinkState::Idle {
            return Ok(());
        }
        self.send_next_packet(pipe)?;

        if self.has_headroom() {
            let mut packet = [0u8; MAX_PACKET_SIZE];
            match pipe.read_packet(&mut packet) {
                Ok(size) => self.process_inbound(port, &packet[..size]),
                Err(UsbError::WouldBlock) => (),
                Err(err) => {
                    #[cfg(feature = "defmt")]
                    defmt::error!("bulk OUT read failed: {}", defmt::Debug2Format(&err));
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    fn send_next_packet<I: BulkPipe>(&mut self, pipe: &mut I) -> Result<(), BlasterError> {
        if self.next_in_packet.is_empty()
            && self.framer.drain_into(&mut self.next_in_packet).is_none()
        {
            return Ok(());
        }
        match pipe.write_packet(&self.next_in_packet) {
            Ok(_) => {
                self.next_in_packet.clear();
                Ok(())
            }
            // Keep the staged packet for the next invocation.
            Err(UsbError::WouldBlock) => Ok(()),
            Err(err) => {
                #[cfg(feature = "defmt")]
                defmt::error!("bulk IN write failed: {}", defmt::Debug2Format(&err));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod pipe {
    use super::BulkPipe;
    use std::collections::VecDeque;
    use std::vec::Vec;
    use usb_device::UsbError;

    #[derive(Default)]
    pub struct MockPipe {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
        pub busy: bool,
        pub fail: Option<UsbError>,
    }

    impl MockPipe {
        pub fn push_inbound(&mut self, packet: &[u8]) {
            self.inbound.push_back(packet.to_vec());
        }
    }

    impl BulkPipe for MockPipe {
        fn read_packet(&mut self, data: &mut [u8]) -> usb_device::Result<usize> {
            match self.inbound.pop_front() {
                Some(packet) => {
                    data[..packet.len()].copy_from_slice(&packet);
                    Ok(packet.len())
                }
                None => Err(UsbError::WouldBlock),
            }
        }

        fn write_packet(&mut self, data: &[u8]) -> usb_device::Result<usize> {
            if let Some(err) = self.fail.take() {
                return Err(err);
            }
            if self.busy {
                return Err(UsbError::WouldBlock);
            }
            self.written.push(data.to_vec());
            Ok(data.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pipe::MockPipe;
    use super::*;
    use crate::bitbang::trace::TracePort;
    use crate::framer::FRAME_MARKER;

    fn active_link() -> LinkContext {
        let mut link = LinkContext::new(FRAME_MARKER);
        link.start(Purge::All);
        link
    }

    #[test]
    fn transitions() {
        assert_eq!(LinkState::Idle.next(LinkEvent::Start), LinkState::Active);
        assert_eq!(LinkState::Active.next(LinkEvent::Start), LinkState::Active);
        assert_eq!(LinkState::Active.next(LinkEvent::BusReset), LinkState::Idle);
        assert_eq!(LinkState::Idle.next(LinkEvent::BusReset), LinkState::Idle);
    }

    #[test]
    fn idle_link_touches_nothing() {
        let mut link = LinkContext::new(FRAME_MARKER);
        let mut port = TracePort::default();
        let mut pipe = MockPipe::default();
        pipe.push_inbound(&[0x41]);
        link.tick();
        assert!(link.poll(&mut port, &mut pipe).is_ok());
        assert_eq!(pipe.inbound.len(), 1);
        assert!(pipe.written.is_empty());
        assert!(port.writes.is_empty());
    }

    #[test]
    fn write_only_shift_enqueues_nothing() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x03, 0x82, 0xAA, 0xFF]);
        assert_eq!(link.pending(), 0);
        // One edge from the bit-bang byte, then two shifted bytes.
        assert_eq!(port.rising_edges(), 1 + 16);
        assert_eq!(
            &port.clocked_tdi[1..9],
            &[false, true, false, true, false, true, false, true]
        );
        assert!(port.clocked_tdi[9..].iter().all(|bit| *bit));
        assert!(!link.decoder.in_run());
    }

    #[test]
    fn capturing_shift_enqueues_one_byte() {
        let mut link = active_link();
        let tdo = [false, true, true, false, false, false, false, true];
        let mut port = TracePort::with_tdo(&tdo);
        let mut pipe = MockPipe::default();
        pipe.push_inbound(&[0xC1, 0x5A]);
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(link.pending(), 1);
        assert_eq!(port.rising_edges(), 8);

        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written, [vec![0x31, 0x60, 0b1000_0110]]);
        assert_eq!(link.pending(), 0);
    }

    #[test]
    fn bit_bang_capture_reports_tdo() {
        let mut link = active_link();
        let mut port = TracePort::with_tdo(&[true, false]);
        link.process_inbound(&mut port, &[0x41, 0x00, 0x40]);
        let mut pipe = MockPipe::default();
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written, [vec![0x31, 0x60, 0x03, 0x02]]);
        assert_eq!(port.tdo_reads, 2);
    }

    #[test]
    fn shift_run_spans_packets() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x82, 0x11]);
        assert!(link.decoder.in_run());
        link.process_inbound(&mut port, &[0x22, 0x01]);
        assert!(!link.decoder.in_run());
        assert_eq!(port.rising_edges(), 16 + 1);
        assert!(port.pins.tck);
    }

    #[test]
    fn zero_length_run_is_a_no_op() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x80, 0x41]);
        assert!(port.clocked_tdi.len() == 1);
        assert_eq!(link.pending(), 1);
    }

    #[test]
    fn keepalive_once_per_tick_when_idle() {
        let mut link = active_link();
        let mut port = TracePort::default();
        let mut pipe = MockPipe::default();
        link.poll(&mut port, &mut pipe).unwrap();
        assert!(pipe.written.is_empty());

        link.tick();
        link.poll(&mut port, &mut pipe).unwrap();
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written, [FRAME_MARKER.to_vec()]);
    }

    #[test]
    fn data_packet_replaces_keepalive_for_the_period() {
        let mut link = active_link();
        let mut port = TracePort::with_tdo(&[true]);
        let mut pipe = MockPipe::default();
        pipe.push_inbound(&[0x41]);
        link.poll(&mut port, &mut pipe).unwrap();
        link.tick();
        link.poll(&mut port, &mut pipe).unwrap();
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written, [vec![0x31, 0x60, 0x03]]);

        link.tick();
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written.len(), 2);
        assert_eq!(pipe.written[1], FRAME_MARKER.to_vec());
    }

    #[test]
    fn run_header_leaves_pins_alone() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x85]);
        assert!(port.writes.is_empty());
        assert_eq!(port.tdo_reads, 0);
        assert_eq!(link.decoder.run().remaining, 5);
    }

    #[test]
    fn busy_endpoint_defers_and_headroom_gates_reads() {
        let mut link = active_link();
        let mut port = TracePort::default();
        let mut pipe = MockPipe::default();
        for i in 0..255u8 {
            link.framer.enqueue(i).unwrap();
        }
        pipe.busy = true;
        pipe.push_inbound(&[0x41]);

        // 62 bytes staged, 193 left behind: no room for another inbound packet.
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(link.pending(), 193);
        assert_eq!(pipe.inbound.len(), 1);
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(link.pending(), 193);
        assert!(pipe.written.is_empty());

        pipe.busy = false;
        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written.len(), 1);
        assert_eq!(pipe.written[0][2], 0);
        assert_eq!(pipe.written[0].len(), MAX_PACKET_SIZE);
        assert_eq!(pipe.inbound.len(), 1);

        link.poll(&mut port, &mut pipe).unwrap();
        assert_eq!(pipe.written[1][2], 62);
        assert!(pipe.inbound.is_empty());
        assert_eq!(link.pending(), 193 - 62 + 1);
    }

    #[test]
    fn pending_never_exceeds_buffer() {
        let mut link = active_link();
        let mut port = TracePort::default();
        let run = [0xFF; 64];
        for _ in 0..5 {
            link.process_inbound(&mut port, &run);
        }
        assert_eq!(link.pending(), OUT_BUFFER_LEN);
        assert_eq!(link.overflow_count(), 5 * 63 - OUT_BUFFER_LEN as u32);
    }

    #[test]
    fn endpoint_error_is_reported() {
        let mut link = active_link();
        let mut port = TracePort::default();
        let mut pipe = MockPipe::default();
        pipe.fail = Some(UsbError::InvalidEndpoint);
        link.tick();
        assert_eq!(
            link.poll(&mut port, &mut pipe),
            Err(BlasterError::InternalError)
        );
    }

    #[test]
    fn purge_selects_direction() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x41, 0x85, 0x00]);
        assert_eq!(link.pending(), 1);

        link.start(Purge::Inbound);
        assert_eq!(link.pending(), 1);
        assert!(!link.decoder.in_run());

        link.start(Purge::Outbound);
        assert_eq!(link.pending(), 0);
        assert_eq!(link.state(), LinkState::Active);
    }

    #[test]
    fn bus_reset_returns_to_idle() {
        let mut link = active_link();
        let mut port = TracePort::default();
        link.process_inbound(&mut port, &[0x41, 0x85]);
        link.tick();
        link.bus_reset();
        assert_eq!(link.state(), LinkState::Idle);
        assert_eq!(link.pending(), 0);
        assert!(!link.decoder.in_run());

        link.start(Purge::All);
        let mut pipe = MockPipe::default();
        link.poll(&mut port, &mut pipe).unwrap();
        assert!(pipe.written.is_empty());
    }
}
