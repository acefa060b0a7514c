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

use embedded_hal::digital::v2::{InputPin, OutputPin};

// Pin assignment of a bit-bang command byte.
// Bit 0: TCK
// Bit 1: TMS
// Bit 2: nCE
// Bit 3: nCS
// Bit 4: TDI
// Bit 5: OE/LED
// TDO is the only line read back.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JtagLine {
    Tck,
    Tms,
    Tdi,
    Tdo,
    Nce,
    Ncs,
    Oe,
}

pub trait DelayFunc {
    fn cycle_delay(&self, cycles: u32);
}

/// Line level access to the adapter pins.
///
/// Everything above this trait (shifter, decoder, pump) is hardware independent,
/// so an in-memory implementation is enough to exercise the whole protocol.
pub trait JtagPort {
    fn set_line(&mut self, line: JtagLine, level: bool);
    fn read_line(&mut self, line: JtagLine) -> bool;
    /// Waits for half of a TCK period.
    fn clock_wait(&self);
}

/// Levels driven by a bit-bang command.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinState {
    pub tck: bool,
    pub tms: bool,
    pub tdi: bool,
    pub nce: bool,
    pub ncs: bool,
    pub oe: bool,
}

pub trait JtagShifter {
    fn apply_pins(&mut self, pins: &PinState);
    fn read_tdo(&mut self) -> bool;
    /// Shifts `data` out on TDI, LSB first. TDO is ignored.
    fn shift_out(&mut self, data: u8);
    /// Shifts `data` out on TDI, LSB first, and returns the eight TDO samples.
    /// The first sample ends up in bit 0.
    fn shift_in_out(&mut self, data: u8) -> u8;
}

fn write_bit<Port: JtagPort + ?Sized>(port: &mut Port, tdi: bool) {
    port.set_line(JtagLine::Tdi, tdi);
    port.clock_wait();
    port.set_line(JtagLine::Tck, true);
    port.clock_wait();
    port.set_line(JtagLine::Tck, false);
}

fn read_bit<Port: JtagPort + ?Sized>(port: &mut Port, tdi: bool) -> bool {
    port.set_line(JtagLine::Tdi, tdi);
    port.clock_wait();
    let value = port.read_line(JtagLine::Tdo);
    port.set_line(JtagLine::Tck, true);
    port.clock_wait();
    port.set_line(JtagLine::Tck, false);
    value
}

impl<Port: JtagPort> JtagShifter for Port {
    fn apply_pins(&mut self, pins: &PinState) {
        // TCK goes last so that a rising edge in this command sees the new TMS/TDI.
        self.set_line(JtagLine::Tms, pins.tms);
        self.set_line(JtagLine::Tdi, pins.tdi);
        self.set_line(JtagLine::Nce, pins.nce);
        self.set_line(JtagLine::Ncs, pins.ncs);
        self.set_line(JtagLine::Oe, pins.oe);
        self.set_line(JtagLine::Tck, pins.tck);
    }

    fn read_tdo(&mut self) -> bool {
        self.read_line(JtagLine::Tdo)
    }

    fn shift_out(&mut self, data: u8) {
        // A preceding bit-bang command may have left TCK high.
        self.set_line(JtagLine::Tck, false);
        let mut value = data;
        for _ in 0..8 {
            write_bit(self, value & 1 != 0);
            value >>= 1;
        }
    }

    fn shift_in_out(&mut self, data: u8) -> u8 {
        self.set_line(JtagLine::Tck, false);
        let mut value = data;
        for _ in 0..8 {
            let tdo = read_bit(self, value & 1 != 0);
            value = if tdo {
                (value >> 1) | 0x80
            } else {
                value >> 1
            };
        }
        value
    }
}

fn set_output<O: OutputPin>(pin: &mut O, output: bool) {
    if output {
        pin.set_high().ok();
    } else {
        pin.set_low().ok();
    }
}

/// Four GPIO lines driven by software.
///
/// nCE, nCS and OE are not wired on this adapter; commands touching them are accepted
/// and have no effect.
pub struct JtagPins<TckPin, TmsPin, TdiPin, TdoPin, DelayFn>
where
    TckPin: OutputPin,
    TmsPin: OutputPin,
    TdiPin: OutputPin,
    TdoPin: InputPin,
    DelayFn: DelayFunc,
{
    tck: TckPin,
    tms: TmsPin,
    tdi: TdiPin,
    tdo: TdoPin,
    cycle_delay: DelayFn,
    clock_wait_cycles: u32,
}

impl<TckPin, TmsPin, TdiPin, TdoPin, DelayFn> JtagPins<TckPin, TmsPin, TdiPin, TdoPin, DelayFn>
where
    TckPin: OutputPin,
    TmsPin: OutputPin,
    TdiPin: OutputPin,
    TdoPin: InputPin,
    DelayFn: DelayFunc,
{
    pub fn new(
        tck: TckPin,
        tms: TmsPin,
        tdi: TdiPin,
        tdo: TdoPin,
        cycle_delay: DelayFn,
        clock_wait_cycles: u32,
    ) -> Self {
        let mut pins = Self {
            tck,
            tms,
            tdi,
            tdo,
            cycle_delay,
            clock_wait_cycles,
        };
        pins.apply_pins(&PinState::default());
        pins
    }

    pub fn set_clock_wait_cycles(&mut self, cycles: u32) {
        self.clock_wait_cycles = cycles;
    }
}

impl<TckPin, TmsPin, TdiPin, TdoPin, DelayFn> JtagPort
    for JtagPins<TckPin, TmsPin, TdiPin, TdoPin, DelayFn>
where
    TckPin: OutputPin,
    TmsPin: OutputPin,
    TdiPin: OutputPin,
    TdoPin: InputPin,
    DelayFn: DelayFunc,
{
    fn set_line(&mut self, line: JtagLine, level: bool) {
        match line {
            JtagLine::Tck => set_output(&mut self.tck, level),
            JtagLine::Tms => set_output(&mut self.tms, level),
            JtagLine::Tdi => set_output(&mut self.tdi, level),
            _ => (),
        }
    }

    fn read_line(&mut self, line: JtagLine) -> bool {
        match line {
            JtagLine::Tdo => self.tdo.is_high().unwrap_or(false),
            _ => false,
        }
    }

    fn clock_wait(&self) {
        if self.clock_wait_cycles > 0 {
            self.cycle_delay.cycle_delay(self.clock_wait_cycles);
        }
    }
}

/// In-memory port that records what the firmware does to the lines.
#[cfg(test)]
pub(crate) mod trace {
    use super::{JtagLine, JtagPort, PinState};
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    pub struct TracePort {
        pub pins: PinState,
        /// TDI level at every rising TCK edge.
        pub clocked_tdi: Vec<bool>,
        /// TDO levels handed out by `read_line`, oldest first. Reads past the end see low.
        pub tdo_queue: VecDeque<bool>,
        pub tdo_reads: usize,
        pub tdo_reads_with_tck_high: usize,
        pub writes: Vec<(JtagLine, bool)>,
    }

    impl TracePort {
        pub fn with_tdo(bits: &[bool]) -> Self {
            Self {
                tdo_queue: bits.iter().copied().collect(),
                ..Self::default()
            }
        }
        pub fn rising_edges(&self) -> usize {
            self.clocked_tdi.len()
        }
    }

    impl JtagPort for TracePort {
        fn set_line(&mut self, line: JtagLine, level: bool) {
            self.writes.push((line, level));
            match line {
                JtagLine::Tck => {
                    if level && !self.pins.tck {
                        self.clocked_tdi.push(self.pins.tdi);
                    }
                    self.pins.tck = level;
                }
                JtagLine::Tms => self.pins.tms = level,
                JtagLine::Tdi => self.pins.tdi = level,
                JtagLine::Nce => self.pins.nce = level,
                JtagLine::Ncs => self.pins.ncs = level,
                JtagLine::Oe => self.pins.oe = level,
                JtagLine::Tdo => (),
            }
        }

        fn read_line(&mut self, line: JtagLine) -> bool {
            if line != JtagLine::Tdo {
                return false;
            }
            self.tdo_reads += 1;
            if self.pins.tck {
                self.tdo_reads_with_tck_high += 1;
            }
            self.tdo_queue.pop_front().unwrap_or(false)
        }

        fn clock_wait(&self) {}
    }
}
