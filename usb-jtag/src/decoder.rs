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

use bitflags::bitflags;

use crate::bitbang::PinState;

bitflags! {
    /// Layout of a command byte received on the bulk OUT endpoint.
    pub struct CommandByte: u8 {
        const TCK = 0x01;
        const TMS = 0x02;
        const NCE = 0x04;
        const NCS = 0x08;
        const TDI = 0x10;
        const OE = 0x20;
        /// Bit-bang: sample TDO. Shift: capture the shifted-in bytes.
        const READ = 0x40;
        /// Start a byte-shift run of `byte & COUNT_MASK` data bytes.
        const SHIFT = 0x80;
    }
}

pub const COUNT_MASK: u8 = 0x3F;

impl CommandByte {
    pub fn pins(&self) -> PinState {
        PinState {
            tck: self.contains(Self::TCK),
            tms: self.contains(Self::TMS),
            tdi: self.contains(Self::TDI),
            nce: self.contains(Self::NCE),
            ncs: self.contains(Self::NCS),
            oe: self.contains(Self::OE),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShiftRun {
    pub remaining: u8,
    pub capture: bool,
}

/// What the executor has to do for one received byte.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    /// Drive the pins; with `capture`, read TDO afterwards and queue `2 | tdo`.
    SetPins { pins: PinState, capture: bool },
    /// A shift run header. No pin changes.
    BeginRun(ShiftRun),
    /// One data byte of the active run.
    ContinueRun { data: u8, capture: bool },
}

/// Tracks the active shift run across packets.
#[derive(Debug, Default)]
pub struct CommandDecoder {
    run: ShiftRun,
}

impl CommandDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> ShiftRun {
        self.run
    }

    pub fn in_run(&self) -> bool {
        self.run.remaining > 0
    }

    pub fn reset(&mut self) {
        self.run = ShiftRun::default();
    }

    pub fn decode(&mut self, byte: u8) -> Effect {
        if self.run.remaining > 0 {
            self.run.remaining -= 1;
            return Effect::ContinueRun {
                data: byte,
                capture: self.run.capture,
            };
        }

        let command = CommandByte::from_bits_truncate(byte);
        if command.contains(CommandByte::SHIFT) {
            // 0x80 leaves remaining at zero, so the next byte is a command again.
            self.run = ShiftRun {
                remaining: byte & COUNT_MASK,
                capture: command.contains(CommandByte::READ),
            };
            Effect::BeginRun(self.run)
        } else {
            Effect::SetPins {
                pins: command.pins(),
                capture: command.contains(CommandByte::READ),
            }
        }
    }
}
