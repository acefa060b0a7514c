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

use crate::error::BlasterError;

pub const FRAME_MARKER: [u8; 2] = [0x31, 0x60];
pub const MAX_PACKET_SIZE: usize = 64;
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - FRAME_MARKER.len();
pub const OUT_BUFFER_LEN: usize = 256;

/// Captured bytes waiting for the bulk IN endpoint.
///
/// Indices are `u8` so they wrap at exactly `OUT_BUFFER_LEN`; the fill level is kept
/// in a separate counter because equal indices mean both empty and full.
pub struct OutBuffer {
    data: [u8; OUT_BUFFER_LEN],
    first_data: u8,
    first_free: u8,
    pending: u16,
}

impl OutBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; OUT_BUFFER_LEN],
            first_data: 0,
            first_free: 0,
            pending: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    pub fn is_full(&self) -> bool {
        self.pending as usize == OUT_BUFFER_LEN
    }

    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.first_free as usize] = byte;
        self.first_free = self.first_free.wrapping_add(1);
        self.pending += 1;
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.first_data as usize];
        self.first_data = self.first_data.wrapping_add(1);
        self.pending -= 1;
        Some(byte)
    }

    pub fn clear(&mut self) {
        self.first_data = 0;
        self.first_free = 0;
        self.pending = 0;
    }
}

impl Default for OutBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Set by the periodic timer, consumed by a keepalive frame.
#[derive(Debug, Default)]
pub struct FrameTimer {
    fired: bool,
}

impl FrameTimer {
    pub fn tick(&mut self) {
        self.fired = true;
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    pub fn take(&mut self) -> bool {
        core::mem::replace(&mut self.fired, false)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// Marker plus this many payload bytes.
    Data(usize),
    /// Marker only.
    Keepalive,
}

pub struct OutputFramer {
    buffer: OutBuffer,
    timer: FrameTimer,
    marker: [u8; 2],
    overflow_count: u32,
}

impl OutputFramer {
    pub fn new(marker: [u8; 2]) -> Self {
        Self {
            buffer: OutBuffer::new(),
            timer: FrameTimer::default(),
            marker,
            overflow_count: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.pending()
    }

    pub fn overflow_count(&self) -> u32 {
        self.overflow_count
    }

    pub fn keepalive_due(&self) -> bool {
        self.timer.fired()
    }

    pub fn tick(&mut self) {
        self.timer.tick();
    }

    pub fn enqueue(&mut self, byte: u8) -> Result<(), BlasterError> {
        if self.buffer.push(byte) {
            return Ok(());
        }
        self.overflow_count = self.overflow_count.wrapping_add(1);
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "output buffer full, dropped {=u8:#x} ({} so far)",
            byte,
            self.overflow_count
        );
        Err(BlasterError::BufferOverflow)
    }

    /// Builds the next IN packet into `packet`.
    ///
    /// Pending bytes always win over a keepalive. Returns `None` when there is nothing to
    /// send, leaving `packet` empty.
    pub fn drain_into<const N: usize>(&mut self, packet: &mut Vec<u8, N>) -> Option<Frame> {
        packet.clear();
        if N < self.marker.len() {
            return None;
        }
        if !self.buffer.is_empty() {
            packet.extend_from_slice(&self.marker).ok()?;
            let limit = core::cmp::min(N - self.marker.len(), MAX_PAYLOAD);
            let mut count = 0;
            while count < limit {
                match self.buffer.pop() {
                    Some(byte) => {
                        packet.push(byte).ok()?;
                        count += 1;
                    }
                    None => break,
                }
            }
            // A data packet counts as this period's sign of life.
            self.timer.take();
            if count == MAX_PAYLOAD {
                // A full packet does not end the host's transfer; make sure a short one follows.
                self.timer.tick();
            }
            Some(Frame::Data(count))
        } else if self.timer.take() {
            packet.extend_from_slice(&self.marker).ok()?;
            Some(Frame::Keepalive)
        } else {
            None
        }
    }

    pub fn purge(&mut self) {
        self.buffer.clear();
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.timer = FrameTimer::default();
        self.overflow_count = 0;
    }
}

impl Default for OutputFramer {
    fn default() -> Self {
        Self::new(FRAME_MARKER)
    }
}
