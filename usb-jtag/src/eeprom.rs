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

pub const EEPROM_SIZE: usize = 128;

/// Word-addressed configuration memory as seen by the host's FT245 driver.
pub trait Eeprom {
    fn read_word(&self, word_address: u16) -> [u8; 2];
}

/// A fixed 128-byte image. Word addresses wrap within the image.
#[derive(Clone)]
pub struct EepromImage {
    image: [u8; EEPROM_SIZE],
}

impl EepromImage {
    pub const fn new(image: [u8; EEPROM_SIZE]) -> Self {
        Self { image }
    }
}

impl Default for EepromImage {
    /// Erased part.
    fn default() -> Self {
        Self::new([0xFF; EEPROM_SIZE])
    }
}

impl Eeprom for EepromImage {
    fn read_word(&self, word_address: u16) -> [u8; 2] {
        let offset = ((word_address << 1) & 0x7F) as usize;
        [self.image[offset], self.image[offset + 1]]
    }
}
