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

use usb_device::UsbError;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlasterError {
    /// The output buffer already holds 256 bytes; the captured byte was dropped.
    BufferOverflow,
    /// An endpoint reported something other than `WouldBlock`.
    InternalError,
}

impl From<UsbError> for BlasterError {
    fn from(_: UsbError) -> Self {
        Self::InternalError
    }
}
