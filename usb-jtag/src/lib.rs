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

#![cfg_attr(not(test), no_std)]

pub mod bitbang;
mod blaster;
mod decoder;
mod eeprom;
mod error;
mod framer;
mod interface;
mod link;

pub use crate::blaster::*;
pub use crate::decoder::*;
pub use crate::eeprom::*;
pub use crate::error::*;
pub use crate::framer::*;
pub use crate::interface::*;
pub use crate::link::*;
