// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the raw schema and the decoder.
//!
//! - [`RgbaColor`] - filament colors parsed from hex strings
//! - [`GcodeState`] - print job state
//! - [`lenient`] - number/string tolerant field parsing

mod gcode_state;
pub mod lenient;
mod rgba_color;

pub use gcode_state::GcodeState;
pub use rgba_color::RgbaColor;
