// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RGBA color type with hex parsing.
//!
//! Filament colors are reported as hex strings, either `RRGGBB` or
//! `RRGGBBAA`, with an optional leading `#`.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// RGBA color with 8-bit channels.
///
/// # Examples
///
/// ```
/// use bambu_pool::types::RgbaColor;
///
/// let white = RgbaColor::from_hex("FFFFFFFF").unwrap();
/// assert_eq!(white, RgbaColor::new(255, 255, 255, 255));
///
/// // Six digits imply full opacity
/// let red = RgbaColor::from_hex("#FF0000").unwrap();
/// assert_eq!(red.alpha(), 255);
/// assert_eq!(red.to_hex(), "FF0000FF");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RgbaColor {
    red: u8,
    green: u8,
    blue: u8,
    alpha: u8,
}

impl RgbaColor {
    /// Fully transparent black, used for empty color slots.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Creates a new color.
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Parses `RRGGBB` or `RRGGBBAA`, with or without a leading `#`.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::InvalidHexColor`] for any other length or non-hex digits.
    pub fn from_hex(hex: &str) -> Result<Self, ValueError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let invalid = || ValueError::InvalidHexColor(hex.to_string());

        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };

        match digits.len() {
            6 => Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
            8 => Ok(Self::new(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => Err(invalid()),
        }
    }

    /// Returns the red component.
    #[must_use]
    pub const fn red(&self) -> u8 {
        self.red
    }

    /// Returns the green component.
    #[must_use]
    pub const fn green(&self) -> u8 {
        self.green
    }

    /// Returns the blue component.
    #[must_use]
    pub const fn blue(&self) -> u8 {
        self.blue
    }

    /// Returns the alpha component.
    #[must_use]
    pub const fn alpha(&self) -> u8 {
        self.alpha
    }

    /// Returns the color as `RRGGBBAA`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!(
            "{:02X}{:02X}{:02X}{:02X}",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

impl FromStr for RgbaColor {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for RgbaColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_with_and_without_hash() {
        assert_eq!(
            RgbaColor::from_hex("00AE42").unwrap(),
            RgbaColor::new(0x00, 0xAE, 0x42, 0xFF)
        );
        assert_eq!(
            RgbaColor::from_hex("#00ae42").unwrap(),
            RgbaColor::new(0x00, 0xAE, 0x42, 0xFF)
        );
    }

    #[test]
    fn parses_rgba() {
        let c: RgbaColor = "F5E6D380".parse().unwrap();
        assert_eq!(c.alpha(), 0x80);
        assert_eq!(c.red(), 0xF5);
    }

    #[test]
    fn rejects_bad_length() {
        assert!(RgbaColor::from_hex("FFF").is_err());
        assert!(RgbaColor::from_hex("").is_err());
        assert!(RgbaColor::from_hex("FFFFFFFFFF").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let err = RgbaColor::from_hex("GG0000").unwrap_err();
        assert_eq!(err, ValueError::InvalidHexColor("GG0000".to_string()));
        assert_eq!(err.to_string(), "invalid hex color: GG0000");
        assert!(RgbaColor::from_hex("ÿÿÿ").is_err());
    }

    #[test]
    fn display_round_trips_through_hex() {
        let c = RgbaColor::new(1, 2, 3, 4);
        assert_eq!(c.to_string(), "#01020304");
        assert_eq!(RgbaColor::from_hex(&c.to_string()).unwrap(), c);
    }
}
