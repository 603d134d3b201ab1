// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tolerant parsing of numeric report fields.
//!
//! Printers report the same field as a JSON number in one message and as a
//! string in the next (`"bed_temper": 60` vs `"bed_temper": "60"`). The
//! serde helpers accept both, and the plain parsers turn malformed strings
//! into 0 instead of failing.

use serde::de::{self, Deserializer, Visitor};
use std::fmt;

/// Parses an integer, returning 0 for empty or malformed input.
///
/// Fractional input is truncated: `"12.7"` becomes 12.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_i64(value: &str) -> i64 {
    let value = value.trim();
    value
        .parse::<i64>()
        .unwrap_or_else(|_| parse_f64(value) as i64)
}

/// Parses a float, returning 0.0 for empty or malformed input.
#[must_use]
pub fn parse_f64(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}

/// Deserializes a float from a number, a numeric string, or `null`.
///
/// # Errors
///
/// Returns an error for booleans, arrays and objects.
pub fn f64_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FloatVisitor)
}

/// Deserializes an integer from a number, a numeric string, or `null`.
///
/// # Errors
///
/// Returns an error for booleans, arrays and objects.
pub fn i64_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(IntVisitor)
}

/// Deserializes a string from a string, a number, or `null`.
///
/// # Errors
///
/// Returns an error for booleans, arrays and objects.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(StringVisitor)
}

struct FloatVisitor;

impl Visitor<'_> for FloatVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        Ok(parse_f64(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
        Ok(0.0)
    }
}

struct IntVisitor;

impl Visitor<'_> for IntVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or a numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        Ok(i64::try_from(v).unwrap_or(i64::MAX))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        Ok(v as i64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        Ok(parse_i64(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
        Ok(0)
    }
}

struct StringVisitor;

impl Visitor<'_> for StringVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or a number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "f64_or_string")]
        temp: f64,
        #[serde(default, deserialize_with = "i64_or_string")]
        percent: i64,
        #[serde(default, deserialize_with = "string_or_number")]
        speed: String,
    }

    #[test]
    fn accepts_numbers() {
        let p: Probe = serde_json::from_str(r#"{"temp":60.5,"percent":42,"speed":15}"#).unwrap();
        assert!((p.temp - 60.5).abs() < f64::EPSILON);
        assert_eq!(p.percent, 42);
        assert_eq!(p.speed, "15");
    }

    #[test]
    fn accepts_strings() {
        let p: Probe =
            serde_json::from_str(r#"{"temp":"60","percent":"42","speed":"15"}"#).unwrap();
        assert!((p.temp - 60.0).abs() < f64::EPSILON);
        assert_eq!(p.percent, 42);
        assert_eq!(p.speed, "15");
    }

    #[test]
    fn null_and_missing_are_zero() {
        let p: Probe = serde_json::from_str(r#"{"temp":null}"#).unwrap();
        assert!(p.temp.abs() < f64::EPSILON);
        assert_eq!(p.percent, 0);
        assert!(p.speed.is_empty());
    }

    #[test]
    fn rejects_structures() {
        assert!(serde_json::from_str::<Probe>(r#"{"temp":[1]}"#).is_err());
        assert!(serde_json::from_str::<Probe>(r#"{"percent":true}"#).is_err());
    }

    #[test]
    fn plain_parsers_fall_back_to_zero() {
        assert_eq!(parse_i64("abc"), 0);
        assert_eq!(parse_i64(" 7 "), 7);
        assert_eq!(parse_i64("12.7"), 12);
        assert!(parse_f64("").abs() < f64::EPSILON);
        assert!((parse_f64("0.4") - 0.4).abs() < f64::EPSILON);
    }
}
