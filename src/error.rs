// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `bambu_pool` library.
//!
//! The hierarchy mirrors how failures propagate through the pool:
//!
//! - [`ProtocolError`]: the MQTT transport failed (connect, subscribe, publish).
//! - [`ParseError`]: an inbound payload or topic could not be understood. These
//!   are logged and dropped by the dispatcher, never returned to callers.
//! - [`DecodeError`]: a raw snapshot could not be translated into a typed state.
//! - [`ValueError`]: a command or value was built from invalid input.
//! - [`AggregateError`]: several independent per-device operations failed.

use std::fmt;

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while decoding a raw snapshot.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Several per-device operations failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// No device with this serial is registered in the pool.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The pool has not been connected yet.
    #[error("pool is not connected")]
    NotConnected,

    /// The pool has been disconnected and cannot be reused.
    #[error("pool has been disconnected")]
    Closed,

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A per-device task panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A color is not `RRGGBB` or `RRGGBBAA` hex.
    #[error("invalid hex color: {0}")]
    InvalidHexColor(String),

    /// A G-code line failed validation.
    #[error("invalid G-code line: {0:?}")]
    InvalidGcode(String),

    /// The G-code payload contained no lines.
    #[error("G-code payload is empty")]
    EmptyGcode,
}

/// Errors related to MQTT communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The MQTT client rejected a request.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Publishing to a topic failed.
    #[error("failed to publish to topic {topic}: {source}")]
    Publish {
        /// The topic the command was addressed to.
        topic: String,
        /// The underlying client failure.
        #[source]
        source: rumqttc::ClientError,
    },

    /// Subscribing to a topic failed.
    #[error("failed to subscribe to topic {topic}: {source}")]
    Subscribe {
        /// The topic that could not be subscribed.
        topic: String,
        /// The underlying client failure.
        #[source]
        source: rumqttc::ClientError,
    },

    /// The outbound command could not be encoded.
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The link to the broker is gone and reconnection gave up.
    #[error("connection lost: reconnect attempts exhausted")]
    ConnectionLost,

    /// No transport session exists.
    #[error("not connected to broker")]
    NotConnected,
}

/// Errors related to parsing inbound messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The topic does not follow `device/{serial}/report`.
    #[error("unexpected topic: {0}")]
    UnexpectedTopic(String),
}

/// Errors raised while translating a raw snapshot into a typed state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A color field is not a valid `RRGGBB` or `RRGGBBAA` hex string.
    #[error("invalid color {value:?} in {field}")]
    InvalidColor {
        /// Path of the offending field.
        field: String,
        /// The raw value.
        value: String,
    },

    /// Nothing has been merged for this device yet.
    #[error("no state received yet")]
    NoData,
}

/// Failure of one device inside a fan-out operation.
#[derive(Debug)]
pub struct DeviceFailure {
    serial: String,
    error: Error,
}

impl DeviceFailure {
    /// Creates a failure record for a device.
    #[must_use]
    pub fn new(serial: impl Into<String>, error: impl Into<Error>) -> Self {
        Self {
            serial: serial.into(),
            error: error.into(),
        }
    }

    /// Returns the serial of the failed device.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Returns the underlying error.
    #[must_use]
    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// Combined error listing every device that failed in a parallel operation.
///
/// Failures are sorted by serial so the rendered message is stable.
#[derive(Debug, Default)]
pub struct AggregateError {
    failures: Vec<DeviceFailure>,
}

impl AggregateError {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, failure: DeviceFailure) {
        self.failures.push(failure);
        self.failures.sort_by(|a, b| a.serial.cmp(&b.serial));
    }

    /// Returns true when no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of failed devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> &[DeviceFailure] {
        &self.failures
    }

    /// Returns true if the given device is among the failures.
    #[must_use]
    pub fn contains(&self, serial: &str) -> bool {
        self.failures.iter().any(|f| f.serial == serial)
    }

    /// Converts into `Ok(())` when empty, `Err(self)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns the aggregate itself when at least one failure was recorded.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} device(s) failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{}: {}", failure.serial, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = DecodeError::InvalidColor {
            field: "vt_tray.tray_color".to_string(),
            value: "ZZ".to_string(),
        };
        assert_eq!(err.to_string(), "invalid color \"ZZ\" in vt_tray.tray_color");
    }

    #[test]
    fn error_from_value_error() {
        let err: Error = ValueError::EmptyGcode.into();
        assert!(matches!(err, Error::Value(ValueError::EmptyGcode)));
    }

    #[test]
    fn aggregate_lists_every_device() {
        let mut agg = AggregateError::new();
        agg.push(DeviceFailure::new("SN2", DecodeError::NoData));
        agg.push(DeviceFailure::new("SN1", Error::NotConnected));

        assert_eq!(agg.len(), 2);
        assert!(agg.contains("SN1"));
        assert!(agg.contains("SN2"));
        assert_eq!(
            agg.to_string(),
            "2 device(s) failed: SN1: pool is not connected; SN2: decode error: no state received yet"
        );
    }

    #[test]
    fn empty_aggregate_is_ok() {
        assert!(AggregateError::new().into_result().is_ok());
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError::UnexpectedTopic("foo/bar".to_string());
        assert_eq!(err.to_string(), "unexpected topic: foo/bar");
    }
}
