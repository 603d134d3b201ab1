// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Printer topic naming.
//!
//! A printer publishes telemetry on `device/{serial}/report` and listens for
//! commands on `device/{serial}/request`. This shape is fixed by the printer
//! firmware.

use crate::error::ParseError;

const PREFIX: &str = "device";
const REPORT: &str = "report";
const REQUEST: &str = "request";

/// Returns the topic a printer publishes telemetry on.
///
/// # Examples
///
/// ```
/// use bambu_pool::protocol::report_topic;
///
/// assert_eq!(report_topic("01S00A000000000"), "device/01S00A000000000/report");
/// ```
#[must_use]
pub fn report_topic(serial: &str) -> String {
    format!("{PREFIX}/{serial}/{REPORT}")
}

/// Returns the topic a printer receives commands on.
#[must_use]
pub fn request_topic(serial: &str) -> String {
    format!("{PREFIX}/{serial}/{REQUEST}")
}

/// Extracts the serial from a `device/{serial}/report` topic.
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedTopic`] when the topic has another shape
/// or the serial segment is empty.
///
/// # Examples
///
/// ```
/// use bambu_pool::protocol::serial_from_report_topic;
///
/// assert_eq!(serial_from_report_topic("device/SN1/report").unwrap(), "SN1");
/// assert!(serial_from_report_topic("device/SN1/request").is_err());
/// ```
pub fn serial_from_report_topic(topic: &str) -> Result<&str, ParseError> {
    let mut parts = topic.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(PREFIX), Some(serial), Some(REPORT), None) if !serial.is_empty() => Ok(serial),
        _ => Err(ParseError::UnexpectedTopic(topic.to_string())),
    }
}
