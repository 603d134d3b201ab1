// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound command encoding.
//!
//! A printer command is a JSON object with a single key, the message class,
//! whose value holds the sequence id and the command fields:
//!
//! ```text
//! {"pushing":{"sequence_id":"0","command":"pushall"}}
//! ```
//!
//! Commands are write-only: the printer acknowledges them on its report
//! topic, which flows through the normal merge path.
//!
//! # Examples
//!
//! ```
//! use bambu_pool::command::{Command, MessageClass};
//!
//! let cmd = Command::new(MessageClass::Print)
//!     .with_command("gcode_line")
//!     .with_param("G28\n");
//!
//! let json = cmd.encode(7).unwrap();
//! let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
//! assert_eq!(value["print"]["sequence_id"], "7");
//! assert_eq!(value["print"]["command"], "gcode_line");
//! ```

mod gcode;
mod sequence;

pub use gcode::is_valid_gcode_line;
pub use sequence::SequenceCounter;

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ValueError;

/// Field holding the sequence id inside the command body.
const SEQUENCE_FIELD: &str = "sequence_id";
/// Field holding the command name.
const COMMAND_FIELD: &str = "command";
/// Field holding the free-form parameter.
const PARAM_FIELD: &str = "param";

/// Message class tag wrapping every command body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Print job and motion control.
    Print,
    /// Machine-level settings (lights, firmware).
    System,
    /// State push requests.
    Pushing,
}

impl MessageClass {
    /// Returns the wire name of the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::System => "system",
            Self::Pushing => "pushing",
        }
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command addressed to one printer.
///
/// The sequence id is not part of the command itself; it is assigned by the
/// connection when the command is published.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    class: MessageClass,
    fields: Map<String, Value>,
}

impl Command {
    /// Creates an empty command of the given class.
    #[must_use]
    pub fn new(class: MessageClass) -> Self {
        Self {
            class,
            fields: Map::new(),
        }
    }

    /// Requests a full state report from the printer.
    #[must_use]
    pub fn push_all() -> Self {
        Self::new(MessageClass::Pushing).with_command("pushall")
    }

    /// Pauses the running print job.
    #[must_use]
    pub fn pause() -> Self {
        Self::new(MessageClass::Print).with_command("pause")
    }

    /// Resumes a paused print job.
    #[must_use]
    pub fn resume() -> Self {
        Self::new(MessageClass::Print).with_command("resume")
    }

    /// Stops the running print job.
    #[must_use]
    pub fn stop() -> Self {
        Self::new(MessageClass::Print).with_command("stop")
    }

    /// Sends raw G-code to the printer.
    ///
    /// The input may contain several lines; every non-empty line is
    /// validated with [`is_valid_gcode_line`].
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyGcode`] if no line is present, or
    /// [`ValueError::InvalidGcode`] for the first malformed line.
    pub fn gcode_line(gcode: &str) -> Result<Self, ValueError> {
        let mut payload = String::new();
        for line in gcode.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !is_valid_gcode_line(line) {
                return Err(ValueError::InvalidGcode(line.to_string()));
            }
            payload.push_str(line);
            payload.push('\n');
        }

        if payload.is_empty() {
            return Err(ValueError::EmptyGcode);
        }

        Ok(Self::new(MessageClass::Print)
            .with_command("gcode_line")
            .with_param(payload))
    }

    /// Sets the `command` field.
    #[must_use]
    pub fn with_command(self, name: impl Into<String>) -> Self {
        self.with_field(COMMAND_FIELD, Value::String(name.into()))
    }

    /// Sets the `param` field. The value may itself be a nested object.
    #[must_use]
    pub fn with_param(self, value: impl Into<Value>) -> Self {
        self.with_field(PARAM_FIELD, value)
    }

    /// Sets an arbitrary field, replacing any previous value.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the message class.
    #[must_use]
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Returns the command name, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get(COMMAND_FIELD).and_then(Value::as_str)
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Builds the JSON body with the given sequence id.
    ///
    /// A `sequence_id` field set through [`with_field`](Self::with_field) is
    /// overridden.
    #[must_use]
    pub fn to_value(&self, sequence_id: u64) -> Value {
        let mut body = self.fields.clone();
        body.insert(
            SEQUENCE_FIELD.to_string(),
            Value::String(sequence_id.to_string()),
        );

        let mut message = Map::with_capacity(1);
        message.insert(self.class.as_str().to_string(), Value::Object(body));
        Value::Object(message)
    }

    /// Serializes the command to its wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, sequence_id: u64) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_value(sequence_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_all_matches_wire_example() {
        let encoded = Command::push_all().encode(0).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(
            value,
            json!({"pushing": {"sequence_id": "0", "command": "pushall"}})
        );
    }

    #[test]
    fn extra_fields_and_nested_param() {
        let cmd = Command::new(MessageClass::System)
            .with_command("ledctrl")
            .with_param(json!({"node": "chamber_light"}))
            .with_field("led_mode", "on");

        let value = cmd.to_value(12);
        let body = &value["system"];
        assert_eq!(body["sequence_id"], "12");
        assert_eq!(body["command"], "ledctrl");
        assert_eq!(body["param"]["node"], "chamber_light");
        assert_eq!(body["led_mode"], "on");
    }

    #[test]
    fn sequence_id_cannot_be_spoofed() {
        let cmd = Command::push_all().with_field("sequence_id", "999");
        assert_eq!(cmd.to_value(3)["pushing"]["sequence_id"], "3");
    }

    #[test]
    fn accessors() {
        let cmd = Command::pause();
        assert_eq!(cmd.class(), MessageClass::Print);
        assert_eq!(cmd.name(), Some("pause"));
        assert!(cmd.field("param").is_none());
    }

    #[test]
    fn class_wire_names() {
        assert_eq!(MessageClass::Print.to_string(), "print");
        assert_eq!(MessageClass::System.to_string(), "system");
        assert_eq!(MessageClass::Pushing.to_string(), "pushing");
    }

    #[test]
    fn gcode_line_accepts_valid_lines() {
        let cmd = Command::gcode_line("G28\nM104 S210 ; heat\n").unwrap();
        assert_eq!(cmd.name(), Some("gcode_line"));
        assert_eq!(
            cmd.field("param").and_then(Value::as_str),
            Some("G28\nM104 S210 ; heat\n")
        );
    }

    #[test]
    fn gcode_line_rejects_garbage() {
        let err = Command::gcode_line("G28\nrm -rf /").unwrap_err();
        assert_eq!(err, ValueError::InvalidGcode("rm -rf /".to_string()));
    }

    #[test]
    fn gcode_line_rejects_empty() {
        assert_eq!(
            Command::gcode_line("  \n\n").unwrap_err(),
            ValueError::EmptyGcode
        );
    }
}
