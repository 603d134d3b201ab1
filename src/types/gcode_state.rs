// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Print job state as reported in `print.gcode_state`.

use std::fmt;

/// State of the print job.
///
/// Unrecognized strings map to [`GcodeState::Unknown`] so a firmware update
/// adding a state does not break decoding.
///
/// # Examples
///
/// ```
/// use bambu_pool::types::GcodeState;
///
/// assert_eq!(GcodeState::from_wire("RUNNING"), GcodeState::Running);
/// assert_eq!(GcodeState::from_wire("SLICING"), GcodeState::Unknown);
/// assert!(GcodeState::Running.is_active());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GcodeState {
    /// No job.
    Idle,
    /// Heating and leveling before the first layer.
    Prepare,
    /// Printing.
    Running,
    /// Paused by the user or by a filament event.
    Pause,
    /// The last job completed.
    Finish,
    /// The last job failed.
    Failed,
    /// Not reported yet, or not recognized.
    #[default]
    Unknown,
}

impl GcodeState {
    /// Maps the wire string to a state.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "IDLE" => Self::Idle,
            "PREPARE" => Self::Prepare,
            "RUNNING" => Self::Running,
            "PAUSE" => Self::Pause,
            "FINISH" => Self::Finish,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Prepare => "PREPARE",
            Self::Running => "RUNNING",
            Self::Pause => "PAUSE",
            Self::Finish => "FINISH",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true while a job occupies the printer.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Prepare | Self::Running | Self::Pause)
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "The printer is idle.",
            Self::Prepare => "The printer is preparing.",
            Self::Running => "The printer is running.",
            Self::Pause => "The printer is paused.",
            Self::Finish => "The printer has finished.",
            Self::Failed => "The printer has failed.",
            Self::Unknown => "The printer state is unknown.",
        }
    }
}

impl fmt::Display for GcodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for state in [
            GcodeState::Idle,
            GcodeState::Prepare,
            GcodeState::Running,
            GcodeState::Pause,
            GcodeState::Finish,
            GcodeState::Failed,
        ] {
            assert_eq!(GcodeState::from_wire(state.as_str()), state);
        }
    }

    #[test]
    fn empty_is_unknown() {
        assert_eq!(GcodeState::from_wire(""), GcodeState::Unknown);
        assert_eq!(GcodeState::default(), GcodeState::Unknown);
    }

    #[test]
    fn activity() {
        assert!(GcodeState::Pause.is_active());
        assert!(!GcodeState::Finish.is_active());
        assert!(!GcodeState::Idle.is_active());
    }
}
