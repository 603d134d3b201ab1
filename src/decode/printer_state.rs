// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed printer state.

use serde::Serialize;

use crate::types::{GcodeState, RgbaColor};

/// Decoded state of one printer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrinterState {
    /// Connected material bay units.
    pub ams: Vec<AmsUnit>,
    /// True when at least one material bay unit is connected.
    pub ams_exists: bool,
    /// Bed target temperature in degrees C.
    pub bed_target_temperature: f64,
    /// Bed temperature in degrees C.
    pub bed_temperature: f64,
    /// Auxiliary fan speed (0-15).
    pub auxiliary_fan_speed: i64,
    /// Chamber fan speed (0-15).
    pub chamber_fan_speed: i64,
    /// Part cooling fan speed (0-15).
    pub part_fan_speed: i64,
    /// Heatbreak fan speed (0-15).
    pub heatbreak_fan_speed: i64,
    /// Chamber temperature in degrees C.
    pub chamber_temperature: f64,
    /// File being printed.
    pub gcode_file: String,
    /// File preparation progress, percent.
    pub gcode_file_prepare_percent: i64,
    /// Job state.
    pub gcode_state: GcodeState,
    /// Current layer.
    pub layer: i64,
    /// Total layers of the job.
    pub total_layers: i64,
    /// Print progress, percent.
    pub print_percent_done: i64,
    /// Error code of the current job.
    pub print_error_code: String,
    /// Estimated remaining time, minutes.
    pub remaining_print_time: i64,
    /// Name of the plate or task being printed.
    pub subtask_name: String,
    /// Nozzle diameter in mm.
    pub nozzle_diameter: String,
    /// Nozzle target temperature in degrees C.
    pub nozzle_target_temperature: f64,
    /// Nozzle temperature in degrees C.
    pub nozzle_temperature: f64,
    /// SD card inserted.
    pub sdcard: bool,
    /// Wi-Fi signal, e.g. `-45dBm`.
    pub wifi_signal: String,
    /// Number of active health-management alerts.
    pub hms_alerts: usize,
    /// External spool holder.
    pub vt_tray: Tray,
}

/// One material bay unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AmsUnit {
    /// Unit index.
    pub id: i64,
    /// Humidity index (0 dry - 5 wet).
    pub humidity: i64,
    /// Temperature inside the unit in degrees C.
    pub temperature: f64,
    /// Trays of the unit.
    pub trays: Vec<Tray>,
}

/// One filament tray.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tray {
    /// Tray index.
    pub id: i64,
    /// Recommended bed temperature in degrees C.
    pub bed_temperature: f64,
    /// Colors of the filament. Multi-color filaments have several.
    pub colors: Vec<RgbaColor>,
    /// Drying temperature in degrees C.
    pub drying_temperature: f64,
    /// Drying time, hours.
    pub drying_time: i64,
    /// Maximum nozzle temperature in degrees C.
    pub nozzle_temp_max: f64,
    /// Minimum nozzle temperature in degrees C.
    pub nozzle_temp_min: f64,
    /// Remaining filament, percent.
    pub remaining: i64,
    /// Main filament color.
    pub color: RgbaColor,
    /// Filament diameter in mm.
    pub diameter: f64,
    /// Detailed filament type.
    pub sub_brands: String,
    /// Filament type (`PLA`, `PETG`...).
    pub filament_type: String,
    /// Spool weight in grams.
    pub weight: i64,
}
