// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw report schema.
//!
//! These structs mirror the JSON a printer publishes on
//! `device/{serial}/report`. Every field is optional on the wire: missing
//! fields deserialize to their default, which the merge treats as "not
//! reported". Numeric fields accept numbers and numeric strings alike.
//!
//! Values are kept close to the wire. Fan speeds, tray ids and similar
//! fields stay strings; turning them into typed values is the decoder's job.

use serde::{Deserialize, Serialize};

use crate::types::lenient;

use super::merge::merge_fields;

/// Full raw state of one printer.
///
/// The top-level groups are independent: a message carrying only `print`
/// leaves `info` and `system` untouched when merged.
///
/// # Examples
///
/// ```
/// use bambu_pool::state::{Merge, RawReport};
///
/// let mut stored: RawReport =
///     serde_json::from_str(r#"{"print":{"bed_temper":60,"cooling_fan_speed":"5"}}"#).unwrap();
/// let update: RawReport =
///     serde_json::from_str(r#"{"print":{"cooling_fan_speed":"8"}}"#).unwrap();
///
/// stored.merge(update);
/// assert_eq!(stored.print.bed_temper, 60.0);
/// assert_eq!(stored.print.cooling_fan_speed, "8");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawReport {
    /// Print and machine telemetry.
    pub print: PrintReport,
    /// Firmware and module information.
    pub info: InfoReport,
    /// Replies to system commands.
    pub system: SystemReport,
}

merge_fields!(RawReport {
    print,
    info,
    system
});

impl RawReport {
    /// Returns true when no field carries information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The `print` group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintReport {
    /// Material bay group.
    pub ams: AmsReport,
    /// Bed target temperature in degrees C.
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub bed_target_temper: f64,
    /// Bed temperature in degrees C.
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub bed_temper: f64,
    /// Auxiliary fan speed (0-15).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub big_fan1_speed: String,
    /// Chamber fan speed (0-15).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub big_fan2_speed: String,
    /// Chamber temperature in degrees C.
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub chamber_temper: f64,
    /// Name of the command this message answers.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub command: String,
    /// Part cooling fan speed (0-15).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub cooling_fan_speed: String,
    /// File being printed.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub gcode_file: String,
    /// Download/preparation progress of the file, percent.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub gcode_file_prepare_percent: String,
    /// Job start time, unix seconds.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub gcode_start_time: String,
    /// Job state (`IDLE`, `RUNNING`...).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub gcode_state: String,
    /// Heatbreak fan speed (0-15).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub heatbreak_fan_speed: String,
    /// Active health-management alerts.
    pub hms: Vec<HmsEntry>,
    /// Current layer.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub layer_num: i64,
    /// Light states.
    pub lights_report: Vec<LightReport>,
    /// Print progress, percent.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub mc_percent: i64,
    /// Error code of the current job.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub mc_print_error_code: String,
    /// Print stage code.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub mc_print_stage: String,
    /// Remaining time, minutes.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub mc_remaining_time: i64,
    /// Message counter.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub msg: i64,
    /// Nozzle diameter in mm.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub nozzle_diameter: String,
    /// Nozzle target temperature in degrees C.
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub nozzle_target_temper: f64,
    /// Nozzle temperature in degrees C.
    #[serde(deserialize_with = "lenient::f64_or_string")]
    pub nozzle_temper: f64,
    /// Print error code.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub print_error: i64,
    /// Job origin (`local`, `cloud`...).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub print_type: String,
    /// SD card inserted.
    pub sdcard: bool,
    /// Sequence id echoed from the command being answered.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub sequence_id: String,
    /// Speed preset level.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub spd_lvl: i64,
    /// Speed magnitude, percent.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub spd_mag: i64,
    /// Name of the plate or task being printed.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub subtask_name: String,
    /// Total layer count.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub total_layer_num: i64,
    /// External spool holder tray.
    pub vt_tray: TrayReport,
    /// Wi-Fi signal strength, e.g. `-45dBm`.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub wifi_signal: String,
}

merge_fields!(PrintReport {
    ams,
    bed_target_temper,
    bed_temper,
    big_fan1_speed,
    big_fan2_speed,
    chamber_temper,
    command,
    cooling_fan_speed,
    gcode_file,
    gcode_file_prepare_percent,
    gcode_start_time,
    gcode_state,
    heatbreak_fan_speed,
    hms,
    layer_num,
    lights_report,
    mc_percent,
    mc_print_error_code,
    mc_print_stage,
    mc_remaining_time,
    msg,
    nozzle_diameter,
    nozzle_target_temper,
    nozzle_temper,
    print_error,
    print_type,
    sdcard,
    sequence_id,
    spd_lvl,
    spd_mag,
    subtask_name,
    total_layer_num,
    vt_tray,
    wifi_signal,
});

/// The `print.ams` group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmsReport {
    /// Connected units. Replaced as a whole when present.
    pub ams: Vec<AmsUnitReport>,
    /// Bitmask of connected units, hex.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub ams_exist_bits: String,
    /// Bitmask of loaded trays, hex.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_exist_bits: String,
    /// Tray currently feeding the extruder.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_now: String,
    /// Tray that fed the extruder before.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_pre: String,
    /// Tray being switched to.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_tar: String,
    /// Report version counter.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub version: i64,
}

merge_fields!(AmsReport {
    ams,
    ams_exist_bits,
    tray_exist_bits,
    tray_now,
    tray_pre,
    tray_tar,
    version,
});

/// One material bay unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmsUnitReport {
    /// Unit index.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub id: String,
    /// Humidity index (0 dry - 5 wet).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub humidity: String,
    /// Temperature inside the unit in degrees C.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub temp: String,
    /// Trays of this unit.
    pub tray: Vec<TrayReport>,
}

/// One filament tray, in a material bay unit or on the external holder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayReport {
    /// Tray index.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub id: String,
    /// Recommended bed temperature.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub bed_temp: String,
    /// Colors of a multi-color filament, `RRGGBBAA`.
    pub cols: Vec<String>,
    /// Drying temperature.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub drying_temp: String,
    /// Drying time, hours.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub drying_time: String,
    /// Maximum nozzle temperature.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub nozzle_temp_max: String,
    /// Minimum nozzle temperature.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub nozzle_temp_min: String,
    /// Remaining filament, percent.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub remain: i64,
    /// Main filament color, `RRGGBBAA`.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_color: String,
    /// Filament diameter in mm.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_diameter: String,
    /// Filament preset id.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_info_idx: String,
    /// Detailed filament type.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_sub_brands: String,
    /// Filament type (`PLA`, `PETG`...).
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_type: String,
    /// Spool weight in grams.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub tray_weight: String,
}

merge_fields!(TrayReport {
    id,
    bed_temp,
    cols,
    drying_temp,
    drying_time,
    nozzle_temp_max,
    nozzle_temp_min,
    remain,
    tray_color,
    tray_diameter,
    tray_info_idx,
    tray_sub_brands,
    tray_type,
    tray_weight,
});

/// One health-management alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmsEntry {
    /// Module and severity attribute.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub attr: i64,
    /// Alert code.
    #[serde(deserialize_with = "lenient::i64_or_string")]
    pub code: i64,
}

/// State of one light.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightReport {
    /// Light identifier.
    pub node: String,
    /// `on`, `off` or `flashing`.
    pub mode: String,
}

/// The `info` group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoReport {
    /// Name of the command this message answers.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub command: String,
    /// Sequence id echoed from the command.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub sequence_id: String,
    /// Hardware and firmware modules.
    pub module: Vec<ModuleInfo>,
}

merge_fields!(InfoReport {
    command,
    sequence_id,
    module
});

/// Version information of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleInfo {
    /// Module name.
    pub name: String,
    /// Serial number of the module.
    pub sn: String,
    /// Software version.
    pub sw_ver: String,
    /// Hardware version.
    pub hw_ver: String,
}

/// The `system` group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemReport {
    /// Name of the command this message answers.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub command: String,
    /// Sequence id echoed from the command.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub sequence_id: String,
    /// Light addressed by the last light command.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub led_node: String,
    /// Mode requested by the last light command.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub led_mode: String,
    /// `success` or `fail`.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub result: String,
    /// Failure reason.
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub reason: String,
}

merge_fields!(SystemReport {
    command,
    sequence_id,
    led_node,
    led_mode,
    result,
    reason,
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Merge;

    fn parse(json: &str) -> RawReport {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn partial_update_keeps_unrelated_fields() {
        let mut stored = parse(r#"{"print":{"bed_temper":60,"cooling_fan_speed":"5"}}"#);
        stored.merge(parse(r#"{"print":{"cooling_fan_speed":"8"}}"#));

        assert!((stored.print.bed_temper - 60.0).abs() < f64::EPSILON);
        assert_eq!(stored.print.cooling_fan_speed, "8");
    }

    #[test]
    fn nested_tray_fields_merge_individually() {
        let mut stored = parse(
            r#"{"print":{"vt_tray":{"id":"254","tray_type":"PLA","tray_color":"FF0000FF"}}}"#,
        );
        stored.merge(parse(r#"{"print":{"vt_tray":{"tray_color":"00FF00FF"}}}"#));

        assert_eq!(stored.print.vt_tray.id, "254");
        assert_eq!(stored.print.vt_tray.tray_type, "PLA");
        assert_eq!(stored.print.vt_tray.tray_color, "00FF00FF");
    }

    #[test]
    fn ams_units_are_replaced_as_a_whole() {
        let mut stored = parse(
            r#"{"print":{"ams":{"ams":[{"id":"0","tray":[{"id":"0"},{"id":"1"}]}],"tray_now":"1"}}}"#,
        );
        stored.merge(parse(r#"{"print":{"ams":{"ams":[{"id":"0","tray":[{"id":"3"}]}]}}}"#));

        assert_eq!(stored.print.ams.ams.len(), 1);
        assert_eq!(stored.print.ams.ams[0].tray.len(), 1);
        assert_eq!(stored.print.ams.ams[0].tray[0].id, "3");
        assert_eq!(stored.print.ams.tray_now, "1");
    }

    #[test]
    fn absent_groups_are_untouched() {
        let mut stored = parse(
            r#"{"print":{"nozzle_temper":220},"info":{"command":"get_version","module":[{"name":"ota","sw_ver":"01.07"}]}}"#,
        );
        stored.merge(parse(r#"{"print":{"mc_percent":12}}"#));

        assert_eq!(stored.info.module.len(), 1);
        assert_eq!(stored.info.module[0].sw_ver, "01.07");
        assert_eq!(stored.print.mc_percent, 12);
        assert!((stored.print.nozzle_temper - 220.0).abs() < f64::EPSILON);
    }

    #[test]
    fn string_and_numeric_temperatures_are_equivalent() {
        assert_eq!(
            parse(r#"{"print":{"bed_temper":"60"}}"#),
            parse(r#"{"print":{"bed_temper":60}}"#)
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let report = parse(r#"{"print":{"ipcam":{"ipcam_dev":"1"},"upgrade_state":{}}}"#);
        assert!(report.is_empty());
    }

    #[test]
    fn numeric_ids_become_strings() {
        let report = parse(r#"{"print":{"vt_tray":{"id":254},"big_fan1_speed":15}}"#);
        assert_eq!(report.print.vt_tray.id, "254");
        assert_eq!(report.print.big_fan1_speed, "15");
    }

    #[test]
    fn hms_and_lights_deserialize() {
        let report = parse(
            r#"{"print":{"hms":[{"attr":50336000,"code":131073}],"lights_report":[{"node":"chamber_light","mode":"on"}]}}"#,
        );
        assert_eq!(report.print.hms[0].code, 131_073);
        assert_eq!(report.print.lights_report[0].mode, "on");
    }
}
