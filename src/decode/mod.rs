// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of raw snapshots into typed state.
//!
//! Decoding is pure and stateless. The pool runs it after the merge engine
//! has settled a snapshot, one printer per task. A failure is reported for
//! that printer only.
//!
//! [`PrinterDecoder`] is the default. Applications that need other fields
//! implement [`Decoder`] and build the pool with
//! [`DevicePool::with_decoder`](crate::pool::DevicePool::with_decoder).

mod printer_state;

pub use printer_state::{AmsUnit, PrinterState, Tray};

use crate::error::DecodeError;
use crate::state::{AmsUnitReport, RawReport, TrayReport};
use crate::types::lenient::{parse_f64, parse_i64};
use crate::types::{GcodeState, RgbaColor};

/// Converts a merged raw snapshot into a typed value.
pub trait Decoder: Send + Sync + 'static {
    /// The typed state.
    type Output: Send + 'static;

    /// Decodes the snapshot of printer `serial`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when a field cannot be translated.
    fn decode(&self, serial: &str, report: &RawReport) -> Result<Self::Output, DecodeError>;
}

/// Default decoder producing [`PrinterState`].
///
/// Malformed numeric strings decode to 0. Empty colors decode to
/// [`RgbaColor::TRANSPARENT`]; any other color that is not `RRGGBB` or
/// `RRGGBBAA` hex is an error.
///
/// # Examples
///
/// ```
/// use bambu_pool::decode::{Decoder, PrinterDecoder};
/// use bambu_pool::state::RawReport;
///
/// let raw: RawReport = serde_json::from_str(
///     r#"{"print":{"nozzle_temper":"210","cooling_fan_speed":"15","gcode_state":"RUNNING"}}"#,
/// ).unwrap();
///
/// let state = PrinterDecoder.decode("SN1", &raw).unwrap();
/// assert_eq!(state.nozzle_temperature, 210.0);
/// assert_eq!(state.part_fan_speed, 15);
/// assert!(state.gcode_state.is_active());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrinterDecoder;

impl Decoder for PrinterDecoder {
    type Output = PrinterState;

    fn decode(&self, _serial: &str, report: &RawReport) -> Result<PrinterState, DecodeError> {
        let print = &report.print;

        let ams = print
            .ams
            .ams
            .iter()
            .enumerate()
            .map(|(i, unit)| decode_ams_unit(i, unit))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PrinterState {
            ams,
            ams_exists: u64::from_str_radix(print.ams.ams_exist_bits.trim(), 16)
                .is_ok_and(|bits| bits != 0),
            bed_target_temperature: print.bed_target_temper,
            bed_temperature: print.bed_temper,
            auxiliary_fan_speed: parse_i64(&print.big_fan1_speed),
            chamber_fan_speed: parse_i64(&print.big_fan2_speed),
            part_fan_speed: parse_i64(&print.cooling_fan_speed),
            heatbreak_fan_speed: parse_i64(&print.heatbreak_fan_speed),
            chamber_temperature: print.chamber_temper,
            gcode_file: print.gcode_file.clone(),
            gcode_file_prepare_percent: parse_i64(&print.gcode_file_prepare_percent),
            gcode_state: GcodeState::from_wire(&print.gcode_state),
            layer: print.layer_num,
            total_layers: print.total_layer_num,
            print_percent_done: print.mc_percent,
            print_error_code: print.mc_print_error_code.clone(),
            remaining_print_time: print.mc_remaining_time,
            subtask_name: print.subtask_name.clone(),
            nozzle_diameter: print.nozzle_diameter.clone(),
            nozzle_target_temperature: print.nozzle_target_temper,
            nozzle_temperature: print.nozzle_temper,
            sdcard: print.sdcard,
            wifi_signal: print.wifi_signal.clone(),
            hms_alerts: print.hms.len(),
            vt_tray: decode_tray("vt_tray", &print.vt_tray)?,
        })
    }
}

fn decode_ams_unit(index: usize, unit: &AmsUnitReport) -> Result<AmsUnit, DecodeError> {
    let trays = unit
        .tray
        .iter()
        .enumerate()
        .map(|(t, tray)| decode_tray(&format!("ams[{index}].tray[{t}]"), tray))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AmsUnit {
        id: parse_i64(&unit.id),
        humidity: parse_i64(&unit.humidity),
        temperature: parse_f64(&unit.temp),
        trays,
    })
}

fn decode_tray(path: &str, tray: &TrayReport) -> Result<Tray, DecodeError> {
    let colors = tray
        .cols
        .iter()
        .enumerate()
        .map(|(i, col)| decode_color(&format!("{path}.cols[{i}]"), col))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Tray {
        id: parse_i64(&tray.id),
        bed_temperature: parse_f64(&tray.bed_temp),
        colors,
        drying_temperature: parse_f64(&tray.drying_temp),
        drying_time: parse_i64(&tray.drying_time),
        nozzle_temp_max: parse_f64(&tray.nozzle_temp_max),
        nozzle_temp_min: parse_f64(&tray.nozzle_temp_min),
        remaining: tray.remain,
        color: decode_color(&format!("{path}.tray_color"), &tray.tray_color)?,
        diameter: parse_f64(&tray.tray_diameter),
        sub_brands: tray.tray_sub_brands.clone(),
        filament_type: tray.tray_type.clone(),
        weight: parse_i64(&tray.tray_weight),
    })
}

fn decode_color(field: &str, value: &str) -> Result<RgbaColor, DecodeError> {
    if value.is_empty() {
        return Ok(RgbaColor::TRANSPARENT);
    }
    RgbaColor::from_hex(value).map_err(|_| DecodeError::InvalidColor {
        field: field.to_string(),
        value: value.to_string(),
    })
}
