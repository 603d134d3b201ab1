// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw printer state: the report schema, the partial-update merge and the
//! per-device store.
//!
//! Printers publish partial reports. Each one is deserialized into a
//! [`RawReport`] where absent fields hold their default, then merged into the
//! device's entry in the [`RawStateStore`].
//!
//! # Examples
//!
//! ```
//! use bambu_pool::state::{RawReport, RawStateStore};
//!
//! let store = RawStateStore::new();
//! for json in [
//!     r#"{"print":{"bed_temper":60,"cooling_fan_speed":"5"}}"#,
//!     r#"{"print":{"cooling_fan_speed":"8"}}"#,
//! ] {
//!     let update: RawReport = serde_json::from_str(json).unwrap();
//!     store.merge("SN1", update);
//! }
//!
//! let report = store.report("SN1").unwrap();
//! assert_eq!(report.print.bed_temper, 60.0);
//! assert_eq!(report.print.cooling_fan_speed, "8");
//! ```

mod merge;
mod report;
mod store;

pub use merge::Merge;
pub use report::{
    AmsReport, AmsUnitReport, HmsEntry, InfoReport, LightReport, ModuleInfo, PrintReport,
    RawReport, SystemReport, TrayReport,
};
pub use store::{RawSnapshot, RawStateStore};
