// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `bambu_pool` - telemetry merging and pooled control of Bambu Lab
//! printers over MQTT.
//!
//! Printers report their state as partial JSON documents: each message only
//! carries the fields that changed. This library keeps a merged snapshot per
//! printer, decodes it into typed state on demand, and serves any number of
//! printers over one shared MQTT session.
//!
//! # Features
//!
//! - **Merge engine**: partial reports folded into per-printer snapshots
//! - **Device pool**: one session, many printers, parallel state queries
//! - **Refresh**: periodic, throttled full-state requests
//! - **Commands**: pause, resume, stop, G-code and raw requests
//!
//! # Quick Start
//!
//! ## LAN printer
//!
//! ```no_run
//! use bambu_pool::{DevicePool, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> bambu_pool::Result<()> {
//!     let config = PoolConfig::builder()
//!         .host("192.168.1.40")
//!         .credentials("bblp", "12345678")
//!         .serial("01S00A000000000")
//!         .build()?;
//!
//!     let pool = DevicePool::new(config);
//!     pool.connect_all().await?;
//!
//!     let state = pool.decoded_state("01S00A000000000")?;
//!     println!("nozzle at {} C", state.nozzle_temperature);
//!
//!     pool.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Cloud account with several printers
//!
//! ```no_run
//! use bambu_pool::{CLOUD_HOST_US, DevicePool, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> bambu_pool::Result<()> {
//!     let config = PoolConfig::builder()
//!         .cloud(CLOUD_HOST_US, 1_234_567, "access-token")
//!         .serials(["01S00A000000001", "01S00A000000002"])
//!         .build()?;
//!
//!     let pool = DevicePool::new(config);
//!     if let Err(e) = pool.connect_all().await {
//!         // Subscription failures still leave the pool connected.
//!         eprintln!("connect: {e}");
//!     }
//!
//!     let (states, failures) = pool.get_decoded_states().await?.into_parts();
//!     for (serial, state) in &states {
//!         println!("{serial}: {} {}%", state.gcode_state, state.print_percent_done);
//!     }
//!     if !failures.is_empty() {
//!         eprintln!("{failures}");
//!     }
//!
//!     if let Some(printer) = pool.get_device("01S00A000000001") {
//!         printer.pause().await?;
//!     }
//!
//!     pool.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Merging without a broker
//!
//! The merge engine is usable on its own, for example to replay captured
//! traffic:
//!
//! ```
//! use bambu_pool::state::{RawReport, RawStateStore};
//!
//! let store = RawStateStore::new();
//! let first: RawReport = serde_json::from_str(r#"{"print":{"bed_temper":"60"}}"#).unwrap();
//! let second: RawReport = serde_json::from_str(r#"{"print":{"nozzle_temper":210}}"#).unwrap();
//! store.merge("SN1", first);
//! store.merge("SN1", second);
//!
//! let report = store.report("SN1").unwrap();
//! assert_eq!(report.print.bed_temper, 60.0);
//! assert_eq!(report.print.nozzle_temper, 210.0);
//! ```

pub mod command;
pub mod decode;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod refresh;
mod shutdown;
pub mod state;
#[cfg(test)]
mod test_support;
pub mod types;

pub use command::{Command, MessageClass};
pub use decode::{Decoder, PrinterDecoder, PrinterState};
pub use error::{
    AggregateError, DecodeError, DeviceFailure, Error, ParseError, ProtocolError, Result,
    ValueError,
};
pub use pool::{
    CLOUD_HOST_CN, CLOUD_HOST_US, DecodedStates, DevicePool, PoolConfig, PoolConfigBuilder,
    PoolState, Printer,
};
pub use state::{RawReport, RawStateStore};
pub use types::{GcodeState, RgbaColor};
