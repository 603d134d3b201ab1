// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device pool management.
//!
//! A [`DevicePool`] serves many printers over a single MQTT session. Each
//! printer publishes partial reports on `device/{serial}/report`; the pool
//! merges them into per-printer snapshots and decodes those on demand.
//!
//! - [`PoolConfig`]: broker, credentials and tuning
//! - [`DevicePool`]: lifecycle, registration, state queries
//! - [`Printer`]: per-printer command handle

mod config;
mod device_pool;
mod printer;

pub use config::{CLOUD_HOST_CN, CLOUD_HOST_US, PoolConfig, PoolConfigBuilder};
pub use device_pool::{DecodedStates, DevicePool};
pub use printer::Printer;

/// Lifecycle state of a [`DevicePool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Created, never connected, or the last connect failed.
    #[default]
    Unconnected,
    /// `connect_all` is in progress.
    Connecting,
    /// Session established. Queries and commands are accepted.
    Connected,
    /// Shut down for good.
    Disconnected,
}

impl PoolState {
    /// Returns true in the [`Connected`](Self::Connected) state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
