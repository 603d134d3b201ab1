// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serials whose report topic the pool listens to.

use std::collections::BTreeSet;

use parking_lot::RwLock;

/// Set of registered printer serials.
///
/// Shared by the connection manager, which re-subscribes every member after
/// a reconnect, and the dispatcher, which ignores reports from non-members.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionSet {
    serials: RwLock<BTreeSet<String>>,
}

impl SubscriptionSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a serial. Returns false if it was already present.
    pub(crate) fn insert(&self, serial: &str) -> bool {
        self.serials.write().insert(serial.to_string())
    }

    /// Removes a serial. Returns false if it was not present.
    pub(crate) fn remove(&self, serial: &str) -> bool {
        self.serials.write().remove(serial)
    }

    pub(crate) fn contains(&self, serial: &str) -> bool {
        self.serials.read().contains(serial)
    }

    /// Returns the serials in sorted order.
    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.serials.read().iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.serials.read().len()
    }
}
