// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device raw snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{Merge, RawReport};

/// Merged raw state of one device, with the time of the last merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    /// The merged report.
    pub report: RawReport,
    /// When a message was last merged into `report`. `None` until the first
    /// message arrives.
    pub last_merged: Option<DateTime<Utc>>,
}

/// Thread-safe map from serial to merged raw snapshot.
///
/// One lock guards the whole store. A merge holds it for the duration of a
/// struct walk, which is short enough that per-device locking buys nothing
/// at the device counts a pool manages.
///
/// # Examples
///
/// ```
/// use bambu_pool::state::{RawReport, RawStateStore};
///
/// let store = RawStateStore::new();
/// let update: RawReport = serde_json::from_str(r#"{"print":{"bed_temper":"60"}}"#).unwrap();
/// store.merge("SN1", update);
///
/// let report = store.report("SN1").unwrap();
/// assert_eq!(report.print.bed_temper, 60.0);
/// assert!(store.last_merged("SN1").is_some());
/// ```
#[derive(Debug, Default)]
pub struct RawStateStore {
    entries: Mutex<HashMap<String, RawSnapshot>>,
}

impl RawStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty entry for `serial` if none exists.
    ///
    /// Returns true if the entry was created.
    pub fn register(&self, serial: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(serial) {
            return false;
        }
        entries.insert(serial.to_string(), RawSnapshot::default());
        true
    }

    /// Merges a partial report into the entry for `serial`, creating the
    /// entry on first use.
    ///
    /// The timestamp moves on every call, including updates that carry no
    /// field: the device was heard from.
    pub fn merge(&self, serial: &str, incoming: RawReport) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(serial.to_string()).or_default();
        entry.report.merge(incoming);
        entry.last_merged = Some(Utc::now());
    }

    /// Merges a partial report only if `serial` already has an entry.
    ///
    /// Returns false, leaving the store untouched, for an unknown serial. An
    /// entry dropped by [`remove`](Self::remove) is never brought back.
    pub fn merge_existing(&self, serial: &str, incoming: RawReport) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(serial) else {
            return false;
        };
        entry.report.merge(incoming);
        entry.last_merged = Some(Utc::now());
        true
    }

    /// Returns a copy of the snapshot for `serial`.
    #[must_use]
    pub fn snapshot(&self, serial: &str) -> Option<RawSnapshot> {
        self.entries.lock().get(serial).cloned()
    }

    /// Returns a copy of the merged report for `serial`.
    #[must_use]
    pub fn report(&self, serial: &str) -> Option<RawReport> {
        self.entries.lock().get(serial).map(|e| e.report.clone())
    }

    /// Returns when `serial` was last merged into.
    #[must_use]
    pub fn last_merged(&self, serial: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(serial).and_then(|e| e.last_merged)
    }

    /// Returns true if `serial` has not been merged into within `max_age`.
    ///
    /// Devices that never reported, or that are unknown, are stale.
    #[must_use]
    pub fn is_stale(&self, serial: &str, max_age: chrono::Duration) -> bool {
        match self.last_merged(serial) {
            Some(at) => Utc::now() - at > max_age,
            None => true,
        }
    }

    /// Removes the entry for `serial`, returning its last snapshot.
    pub fn remove(&self, serial: &str) -> Option<RawSnapshot> {
        self.entries.lock().remove(serial)
    }

    /// Returns true if an entry exists for `serial`.
    #[must_use]
    pub fn contains(&self, serial: &str) -> bool {
        self.entries.lock().contains_key(serial)
    }

    /// Returns the serials with an entry, sorted.
    #[must_use]
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.entries.lock().keys().cloned().collect();
        serials.sort();
        serials
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
