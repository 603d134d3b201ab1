// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sequence id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out monotonically increasing command sequence ids, starting at 0.
///
/// Shared by every publisher on a connection, so ids are unique per session.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    /// Creates a counter starting at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
