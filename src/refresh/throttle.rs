// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-printer minimum refresh interval.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Remembers when each printer was last asked for a full push.
#[derive(Debug)]
pub(crate) struct Throttle {
    min_interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl Throttle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Claims a refresh slot for `serial` at `at`.
    ///
    /// Returns false if the previous claim is younger than the minimum
    /// interval. A successful claim is recorded immediately, so two callers
    /// racing for the same serial cannot both win.
    ///
    /// Periodic callers pass the scheduled tick rather than the current
    /// time, so a late or slow tick does not push the next one out.
    pub(crate) fn try_acquire(&self, serial: &str, at: Instant) -> bool {
        let mut last = self.last.lock();
        if let Some(previous) = last.get(serial)
            && at.saturating_duration_since(*previous) < self.min_interval
        {
            return false;
        }
        last.insert(serial.to_string(), at);
        true
    }

    /// Drops the record for `serial`.
    pub(crate) fn forget(&self, serial: &str) {
        self.last.lock().remove(serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_claim_within_interval_is_refused() {
        let throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.try_acquire("SN1", Instant::now()));
        assert!(!throttle.try_acquire("SN1", Instant::now()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!throttle.try_acquire("SN1", Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.try_acquire("SN1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn printers_are_throttled_independently() {
        let throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.try_acquire("SN1", Instant::now()));
        assert!(throttle.try_acquire("SN2", Instant::now()));
        assert!(!throttle.try_acquire("SN1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn forget_resets_printer() {
        let throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.try_acquire("SN1", Instant::now()));
        throttle.forget("SN1");
        assert!(throttle.try_acquire("SN1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_throttles() {
        let throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.try_acquire("SN1", Instant::now()));
        assert!(throttle.try_acquire("SN1", Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn claims_are_measured_between_given_instants() {
        let throttle = Throttle::new(Duration::from_secs(10));
        let tick = Instant::now();
        assert!(throttle.try_acquire("SN1", tick));

        // Late delivery of the next tick still counts from the scheduled time
        tokio::time::advance(Duration::from_secs(12)).await;
        assert!(throttle.try_acquire("SN1", tick + Duration::from_secs(10)));
        assert!(!throttle.try_acquire("SN1", tick + Duration::from_secs(19)));
        assert!(throttle.try_acquire("SN1", tick + Duration::from_secs(20)));
    }
}
