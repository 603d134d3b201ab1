// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic full-state refresh.
//!
//! Printers only report what changed. To keep snapshots complete the pool
//! asks each printer for a full push (`{"pushing":{"command":"pushall"}}`)
//! on connect and then on every tick. A per-printer minimum interval
//! collapses bursts, so the connect refresh and the first tick produce a
//! single request.

mod throttle;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::command::Command;
use crate::error::{AggregateError, DeviceFailure, ProtocolError};
use crate::shutdown::ShutdownListener;

use throttle::Throttle;

/// Destination for refresh requests.
pub trait CommandSink: Send + Sync + 'static {
    /// Returns the printers to refresh.
    fn serials(&self) -> Vec<String>;

    /// Publishes `command` to one printer.
    fn publish(
        &self,
        serial: &str,
        command: &Command,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

/// Sends throttled `pushall` requests.
#[derive(Debug)]
pub struct RefreshScheduler<S> {
    sink: Arc<S>,
    throttle: Throttle,
    tick: Duration,
}

impl<S: CommandSink> RefreshScheduler<S> {
    /// Creates a scheduler ticking every `tick` that refreshes a printer at
    /// most once per `min_interval`.
    #[must_use]
    pub fn new(sink: Arc<S>, tick: Duration, min_interval: Duration) -> Self {
        Self {
            sink,
            throttle: Throttle::new(min_interval),
            tick,
        }
    }

    /// Requests a full push from one printer.
    ///
    /// Returns `Ok(false)` without publishing if the printer was refreshed
    /// less than the minimum interval ago.
    ///
    /// # Errors
    ///
    /// Returns the publish failure. The throttle slot stays claimed.
    pub async fn refresh(&self, serial: &str) -> Result<bool, ProtocolError> {
        self.refresh_at(serial, Instant::now()).await
    }

    async fn refresh_at(&self, serial: &str, at: Instant) -> Result<bool, ProtocolError> {
        if !self.throttle.try_acquire(serial, at) {
            tracing::trace!(serial = %serial, "Refresh throttled");
            return Ok(false);
        }
        self.sink.publish(serial, &Command::push_all()).await?;
        tracing::debug!(serial = %serial, "Requested full state push");
        Ok(true)
    }

    /// Requests a full push from every printer of the sink.
    ///
    /// A failing printer does not stop the others; every failure is logged
    /// and collected.
    pub async fn refresh_all(&self) -> AggregateError {
        self.refresh_all_at(Instant::now()).await
    }

    /// Refreshes every printer, stamping each claim with `at`.
    async fn refresh_all_at(&self, at: Instant) -> AggregateError {
        let mut failures = AggregateError::new();
        for serial in self.sink.serials() {
            if let Err(e) = self.refresh_at(&serial, at).await {
                tracing::warn!(serial = %serial, error = %e, "Refresh request failed");
                failures.push(DeviceFailure::new(serial, e));
            }
        }
        failures
    }

    /// Drops the throttle record of a removed printer.
    pub fn forget(&self, serial: &str) {
        self.throttle.forget(serial);
    }

    /// Runs the tick loop until `shutdown` fires.
    ///
    /// The first tick fires immediately. A refresh in progress completes
    /// before the loop exits.
    pub(crate) async fn run(&self, mut shutdown: ShutdownListener) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                biased;
                () = shutdown.wait() => break,
                tick = ticker.tick() => tick,
            };
            let failures = self.refresh_all_at(tick).await;
            if !failures.is_empty() {
                tracing::debug!(failed = failures.len(), "Periodic refresh incomplete");
            }
        }

        tracing::debug!("Refresh scheduler stopped");
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub(crate) fn spawn(self: &Arc<Self>, shutdown: ShutdownListener) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use super::*;
    use crate::shutdown::Shutdown;

    #[derive(Debug, Default)]
    struct RecordingSink {
        serials: Vec<String>,
        failing: HashSet<String>,
        first_publish_delay: Mutex<Option<Duration>>,
        sent: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl RecordingSink {
        fn new(serials: &[&str]) -> Self {
            Self {
                serials: serials.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn failing(mut self, serial: &str) -> Self {
            self.failing.insert(serial.to_string());
            self
        }

        fn slow_first_publish(self, delay: Duration) -> Self {
            *self.first_publish_delay.lock() = Some(delay);
            self
        }

        fn sent_to(&self, serial: &str) -> usize {
            self.sent.lock().iter().filter(|(s, _)| s == serial).count()
        }
    }

    impl CommandSink for RecordingSink {
        fn serials(&self) -> Vec<String> {
            self.serials.clone()
        }

        async fn publish(&self, serial: &str, command: &Command) -> Result<(), ProtocolError> {
            if self.failing.contains(serial) {
                return Err(ProtocolError::ConnectionFailed("broker gone".to_string()));
            }
            let delay = self.first_publish_delay.lock().take();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.sent
                .lock()
                .push((serial.to_string(), command.to_value(0)));
            Ok(())
        }
    }

    fn scheduler(sink: RecordingSink) -> (Arc<RecordingSink>, Arc<RefreshScheduler<RecordingSink>>) {
        let sink = Arc::new(sink);
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&sink),
            Duration::from_secs(10),
            Duration::from_secs(10),
        ));
        (sink, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_sends_pushall() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1"]));
        assert!(scheduler.refresh("SN1").await.unwrap());

        let sent = sink.sent.lock();
        assert_eq!(sent[0].0, "SN1");
        assert_eq!(
            sent[0].1,
            serde_json::json!({"pushing": {"sequence_id": "0", "command": "pushall"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_interval_sends_once_per_printer() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1", "SN2"]));

        assert!(scheduler.refresh_all().await.is_empty());
        assert!(scheduler.refresh_all().await.is_empty());
        assert_eq!(sink.sent_to("SN1"), 1);
        assert_eq!(sink.sent_to("SN2"), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(scheduler.refresh_all().await.is_empty());
        assert_eq!(sink.sent_to("SN1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_printer_does_not_block_others() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1", "SN2", "SN3"]).failing("SN2"));

        let failures = scheduler.refresh_all().await;
        assert_eq!(failures.len(), 1);
        assert!(failures.contains("SN2"));
        assert_eq!(sink.sent_to("SN1"), 1);
        assert_eq!(sink.sent_to("SN3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_refresh_and_first_tick_collapse() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1", "SN2"]));
        let shutdown = Shutdown::new();

        // Initial refresh on connect, then the loop's immediate first tick.
        scheduler.refresh_all().await;
        let handle = scheduler.spawn(shutdown.listener());
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(sink.sent_to("SN1"), 1);
        assert_eq!(sink.sent_to("SN2"), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.sent_to("SN1"), 2);
        assert_eq!(sink.sent_to("SN2"), 2);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_on_shutdown() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1"]));
        let shutdown = Shutdown::new();
        let handle = scheduler.spawn(shutdown.listener());

        tokio::time::sleep(Duration::from_millis(1)).await;
        shutdown.trigger();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.sent_to("SN1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_allows_immediate_refresh() {
        let (sink, scheduler) = scheduler(RecordingSink::new(&["SN1"]));
        assert!(scheduler.refresh("SN1").await.unwrap());
        assert!(!scheduler.refresh("SN1").await.unwrap());
        scheduler.forget("SN1");
        assert!(scheduler.refresh("SN1").await.unwrap());
        assert_eq!(sink.sent_to("SN1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_publish_does_not_skip_next_tick() {
        let sink = RecordingSink::new(&["SN1", "SN2"]).slow_first_publish(Duration::from_secs(3));
        let (sink, scheduler) = scheduler(sink);
        let shutdown = Shutdown::new();
        let handle = scheduler.spawn(shutdown.listener());

        // SN2 is only reached after SN1's slow publish
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.sent_to("SN1"), 1);
        assert_eq!(sink.sent_to("SN2"), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.sent_to("SN1"), 2);
        assert_eq!(sink.sent_to("SN2"), 2);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
