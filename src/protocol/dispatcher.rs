// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound message queue and worker pool.
//!
//! The MQTT event loop pushes every received publish into a bounded
//! [`MessageQueue`]. When the queue is full the oldest pending message is
//! evicted: only the latest merged value of a field is observable, so a
//! fresh report is worth more than an old one.
//!
//! A fixed number of workers drain the queue. Each one resolves the serial
//! from the topic, parses the JSON body and merges it into the
//! [`RawStateStore`]. Malformed messages are logged and dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::ParseError;
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::state::{RawReport, RawStateStore};

use super::subscriptions::SubscriptionSet;
use super::topic::serial_from_report_topic;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    topic: String,
    payload: Vec<u8>,
}

impl InboundMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the topic the message arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Dispatcher counters.
#[derive(Debug, Default)]
struct DispatcherStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStatsSnapshot {
    /// Messages accepted into the queue.
    pub enqueued: u64,
    /// Messages evicted because the queue was full.
    pub dropped: u64,
    /// Messages merged into the store.
    pub processed: u64,
    /// Well-formed messages for serials that are not registered.
    pub ignored: u64,
    /// Messages with an unexpected topic or an unparseable body.
    pub malformed: u64,
}

/// Bounded FIFO that evicts its oldest entry when full.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    items: Mutex<VecDeque<InboundMessage>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    stats: DispatcherStats,
}

impl MessageQueue {
    /// Creates a queue. A capacity of zero is raised to one.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            stats: DispatcherStats::default(),
        }
    }

    /// Appends a message without blocking.
    ///
    /// Returns false if the queue is closed. A full queue evicts its oldest
    /// message to make room.
    pub(crate) fn push(&self, message: InboundMessage) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(message);
            evicted
        };

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = evicted {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(topic = %old.topic, "Inbound queue full, dropped oldest message");
        }
        self.notify.notify_one();
        true
    }

    pub(crate) fn try_pop(&self) -> Option<InboundMessage> {
        self.items.lock().pop_front()
    }

    /// Waits for the next message. Returns `None` once `shutdown` fires.
    async fn pop(&self, shutdown: &mut ShutdownListener) -> Option<InboundMessage> {
        loop {
            if shutdown.is_triggered() {
                return None;
            }
            if let Some(message) = self.try_pop() {
                return Some(message);
            }
            tokio::select! {
                biased;
                () = shutdown.wait() => return None,
                () = self.notify.notified() => {}
            }
        }
    }

    /// Stops accepting messages. Pending messages stay poppable.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Routes queued messages into the raw state store.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    queue: Arc<MessageQueue>,
    store: Arc<RawStateStore>,
    devices: Arc<SubscriptionSet>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub(crate) fn new(
        queue: Arc<MessageQueue>,
        store: Arc<RawStateStore>,
        devices: Arc<SubscriptionSet>,
    ) -> Self {
        Self {
            queue,
            store,
            devices,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Spawns `count` workers that run until `shutdown` fires.
    ///
    /// Each worker finishes the message it holds before exiting.
    pub(crate) fn start(self: &Arc<Self>, count: usize, shutdown: &Shutdown) {
        let mut workers = self.workers.lock();
        for id in 0..count.max(1) {
            let dispatcher = Arc::clone(self);
            let mut listener = shutdown.listener();
            workers.push(tokio::spawn(async move {
                tracing::debug!(worker = id, "Dispatcher worker started");
                while let Some(message) = dispatcher.queue.pop(&mut listener).await {
                    dispatcher.process(&message);
                }
                tracing::debug!(worker = id, "Dispatcher worker stopped");
            }));
        }
    }

    /// Waits for every worker to exit. Call after triggering shutdown.
    pub(crate) async fn join(&self) {
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Dispatcher worker panicked");
            }
        }
    }

    /// Handles one message, logging instead of returning errors.
    pub(crate) fn process(&self, message: &InboundMessage) {
        match self.handle(message) {
            Ok(Some(serial)) => {
                self.queue.stats.processed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(serial = %serial, "Merged report");
            }
            Ok(None) => {
                self.queue.stats.ignored.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic = %message.topic, "Ignored report from unregistered device");
            }
            Err(e) => {
                self.queue.stats.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(topic = %message.topic, error = %e, "Dropped malformed message");
            }
        }
    }

    /// Merges a message into the store.
    ///
    /// Returns the serial it was merged for, or `None` when the serial is not
    /// registered. A printer removed while its message was in flight has no
    /// store entry left and is treated as unregistered.
    pub(crate) fn handle(&self, message: &InboundMessage) -> Result<Option<String>, ParseError> {
        let serial = serial_from_report_topic(&message.topic)?;
        if !self.devices.contains(serial) {
            return Ok(None);
        }
        let report: RawReport = serde_json::from_slice(&message.payload)?;
        if !self.store.merge_existing(serial, report) {
            return Ok(None);
        }
        Ok(Some(serial.to_string()))
    }

    pub(crate) fn stats(&self) -> DispatcherStatsSnapshot {
        let stats = &self.queue.stats;
        DispatcherStatsSnapshot {
            enqueued: stats.enqueued.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            processed: stats.processed.load(Ordering::Relaxed),
            ignored: stats.ignored.load(Ordering::Relaxed),
            malformed: stats.malformed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn message(serial: &str, body: &str) -> InboundMessage {
        InboundMessage::new(format!("device/{serial}/report"), body.as_bytes())
    }

    fn dispatcher(serials: &[&str], capacity: usize) -> Arc<Dispatcher> {
        let devices = Arc::new(SubscriptionSet::new());
        let store = Arc::new(RawStateStore::new());
        for serial in serials {
            devices.insert(serial);
            store.register(serial);
        }
        Arc::new(Dispatcher::new(
            Arc::new(MessageQueue::new(capacity)),
            store,
            devices,
        ))
    }

    // ========================================================================
    // Queue
    // ========================================================================

    #[test]
    fn full_queue_evicts_oldest() {
        let queue = MessageQueue::new(3);
        for i in 0..5 {
            assert!(queue.push(message(&format!("SN{i}"), "{}")));
            assert!(queue.len() <= queue.capacity());
        }

        assert_eq!(queue.len(), 3);
        let topics: Vec<_> = std::iter::from_fn(|| queue.try_pop())
            .map(|m| m.topic)
            .collect();
        assert_eq!(
            topics,
            vec!["device/SN2/report", "device/SN3/report", "device/SN4/report"]
        );
        assert_eq!(queue.stats.dropped.load(Ordering::Relaxed), 2);
        assert_eq!(queue.stats.enqueued.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn closed_queue_rejects_pushes() {
        let queue = MessageQueue::new(2);
        assert!(queue.push(message("SN1", "{}")));
        queue.close();
        assert!(queue.is_closed());
        assert!(!queue.push(message("SN1", "{}")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let queue = MessageQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(message("A", "{}"));
        queue.push(message("B", "{}"));
        assert_eq!(queue.try_pop().unwrap().topic(), "device/B/report");
    }

    // ========================================================================
    // Handling
    // ========================================================================

    #[test]
    fn handle_merges_registered_device() {
        let d = dispatcher(&["SN1"], 8);
        let merged = d
            .handle(&message("SN1", r#"{"print":{"bed_temper":"60"}}"#))
            .unwrap();
        assert_eq!(merged.as_deref(), Some("SN1"));

        let report = d.store.report("SN1").unwrap();
        assert!((report.print.bed_temper - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn handle_ignores_unregistered_device() {
        let d = dispatcher(&["SN1"], 8);
        let merged = d
            .handle(&message("SN9", r#"{"print":{"bed_temper":"60"}}"#))
            .unwrap();
        assert!(merged.is_none());
        assert!(d.store.report("SN9").is_none());
    }

    #[test]
    fn handle_skips_device_removed_mid_flight() {
        let d = dispatcher(&["SN1"], 8);
        // Still listed as a device, but its entry is already gone
        d.store.remove("SN1");

        let merged = d
            .handle(&message("SN1", r#"{"print":{"bed_temper":"70"}}"#))
            .unwrap();
        assert!(merged.is_none());
        assert!(d.store.snapshot("SN1").is_none());
    }

    #[test]
    fn handle_rejects_bad_topic_and_body() {
        let d = dispatcher(&["SN1"], 8);
        assert!(matches!(
            d.handle(&InboundMessage::new("device/SN1/request", "{}")),
            Err(ParseError::UnexpectedTopic(_))
        ));
        assert!(matches!(
            d.handle(&message("SN1", "not json")),
            Err(ParseError::Json(_))
        ));
        assert!(d.store.report("SN1").unwrap().is_empty());
    }

    #[test]
    fn process_counts_outcomes() {
        let d = dispatcher(&["SN1"], 8);
        d.process(&message("SN1", r#"{"print":{}}"#));
        d.process(&message("SN2", r#"{"print":{}}"#));
        d.process(&message("SN1", "{"));

        let stats = d.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.malformed, 1);
    }

    // ========================================================================
    // Workers
    // ========================================================================

    #[tokio::test]
    async fn workers_drain_queue_and_stop() {
        let d = dispatcher(&["SN1", "SN2"], 64);
        let shutdown = Shutdown::new();
        d.start(4, &shutdown);

        d.queue().push(message("SN1", r#"{"print":{"bed_temper":"60"}}"#));
        d.queue().push(message("SN2", r#"{"print":{"nozzle_temper":"210"}}"#));

        tokio::time::timeout(Duration::from_secs(2), async {
            while d.stats().processed < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), d.join())
            .await
            .unwrap();

        let sn1 = d.store.report("SN1").unwrap();
        let sn2 = d.store.report("SN2").unwrap();
        assert!((sn1.print.bed_temper - 60.0).abs() < f64::EPSILON);
        assert!(sn1.print.nozzle_temper.abs() < f64::EPSILON);
        assert!((sn2.print.nozzle_temper - 210.0).abs() < f64::EPSILON);
        assert!(sn2.print.bed_temper.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn idle_workers_exit_on_shutdown() {
        let d = dispatcher(&[], 4);
        let shutdown = Shutdown::new();
        d.start(3, &shutdown);
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), d.join())
            .await
            .unwrap();
        assert!(d.workers.lock().is_empty());
    }
}
