// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The single MQTT session shared by every printer in a pool.
//!
//! [`ConnectionManager`] owns the `rumqttc` client and drives its event loop
//! on a background task. Inbound publishes are pushed into the dispatcher
//! queue; commands are encoded and published to `device/{serial}/request`.
//!
//! Transport errors after the first successful connect are retried by
//! polling the event loop again, which makes `rumqttc` reconnect. Every
//! `ConnAck` after the first re-subscribes all registered printers, since
//! the session is clean.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::command::{Command, SequenceCounter};
use crate::error::ProtocolError;
use crate::pool::PoolConfig;
use crate::refresh::CommandSink;
use crate::shutdown::Shutdown;

use super::dispatcher::{InboundMessage, MessageQueue};
use super::subscriptions::SubscriptionSet;
use super::topic::{report_topic, request_topic};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity of the request channel between the client and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Printers use QoS 0 in both directions.
const QOS: QoS = QoS::AtMostOnce;

fn next_client_id(prefix: &str) -> String {
    let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{counter}", std::process::id())
}

/// Owner of the shared MQTT session.
pub(crate) struct ConnectionManager {
    config: PoolConfig,
    client: RwLock<Option<AsyncClient>>,
    subscriptions: Arc<SubscriptionSet>,
    queue: Arc<MessageQueue>,
    sequence: SequenceCounter,
    connected: AtomicBool,
    link_lost: AtomicBool,
    closing: AtomicBool,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stop: Shutdown,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: PoolConfig,
        subscriptions: Arc<SubscriptionSet>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            subscriptions,
            queue,
            sequence: SequenceCounter::new(),
            connected: AtomicBool::new(false),
            link_lost: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            event_loop: Mutex::new(None),
            stop: Shutdown::new(),
        }
    }

    /// Returns whether the broker link is currently up.
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns whether reconnection gave up.
    pub(crate) fn is_link_lost(&self) -> bool {
        self.link_lost.load(Ordering::Acquire)
    }

    fn mqtt_options(&self) -> MqttOptions {
        let config = &self.config;
        let mut options = MqttOptions::new(
            next_client_id(&config.client_id_prefix),
            &config.host,
            config.port,
        );
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(config.max_packet_size, config.max_packet_size);
        if let Some((ref username, ref token)) = config.credentials {
            options.set_credentials(username, token);
        }
        if config.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    /// Opens the session and waits for the broker's `ConnAck`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`] if the broker refuses or
    /// the transport fails, and [`ProtocolError::Timeout`] if no `ConnAck`
    /// arrives within the connection timeout.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<(), ProtocolError> {
        let (client, event_loop) = AsyncClient::new(self.mqtt_options(), REQUEST_CAPACITY);
        *self.client.write() = Some(client);
        self.link_lost.store(false, Ordering::Release);
        self.closing.store(false, Ordering::Release);

        let (connack_tx, connack_rx) = oneshot::channel();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.drive(event_loop, connack_tx).await;
        });
        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }

        let timeout = self.config.connection_timeout;
        let outcome = match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(ProtocolError::ConnectionFailed(reason)),
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => Err(ProtocolError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    "Connected to MQTT broker"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    host = %self.config.host,
                    port = %self.config.port,
                    error = %e,
                    "MQTT connection failed"
                );
                self.abort_event_loop();
                *self.client.write() = None;
                Err(e)
            }
        }
    }

    /// Subscribes to the report topic of a registered printer.
    ///
    /// Registration is the caller's job: a serial missing from the
    /// subscription set is skipped, so a stale list of serials cannot bring
    /// back a printer removed in the meantime. Returns whether a
    /// subscription was sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotConnected`] before [`connect`](Self::connect),
    /// or [`ProtocolError::Subscribe`] if the client rejects the request.
    pub(crate) async fn subscribe(&self, serial: &str) -> Result<bool, ProtocolError> {
        let client = self.client()?;
        if !self.subscriptions.contains(serial) {
            tracing::debug!(serial = %serial, "Skipping subscription for removed printer");
            return Ok(false);
        }

        let topic = report_topic(serial);
        client
            .subscribe(topic.as_str(), QOS)
            .await
            .map_err(|source| ProtocolError::Subscribe {
                topic: topic.clone(),
                source,
            })?;

        // Removed while the request was queued: its unsubscribe may already
        // be ahead of this subscribe.
        if !self.subscriptions.contains(serial) {
            if let Err(e) = client.unsubscribe(topic.as_str()).await {
                tracing::warn!(topic = %topic, error = %e, "Failed to unsubscribe");
            }
            return Ok(false);
        }

        tracing::debug!(serial = %serial, topic = %topic, "Subscribed to printer reports");
        Ok(true)
    }

    /// Forgets a printer and unsubscribes from its report topic.
    ///
    /// Unsubscribe failures are logged: the serial is no longer registered,
    /// so stray reports are ignored anyway.
    pub(crate) async fn unsubscribe(&self, serial: &str) {
        self.subscriptions.remove(serial);
        let Ok(client) = self.client() else {
            return;
        };
        let topic = report_topic(serial);
        if let Err(e) = client.unsubscribe(topic.as_str()).await {
            tracing::warn!(topic = %topic, error = %e, "Failed to unsubscribe");
        } else {
            tracing::debug!(serial = %serial, topic = %topic, "Unsubscribed from printer reports");
        }
    }

    /// Subscribes every registered printer again.
    async fn resubscribe_all(&self) {
        for serial in self.subscriptions.to_vec() {
            if let Err(e) = self.subscribe(&serial).await {
                tracing::warn!(serial = %serial, error = %e, "Re-subscription failed");
            }
        }
    }

    /// Encodes `command` with the next sequence id and publishes it to the
    /// printer's request topic.
    ///
    /// Failures are returned, never retried.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotConnected`] without a session,
    /// [`ProtocolError::ConnectionLost`] once reconnection gave up,
    /// [`ProtocolError::Encode`] if the body cannot be serialized, and
    /// [`ProtocolError::Publish`] if the client rejects the request.
    pub(crate) async fn publish(&self, serial: &str, command: &Command) -> Result<(), ProtocolError> {
        if self.is_link_lost() {
            return Err(ProtocolError::ConnectionLost);
        }
        let client = self.client()?;
        let payload = command.encode(self.sequence.next_id())?;
        let topic = request_topic(serial);
        client
            .publish(topic.as_str(), QOS, false, payload)
            .await
            .map_err(|source| ProtocolError::Publish {
                topic: topic.clone(),
                source,
            })?;
        tracing::debug!(
            serial = %serial,
            topic = %topic,
            command = command.name().unwrap_or_default(),
            "Published command"
        );
        Ok(())
    }

    /// Closes the session.
    ///
    /// Sends a DISCONNECT and gives the event loop the configured linger to
    /// flush it. The loop is aborted if it does not stop in time. Never
    /// fails: every step runs even if an earlier one did not succeed.
    pub(crate) async fn disconnect(&self) {
        self.closing.store(true, Ordering::Release);
        let linger = self.config.disconnect_linger;

        let client = self.client.write().take();
        if let Some(client) = client {
            match tokio::time::timeout(linger, client.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "MQTT disconnect request failed"),
                Err(_) => tracing::warn!("MQTT disconnect request timed out"),
            }
        }

        let handle = self.event_loop.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(linger, &mut handle).await.is_err() {
                self.stop.trigger();
                if tokio::time::timeout(linger, &mut handle).await.is_err() {
                    handle.abort();
                }
            }
        }
        self.stop.trigger();

        self.connected.store(false, Ordering::Release);
        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            "Disconnected from MQTT broker"
        );
    }

    /// Stops the event loop without a clean DISCONNECT.
    pub(crate) fn abort(&self) {
        self.closing.store(true, Ordering::Release);
        self.stop.trigger();
        self.abort_event_loop();
    }

    fn abort_event_loop(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::Release);
    }

    fn client(&self) -> Result<AsyncClient, ProtocolError> {
        self.client
            .read()
            .as_ref()
            .cloned()
            .ok_or(ProtocolError::NotConnected)
    }

    /// Polls the event loop until stopped, closed, or out of reconnect
    /// attempts.
    ///
    /// The outcome of the first connection attempt is reported on
    /// `connack_tx`; a failure there ends the loop.
    async fn drive(
        self: Arc<Self>,
        mut event_loop: EventLoop,
        connack_tx: oneshot::Sender<Result<(), String>>,
    ) {
        let mut connack_tx = Some(connack_tx);
        let mut stop = self.stop.listener();
        let mut failures: u32 = 0;

        loop {
            let event = tokio::select! {
                biased;
                () = stop.wait() => break,
                event = event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    tracing::debug!(?connack, "MQTT broker connected");
                    failures = 0;
                    self.connected.store(true, Ordering::Release);
                    if let Some(tx) = connack_tx.take() {
                        let _ = tx.send(Ok(()));
                    } else {
                        tracing::info!("Reconnected to MQTT broker, re-subscribing");
                        // Subscribing awaits this loop, so it must not run on it.
                        let manager = Arc::clone(&self);
                        tokio::spawn(async move { manager.resubscribe_all().await });
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    tracing::debug!(?suback, "MQTT subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    tracing::debug!(
                        topic = %publish.topic,
                        bytes = publish.payload.len(),
                        "MQTT message received"
                    );
                    let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                    if !self.queue.push(message) {
                        tracing::debug!("Inbound queue closed, message discarded");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::info!("MQTT broker sent disconnect");
                    self.connected.store(false, Ordering::Release);
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    if self.closing.load(Ordering::Acquire) {
                        break;
                    }
                    if let Some(tx) = connack_tx.take() {
                        let _ = tx.send(Err(e.to_string()));
                        break;
                    }

                    failures = failures.saturating_add(1);
                    if self
                        .config
                        .max_reconnect_attempts
                        .is_some_and(|max| failures >= max)
                    {
                        tracing::error!(
                            error = %e,
                            attempts = failures,
                            "MQTT reconnection exhausted, giving up"
                        );
                        self.link_lost.store(true, Ordering::Release);
                        break;
                    }

                    tracing::error!(error = %e, attempt = failures, "MQTT event loop error");
                    tokio::select! {
                        biased;
                        () = stop.wait() => break,
                        () = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }

        tracing::debug!("MQTT event loop stopped");
    }
}

impl CommandSink for ConnectionManager {
    fn serials(&self) -> Vec<String> {
        self.subscriptions.to_vec()
    }

    async fn publish(&self, serial: &str, command: &Command) -> Result<(), ProtocolError> {
        ConnectionManager::publish(self, serial, command).await
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn manager() -> Arc<ConnectionManager> {
        manager_on(1)
    }

    fn manager_on(port: u16) -> Arc<ConnectionManager> {
        let config = PoolConfig::builder()
            .host("127.0.0.1")
            .port(port)
            .tls(false)
            .connection_timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        Arc::new(ConnectionManager::new(
            config,
            Arc::new(SubscriptionSet::new()),
            Arc::new(MessageQueue::new(8)),
        ))
    }

    #[test]
    fn client_ids_are_unique() {
        let a = next_client_id("bambu_pool");
        let b = next_client_id("bambu_pool");
        assert_ne!(a, b);
        assert!(a.starts_with("bambu_pool_"));
    }

    #[tokio::test]
    async fn publish_before_connect_fails_fast() {
        let manager = manager();
        let err = manager
            .publish("SN1", &Command::push_all())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
    }

    #[tokio::test]
    async fn subscribe_before_connect_fails() {
        let manager = manager();
        manager.subscriptions.insert("SN1");
        let err = manager.subscribe("SN1").await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
        assert_eq!(CommandSink::serials(manager.as_ref()), vec!["SN1".to_string()]);

        manager.unsubscribe("SN1").await;
        assert!(CommandSink::serials(manager.as_ref()).is_empty());
    }

    #[tokio::test]
    async fn stale_serial_list_does_not_resurrect_removed_printer() {
        let port = test_support::next_port();
        test_support::start_mock_broker(port).await;

        let manager = manager_on(port);
        manager.subscriptions.insert("SN1");
        manager.subscriptions.insert("SN2");
        manager.connect().await.unwrap();

        // A resubscribe pass lists serials, then SN2 is removed before it runs
        let listed = manager.subscriptions.to_vec();
        manager.unsubscribe("SN2").await;

        let mut sent = Vec::new();
        for serial in &listed {
            if manager.subscribe(serial).await.unwrap() {
                sent.push(serial.clone());
            }
        }
        assert_eq!(sent, vec!["SN1".to_string()]);
        assert_eq!(CommandSink::serials(manager.as_ref()), vec!["SN1".to_string()]);

        manager.disconnect().await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let manager = manager();
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ConnectionFailed(_) | ProtocolError::Timeout(_)
        ));
        assert!(!manager.is_connected());
        assert!(matches!(
            manager.publish("SN1", &Command::push_all()).await,
            Err(ProtocolError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_harmless() {
        let manager = manager();
        manager.disconnect().await;
        assert!(!manager.is_connected());
    }

    #[test]
    fn debug_shows_endpoint() {
        let manager = manager();
        let debug = format!("{manager:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
