// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device pool: many printers behind one MQTT session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use tokio::task::{self, JoinHandle, JoinSet};

use crate::decode::{Decoder, PrinterDecoder};
use crate::error::{AggregateError, DecodeError, DeviceFailure, Error, ProtocolError, Result};
use crate::protocol::{
    ConnectionManager, Dispatcher, DispatcherStatsSnapshot, MessageQueue, SubscriptionSet,
};
use crate::refresh::RefreshScheduler;
use crate::shutdown::Shutdown;
use crate::state::{RawReport, RawStateStore};

use super::{PoolConfig, PoolState, Printer};

/// Result of a parallel decode over every printer.
///
/// Holds the states that decoded and the failures of the others, so a
/// caller can use partial results.
#[derive(Debug)]
pub struct DecodedStates<T> {
    states: HashMap<String, T>,
    failures: AggregateError,
}

impl<T> DecodedStates<T> {
    /// Returns the decoded states keyed by serial.
    #[must_use]
    pub fn states(&self) -> &HashMap<String, T> {
        &self.states
    }

    /// Returns the decoded state of one printer.
    #[must_use]
    pub fn get(&self, serial: &str) -> Option<&T> {
        self.states.get(serial)
    }

    /// Returns the per-printer failures.
    #[must_use]
    pub fn failures(&self) -> &AggregateError {
        &self.failures
    }

    /// Returns true if every printer decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Splits into the decoded states and the failures.
    #[must_use]
    pub fn into_parts(self) -> (HashMap<String, T>, AggregateError) {
        (self.states, self.failures)
    }

    /// Returns the states if every printer decoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aggregate`] listing every failed printer. The states
    /// that did decode are discarded; use [`into_parts`](Self::into_parts)
    /// to keep them.
    pub fn into_result(self) -> Result<HashMap<String, T>> {
        self.failures.into_result()?;
        Ok(self.states)
    }
}

/// A pool of printers sharing one MQTT session.
///
/// The pool owns the connection manager, the dispatcher workers, the refresh
/// scheduler and the raw state store. Printers can be added before or after
/// [`connect_all`](Self::connect_all).
///
/// Lifecycle: `Unconnected -> Connecting -> Connected -> Disconnected`.
/// A failed connect returns to `Unconnected`; `Disconnected` is final.
///
/// # Examples
///
/// ```no_run
/// use bambu_pool::pool::{DevicePool, PoolConfig};
///
/// # async fn example() -> bambu_pool::Result<()> {
/// let config = PoolConfig::builder()
///     .host("us.mqtt.bambulab.com")
///     .credentials("u_1234567", "access-token")
///     .serials(["01S00A000000001", "01S00A000000002"])
///     .build()?;
///
/// let pool = DevicePool::new(config);
/// pool.connect_all().await?;
///
/// let decoded = pool.get_decoded_states().await?;
/// for (serial, state) in decoded.states() {
///     println!("{serial}: bed {} C, {}", state.bed_temperature, state.gcode_state);
/// }
/// for failure in decoded.failures().failures() {
///     eprintln!("{}: {}", failure.serial(), failure.error());
/// }
///
/// pool.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct DevicePool<D: Decoder = PrinterDecoder> {
    config: PoolConfig,
    state: Arc<RwLock<PoolState>>,
    printers: DashMap<String, Printer>,
    store: Arc<RawStateStore>,
    subscriptions: Arc<SubscriptionSet>,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<ConnectionManager>,
    scheduler: Arc<RefreshScheduler<ConnectionManager>>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    decoder: Arc<D>,
    shutdown: Shutdown,
}

impl DevicePool<PrinterDecoder> {
    /// Creates a pool decoding with [`PrinterDecoder`].
    ///
    /// Printers listed in the configuration are registered immediately.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self::with_decoder(config, PrinterDecoder)
    }
}

impl<D: Decoder> DevicePool<D> {
    /// Creates a pool with a custom decoder.
    #[must_use]
    pub fn with_decoder(config: PoolConfig, decoder: D) -> Self {
        let store = Arc::new(RawStateStore::new());
        let subscriptions = Arc::new(SubscriptionSet::new());
        let queue = Arc::new(MessageQueue::new(config.queue_capacity));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&subscriptions),
        ));
        let connection = Arc::new(ConnectionManager::new(
            config.clone(),
            Arc::clone(&subscriptions),
            queue,
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&connection),
            config.refresh_interval,
            config.min_refresh_interval,
        ));

        let pool = Self {
            state: Arc::new(RwLock::new(PoolState::Unconnected)),
            printers: DashMap::new(),
            store,
            subscriptions,
            dispatcher,
            connection,
            scheduler,
            scheduler_task: Mutex::new(None),
            decoder: Arc::new(decoder),
            shutdown: Shutdown::new(),
            config,
        };
        for serial in pool.config.serials.clone() {
            pool.register(&serial);
        }
        pool
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns whether the broker link is currently up.
    ///
    /// This can be false while the pool is [`PoolState::Connected`] if the
    /// link dropped and is being re-established.
    #[must_use]
    pub fn is_link_up(&self) -> bool {
        self.connection.is_connected()
    }

    fn ensure_connected(&self) -> Result<()> {
        match *self.state.read() {
            PoolState::Connected => Ok(()),
            PoolState::Disconnected => Err(Error::Closed),
            PoolState::Unconnected | PoolState::Connecting => Err(Error::NotConnected),
        }
    }

    fn ensure_registered(&self, serial: &str) -> Result<()> {
        if self.printers.contains_key(serial) {
            Ok(())
        } else {
            Err(Error::DeviceNotFound(serial.to_string()))
        }
    }

    /// Registers a printer locally. Returns the handle and whether it is new.
    fn register(&self, serial: &str) -> (Printer, bool) {
        match self.printers.entry(serial.to_string()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(slot) => {
                let printer = Printer::new(
                    serial,
                    Arc::clone(&self.connection),
                    Arc::clone(&self.state),
                );
                self.store.register(serial);
                self.subscriptions.insert(serial);
                slot.insert(printer.clone());
                (printer, true)
            }
        }
    }

    /// Moves out of `Connecting`. Fails if a disconnect got there first.
    fn leave_connecting(&self, next: PoolState) -> bool {
        let mut state = self.state.write();
        if *state == PoolState::Connecting {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Closes a session opened by a connect that lost the race against
    /// [`disconnect`](Self::disconnect).
    async fn abandon_connect(&self) -> Error {
        tracing::info!("Pool disconnected while connecting, closing session");
        self.dispatcher.join().await;
        self.connection.disconnect().await;
        Error::Closed
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connects the shared session, subscribes every registered printer and
    /// requests a full state push from each.
    ///
    /// Connecting an already connected pool does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] after [`disconnect`](Self::disconnect), including
    ///   a disconnect that ran while this call was in progress.
    /// - [`Error::Protocol`] if the session cannot be established. The pool
    ///   returns to [`PoolState::Unconnected`] and may be connected again.
    /// - [`Error::Aggregate`] if some subscriptions failed. The pool is
    ///   connected and the other printers are served; failed subscriptions
    ///   are retried on the next reconnect.
    pub async fn connect_all(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                PoolState::Unconnected => *state = PoolState::Connecting,
                PoolState::Connected => return Ok(()),
                PoolState::Connecting => {
                    return Err(ProtocolError::ConnectionFailed(
                        "connection already in progress".to_string(),
                    )
                    .into());
                }
                PoolState::Disconnected => return Err(Error::Closed),
            }
        }

        if let Err(e) = self.connection.connect().await {
            if self.leave_connecting(PoolState::Unconnected) {
                return Err(e.into());
            }
            tracing::debug!(error = %e, "Connect ended after disconnect");
            return Err(Error::Closed);
        }
        if self.state() != PoolState::Connecting {
            return Err(self.abandon_connect().await);
        }

        self.dispatcher.start(self.config.workers, &self.shutdown);
        let failures = self.subscribe_all().await;

        if !self.leave_connecting(PoolState::Connected) {
            return Err(self.abandon_connect().await);
        }
        tracing::info!(
            devices = self.printers.len(),
            failed_subscriptions = failures.len(),
            "Device pool connected"
        );

        self.scheduler.refresh_all().await;
        *self.scheduler_task.lock() = Some(self.scheduler.spawn(self.shutdown.listener()));

        failures.into_result()?;
        Ok(())
    }

    /// Subscribes every registered printer in parallel.
    async fn subscribe_all(&self) -> AggregateError {
        let mut tasks = JoinSet::new();
        let mut serials = HashMap::new();
        for serial in self.subscriptions.to_vec() {
            let connection = Arc::clone(&self.connection);
            let task_serial = serial.clone();
            let handle = tasks.spawn(async move {
                connection
                    .subscribe(&task_serial)
                    .await
                    .map_err(Error::from)
            });
            serials.insert(handle.id(), serial);
        }

        let (_, failures) = join_per_device(tasks, serials).await;
        for failure in failures.failures() {
            tracing::warn!(
                serial = %failure.serial(),
                error = %failure.error(),
                "Subscription failed"
            );
        }
        failures
    }

    /// Shuts the pool down.
    ///
    /// Stops the refresh scheduler, stops accepting inbound messages, lets
    /// the workers finish the message they hold, then closes the session
    /// with the configured linger. Every step runs even if an earlier one
    /// failed. The pool cannot be reconnected afterwards.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.write();
            if *state == PoolState::Disconnected {
                return;
            }
            *state = PoolState::Disconnected;
        }

        self.shutdown.trigger();
        let linger = self.config.disconnect_linger;

        let task = self.scheduler_task.lock().take();
        if let Some(mut task) = task
            && tokio::time::timeout(linger, &mut task).await.is_err()
        {
            tracing::warn!("Refresh scheduler did not stop in time, aborting");
            task.abort();
        }

        self.dispatcher.queue().close();
        self.dispatcher.join().await;
        self.connection.disconnect().await;

        tracing::info!(devices = self.printers.len(), "Device pool disconnected");
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Registers a printer and returns its handle.
    ///
    /// When the pool is connected the printer is subscribed and asked for a
    /// full state push. While a connect is in progress it is subscribed as
    /// soon as the session exists and refreshed by the first tick. Adding a
    /// registered printer returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`disconnect`](Self::disconnect), or
    /// [`Error::Protocol`] if subscribing fails. In that case the printer
    /// stays registered and is subscribed on the next reconnect.
    pub async fn add_device(&self, serial: impl Into<String>) -> Result<Printer> {
        let serial = serial.into();
        if self.state() == PoolState::Disconnected {
            return Err(Error::Closed);
        }

        let (printer, added) = self.register(&serial);
        if !added {
            return Ok(printer);
        }
        tracing::debug!(serial = %serial, "Device added");

        match self.state() {
            PoolState::Connected => {
                self.connection.subscribe(&serial).await?;
                if let Err(e) = self.scheduler.refresh(&serial).await {
                    tracing::warn!(serial = %serial, error = %e, "Initial refresh failed");
                }
            }
            PoolState::Connecting => {
                // The connect may already be past its subscription pass.
                if let Err(e) = self.connection.subscribe(&serial).await {
                    tracing::debug!(serial = %serial, error = %e, "Subscription left to connect");
                }
            }
            PoolState::Unconnected | PoolState::Disconnected => {}
        }
        Ok(printer)
    }

    /// Deregisters a printer.
    ///
    /// Its topic is unsubscribed and its snapshot dropped. A message for it
    /// already being merged completes, but the result is unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the printer is not registered.
    pub async fn remove_device(&self, serial: &str) -> Result<()> {
        if self.printers.remove(serial).is_none() {
            return Err(Error::DeviceNotFound(serial.to_string()));
        }
        self.connection.unsubscribe(serial).await;
        self.store.remove(serial);
        self.scheduler.forget(serial);
        tracing::debug!(serial = %serial, "Device removed");
        Ok(())
    }

    /// Returns the handle of a printer.
    #[must_use]
    pub fn get_device(&self, serial: &str) -> Option<Printer> {
        self.printers.get(serial).map(|entry| entry.value().clone())
    }

    /// Returns the handles of every printer, sorted by serial.
    #[must_use]
    pub fn list_devices(&self) -> Vec<Printer> {
        let mut printers: Vec<Printer> = self
            .printers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        printers.sort_by(|a, b| a.serial().cmp(b.serial()));
        printers
    }

    /// Returns the number of registered printers.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.printers.len()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Returns a copy of a printer's merged raw snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`]/[`Error::Closed`] outside the
    /// connected state, or [`Error::DeviceNotFound`].
    pub fn raw_state(&self, serial: &str) -> Result<RawReport> {
        self.ensure_connected()?;
        self.ensure_registered(serial)?;
        self.store
            .report(serial)
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))
    }

    /// Returns when a message from the printer was last merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the printer is not registered.
    pub fn last_updated(&self, serial: &str) -> Result<Option<DateTime<Utc>>> {
        self.ensure_registered(serial)?;
        Ok(self.store.last_merged(serial))
    }

    /// Returns the printers that have not reported within `max_age`,
    /// sorted by serial.
    #[must_use]
    pub fn stale_devices(&self, max_age: chrono::Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .printers
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|serial| self.store.is_stale(serial, max_age))
            .collect();
        stale.sort();
        stale
    }

    /// Decodes one printer's snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`]/[`Error::Closed`] outside the
    /// connected state, [`Error::DeviceNotFound`], or [`Error::Decode`].
    pub fn decoded_state(&self, serial: &str) -> Result<D::Output> {
        self.ensure_connected()?;
        self.ensure_registered(serial)?;
        decode_one(&self.store, self.decoder.as_ref(), serial)
    }

    /// Decodes every printer's snapshot in parallel.
    ///
    /// A printer that fails to decode, or that has not reported yet, is
    /// listed in [`DecodedStates::failures`] without affecting the others.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`]/[`Error::Closed`] outside the
    /// connected state.
    pub async fn get_decoded_states(&self) -> Result<DecodedStates<D::Output>> {
        self.ensure_connected()?;

        let mut tasks = JoinSet::new();
        let mut serials = HashMap::new();
        for serial in self.printers.iter().map(|entry| entry.key().clone()) {
            let store = Arc::clone(&self.store);
            let decoder = Arc::clone(&self.decoder);
            let task_serial = serial.clone();
            let handle =
                tasks.spawn(async move { decode_one(&store, decoder.as_ref(), &task_serial) });
            serials.insert(handle.id(), serial);
        }

        let (states, failures) = join_per_device(tasks, serials).await;
        for failure in failures.failures() {
            tracing::debug!(serial = %failure.serial(), error = %failure.error(), "Decode failed");
        }

        Ok(DecodedStates { states, failures })
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Requests a full state push from one printer, subject to the minimum
    /// refresh interval.
    ///
    /// Returns `false` if the request was throttled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`]/[`Error::Closed`] outside the
    /// connected state, [`Error::DeviceNotFound`], or [`Error::Protocol`].
    pub async fn refresh(&self, serial: &str) -> Result<bool> {
        self.ensure_connected()?;
        self.ensure_registered(serial)?;
        Ok(self.scheduler.refresh(serial).await?)
    }

    /// Requests a full state push from every printer, subject to the
    /// minimum refresh interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`]/[`Error::Closed`] outside the
    /// connected state, or [`Error::Aggregate`] listing the printers whose
    /// request failed. The others were still sent.
    pub async fn refresh_all(&self) -> Result<()> {
        self.ensure_connected()?;
        self.scheduler.refresh_all().await.into_result()?;
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Returns the dispatcher counters.
    #[must_use]
    pub fn dispatcher_stats(&self) -> DispatcherStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Returns the number of messages waiting for a worker.
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.dispatcher.queue().len()
    }
}

/// Joins per-device tasks. A task that panicked is reported against the
/// printer it ran for.
async fn join_per_device<T: Send + 'static>(
    mut tasks: JoinSet<Result<T>>,
    mut serials: HashMap<task::Id, String>,
) -> (HashMap<String, T>, AggregateError) {
    let mut done = HashMap::with_capacity(serials.len());
    let mut failures = AggregateError::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                tracing::error!(error = %e, "Per-device task failed");
                (e.id(), Err(Error::TaskFailed(e.to_string())))
            }
        };
        let Some(serial) = serials.remove(&id) else {
            continue;
        };
        match result {
            Ok(value) => {
                done.insert(serial, value);
            }
            Err(e) => failures.push(DeviceFailure::new(serial, e)),
        }
    }
    (done, failures)
}

fn decode_one<D: Decoder>(store: &RawStateStore, decoder: &D, serial: &str) -> Result<D::Output> {
    let snapshot = store
        .snapshot(serial)
        .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))?;
    if snapshot.last_merged.is_none() {
        return Err(DecodeError::NoData.into());
    }
    Ok(decoder.decode(serial, &snapshot.report)?)
}

impl<D: Decoder> Drop for DevicePool<D> {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.connection.abort();
    }
}

impl<D: Decoder> std::fmt::Debug for DevicePool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("state", &self.state())
            .field("devices", &self.printers.len())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
