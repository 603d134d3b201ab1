// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lightweight handle to one printer of a pool.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::protocol::ConnectionManager;

use super::PoolState;

/// Handle to a printer registered in a [`DevicePool`](super::DevicePool).
///
/// The handle carries only the serial and references the pool's shared
/// connection; it owns no connection state. Cloning is cheap.
///
/// Commands fail with [`Error::NotConnected`] until the pool is connected
/// and with [`Error::Closed`] after it was disconnected.
#[derive(Clone)]
pub struct Printer {
    serial: Arc<str>,
    connection: Arc<ConnectionManager>,
    pool_state: Arc<RwLock<PoolState>>,
}

impl Printer {
    pub(crate) fn new(
        serial: &str,
        connection: Arc<ConnectionManager>,
        pool_state: Arc<RwLock<PoolState>>,
    ) -> Self {
        Self {
            serial: Arc::from(serial),
            connection,
            pool_state,
        }
    }

    /// Returns the printer serial.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Publishes a command to the printer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] or [`Error::Closed`] when the pool is
    /// not connected, and [`Error::Protocol`] if publishing fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bambu_pool::command::{Command, MessageClass};
    /// use bambu_pool::pool::{DevicePool, PoolConfig};
    ///
    /// # async fn example() -> bambu_pool::Result<()> {
    /// let config = PoolConfig::builder()
    ///     .host("192.168.1.40")
    ///     .credentials("bblp", "12345678")
    ///     .serial("01S00A000000000")
    ///     .build()?;
    /// let pool = DevicePool::new(config);
    /// pool.connect_all().await?;
    ///
    /// let printer = pool.get_device("01S00A000000000").unwrap();
    /// printer
    ///     .send(Command::new(MessageClass::System).with_command("get_access_code"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send(&self, command: Command) -> Result<()> {
        let state = *self.pool_state.read();
        match state {
            PoolState::Connected => {}
            PoolState::Disconnected => return Err(Error::Closed),
            PoolState::Unconnected | PoolState::Connecting => return Err(Error::NotConnected),
        }
        self.connection.publish(&self.serial, &command).await?;
        Ok(())
    }

    /// Requests a full state report.
    ///
    /// Unlike the pool's refresh, this is not throttled.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn push_all(&self) -> Result<()> {
        self.send(Command::push_all()).await
    }

    /// Pauses the print job.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn pause(&self) -> Result<()> {
        self.send(Command::pause()).await
    }

    /// Resumes the print job.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn resume(&self) -> Result<()> {
        self.send(Command::resume()).await
    }

    /// Stops the print job.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn stop(&self) -> Result<()> {
        self.send(Command::stop()).await
    }

    /// Sends raw G-code, one or more lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Value`] if a line is malformed, otherwise see
    /// [`send`](Self::send).
    pub async fn send_gcode(&self, gcode: &str) -> Result<()> {
        let command = Command::gcode_line(gcode)?;
        self.send(command).await
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}
