// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pool configuration.

use std::time::Duration;

use crate::error::Error;

/// Cloud broker for accounts registered in mainland China.
pub const CLOUD_HOST_CN: &str = "cn.mqtt.bambulab.cn";
/// Cloud broker for all other accounts.
pub const CLOUD_HOST_US: &str = "us.mqtt.bambulab.com";

/// Settings for a [`DevicePool`](super::DevicePool).
///
/// Built with [`PoolConfig::builder`]. The values are usually supplied by an
/// account/session layer that knows the broker, the credentials and the
/// printers bound to the account.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) credentials: Option<(String, String)>,
    pub(crate) serials: Vec<String>,
    pub(crate) tls: bool,
    pub(crate) keep_alive: Duration,
    pub(crate) connection_timeout: Duration,
    pub(crate) refresh_interval: Duration,
    pub(crate) min_refresh_interval: Duration,
    pub(crate) workers: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) disconnect_linger: Duration,
    pub(crate) reconnect_delay: Duration,
    pub(crate) max_reconnect_attempts: Option<u32>,
    pub(crate) max_packet_size: usize,
    pub(crate) client_id_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8883,
            credentials: None,
            serials: Vec::new(),
            tls: true,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(10),
            min_refresh_interval: Duration::from_secs(10),
            workers: 10,
            queue_capacity: 200,
            disconnect_linger: Duration::from_millis(250),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: None,
            max_packet_size: 256 * 1024,
            client_id_prefix: "bambu_pool".to_string(),
        }
    }
}

impl PoolConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the configured username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(u, _)| u.as_str())
    }

    /// Returns the printers registered at construction.
    #[must_use]
    pub fn serials(&self) -> &[String] {
        &self.serials
    }

    /// Returns whether the connection uses TLS.
    #[must_use]
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Returns the interval between periodic refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns the minimum time between two refreshes of the same printer.
    #[must_use]
    pub fn min_refresh_interval(&self) -> Duration {
        self.min_refresh_interval
    }

    /// Returns the number of message workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the inbound queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

/// Builder for [`PoolConfig`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bambu_pool::pool::PoolConfig;
///
/// let config = PoolConfig::builder()
///     .host("192.168.1.40")
///     .credentials("bblp", "12345678")
///     .serial("01S00A000000000")
///     .min_refresh_interval(Duration::from_secs(30))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.port(), 8883);
/// assert_eq!(config.serials().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 8883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the username and access token.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), token.into()));
        self
    }

    /// Targets the cloud broker for an account.
    ///
    /// Sets the host, port 8883, TLS and the `u_{uid}` username the cloud
    /// broker expects, with the account access token as password.
    #[must_use]
    pub fn cloud(mut self, host: impl Into<String>, uid: u64, access_token: impl Into<String>) -> Self {
        self.config.host = host.into();
        self.config.port = 8883;
        self.config.tls = true;
        self.config.credentials = Some((format!("u_{uid}"), access_token.into()));
        self
    }

    /// Registers a printer. Duplicates are ignored.
    #[must_use]
    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        if !self.config.serials.contains(&serial) {
            self.config.serials.push(serial);
        }
        self
    }

    /// Registers several printers.
    #[must_use]
    pub fn serials<I, S>(self, serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        serials.into_iter().fold(self, Self::serial)
    }

    /// Enables or disables TLS (default: enabled).
    #[must_use]
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls = enabled;
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the periodic refresh tick (default: 10 seconds).
    #[must_use]
    pub fn refresh_interval(mut self, duration: Duration) -> Self {
        self.config.refresh_interval = duration;
        self
    }

    /// Sets the minimum time between two refreshes of one printer
    /// (default: 10 seconds).
    #[must_use]
    pub fn min_refresh_interval(mut self, duration: Duration) -> Self {
        self.config.min_refresh_interval = duration;
        self
    }

    /// Sets the number of message workers (default: 10).
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the inbound queue capacity (default: 200).
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Sets how long disconnect waits for the transport to close
    /// (default: 250 ms).
    #[must_use]
    pub fn disconnect_linger(mut self, duration: Duration) -> Self {
        self.config.disconnect_linger = duration;
        self
    }

    /// Sets the pause between reconnect attempts (default: 1 second).
    #[must_use]
    pub fn reconnect_delay(mut self, duration: Duration) -> Self {
        self.config.reconnect_delay = duration;
        self
    }

    /// Gives up after this many consecutive connection failures
    /// (default: never).
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the largest MQTT packet accepted or sent (default: 256 KiB).
    #[must_use]
    pub fn max_packet_size(mut self, bytes: usize) -> Self {
        self.config.max_packet_size = bytes;
        self
    }

    /// Sets the MQTT client id prefix (default: `bambu_pool`).
    #[must_use]
    pub fn client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.client_id_prefix = prefix.into();
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if:
    /// - the host is empty
    /// - the worker count or queue capacity is zero
    /// - the refresh tick is zero
    /// - the keep-alive is shorter than one second but not zero
    pub fn build(self) -> Result<PoolConfig, Error> {
        let config = self.config;
        if config.host.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "broker host is required".to_string(),
            ));
        }
        if config.workers == 0 {
            return Err(Error::InvalidConfiguration(
                "at least one worker is required".to_string(),
            ));
        }
        if config.queue_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if config.refresh_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "refresh interval must be positive".to_string(),
            ));
        }
        if !config.keep_alive.is_zero() && config.keep_alive < Duration::from_secs(1) {
            return Err(Error::InvalidConfiguration(
                "keep-alive must be zero or at least one second".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.port, 8883);
        assert!(config.tls);
        assert_eq!(config.keep_alive, Duration::from_secs(30));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.refresh_interval, Duration::from_secs(10));
        assert_eq!(config.min_refresh_interval, Duration::from_secs(10));
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_capacity, 200);
        assert_eq!(config.disconnect_linger, Duration::from_millis(250));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert!(config.max_reconnect_attempts.is_none());
        assert_eq!(config.client_id_prefix, "bambu_pool");
    }

    #[test]
    fn builder_chain() {
        let config = PoolConfig::builder()
            .host("10.0.0.2")
            .port(1883)
            .tls(false)
            .credentials("bblp", "code")
            .workers(2)
            .queue_capacity(16)
            .max_reconnect_attempts(3)
            .build()
            .unwrap();

        assert_eq!(config.host(), "10.0.0.2");
        assert_eq!(config.port(), 1883);
        assert!(!config.tls());
        assert_eq!(config.username(), Some("bblp"));
        assert_eq!(config.workers(), 2);
        assert_eq!(config.queue_capacity(), 16);
        assert_eq!(config.max_reconnect_attempts, Some(3));
    }

    #[test]
    fn cloud_sets_account_username() {
        let config = PoolConfig::builder()
            .port(1883)
            .tls(false)
            .cloud(CLOUD_HOST_US, 42, "token")
            .build()
            .unwrap();

        assert_eq!(config.host(), CLOUD_HOST_US);
        assert_eq!(config.port(), 8883);
        assert!(config.tls());
        assert_eq!(config.username(), Some("u_42"));
    }

    #[test]
    fn serials_are_deduplicated() {
        let config = PoolConfig::builder()
            .host("h")
            .serials(["SN1", "SN2"])
            .serial("SN1")
            .build()
            .unwrap();
        assert_eq!(config.serials(), ["SN1".to_string(), "SN2".to_string()]);
    }

    #[test]
    fn missing_host_fails() {
        let err = PoolConfig::builder().build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_workers_or_capacity_fail() {
        assert!(PoolConfig::builder().host("h").workers(0).build().is_err());
        assert!(
            PoolConfig::builder()
                .host("h")
                .queue_capacity(0)
                .build()
                .is_err()
        );
        assert!(
            PoolConfig::builder()
                .host("h")
                .refresh_interval(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn sub_second_keep_alive_fails() {
        let build = |keep_alive| PoolConfig::builder().host("h").keep_alive(keep_alive).build();
        assert!(build(Duration::from_millis(500)).is_err());
        assert!(build(Duration::ZERO).is_ok());
        assert!(build(Duration::from_secs(5)).is_ok());
    }
}
