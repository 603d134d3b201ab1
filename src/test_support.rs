// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for unit tests that need a broker.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use rumqttc::{AsyncClient, MqttOptions, QoS};

/// Returns a port no other unit test uses.
pub(crate) fn next_port() -> u16 {
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
pub(crate) async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind
    tokio::time::sleep(Duration::from_millis(500)).await;
}

/// Connects a plain client that plays the printer side.
pub(crate) fn printer_client(port: u16) -> AsyncClient {
    let mut options = MqttOptions::new(format!("printer_{port}"), "127.0.0.1", port);
    options.set_keep_alive(Duration::from_secs(5));
    let (client, mut event_loop) = AsyncClient::new(options, 16);
    tokio::spawn(async move { while event_loop.poll().await.is_ok() {} });
    client
}

/// Publishes a report as printer `serial`.
pub(crate) async fn publish_report(client: &AsyncClient, serial: &str, body: &str) {
    client
        .publish(
            format!("device/{serial}/report"),
            QoS::AtMostOnce,
            false,
            body.as_bytes().to_vec(),
        )
        .await
        .unwrap();
}
