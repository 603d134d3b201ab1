// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot stop signal shared by background tasks.

use tokio::sync::watch;

/// Broadcast stop signal.
///
/// Triggering is sticky: a task that subscribes after the trigger sees it
/// immediately.
#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Signals every listener. Idempotent.
    pub(crate) fn trigger(&self) {
        self.tx.send_replace(true);
    }

    #[cfg(test)]
    pub(crate) fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub(crate) struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once the signal has been triggered.
    pub(crate) async fn wait(&mut self) {
        // A dropped sender also counts as stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
