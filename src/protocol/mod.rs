// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT plumbing shared by every printer of a pool.
//!
//! One session carries the traffic of all printers:
//!
//! - printers publish partial reports on `device/{serial}/report`
//! - commands go to `device/{serial}/request`
//!
//! Inbound publishes are pushed onto a bounded queue by the session's event
//! loop and merged by a fixed set of workers, so a slow merge never stalls
//! the MQTT keep-alive. When the queue is full the oldest message is
//! dropped; printers resend their state on the next refresh.

mod connection;
mod dispatcher;
mod subscriptions;
mod topic;

pub use dispatcher::{DispatcherStatsSnapshot, InboundMessage};
pub use topic::{report_topic, request_topic, serial_from_report_topic};

pub(crate) use connection::ConnectionManager;
pub(crate) use dispatcher::{Dispatcher, MessageQueue};
pub(crate) use subscriptions::SubscriptionSet;
