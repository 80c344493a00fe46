// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Human-readable notifications.
//!
//! Notifications are observational only: delivery failures are logged and
//! dropped, never returned to the operation that triggered them.
//! [`NotificationOutbox`] decouples emission from delivery; the lifecycle
//! pushes into it after an order is persisted and the owner flushes it into
//! a [`Notifier`] such as [`NotificationFeed`].

use crate::base::{BodegaId, CourierId, OrderId, new_record_id};
use crate::error::NotifyError;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Shopkeeper,
    Warehouse,
    Courier,
    All,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shopkeeper => "shopkeeper",
            Self::Warehouse => "warehouse",
            Self::Courier => "courier",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub audience: Audience,
    #[serde(default)]
    pub bodega_id: Option<BodegaId>,
    #[serde(default)]
    pub courier_id: Option<CourierId>,
    #[serde(default, rename = "pedidoId")]
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(audience: Audience, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: new_record_id(),
            title: title.into(),
            message: message.into(),
            audience,
            bodega_id: None,
            courier_id: None,
            order_id: None,
            created_at: Utc::now(),
            read: false,
        }
    }

    pub fn for_bodega(mut self, bodega_id: &BodegaId) -> Self {
        self.bodega_id = Some(bodega_id.clone());
        self
    }

    pub fn for_courier(mut self, courier_id: &CourierId) -> Self {
        self.courier_id = Some(courier_id.clone());
        self
    }

    pub fn about(mut self, order_id: &OrderId) -> Self {
        self.order_id = Some(order_id.clone());
        self
    }
}

/// Fire-and-forget sink for notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Feed query. `audience` also matches notifications sent to [`Audience::All`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFilter {
    pub audience: Option<Audience>,
    pub bodega_id: Option<BodegaId>,
    pub courier_id: Option<CourierId>,
    #[serde(default)]
    pub unread_only: bool,
}

impl FeedFilter {
    pub fn audience(audience: Audience) -> Self {
        Self {
            audience: Some(audience),
            ..Self::default()
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        self.audience.is_none_or(|audience| {
            notification.audience == audience || notification.audience == Audience::All
        }) && self
            .bodega_id
            .as_ref()
            .is_none_or(|id| notification.bodega_id.as_ref() == Some(id))
            && self
                .courier_id
                .as_ref()
                .is_none_or(|id| notification.courier_id.as_ref() == Some(id))
            && !(self.unread_only && notification.read)
    }
}

/// Append-only in-memory feed.
#[derive(Debug, Default)]
pub struct NotificationFeed {
    entries: RwLock<Vec<Notification>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching notifications, oldest first.
    pub fn list(&self, filter: &FeedFilter) -> Vec<Notification> {
        self.entries
            .read()
            .iter()
            .filter(|notification| filter.matches(notification))
            .cloned()
            .collect()
    }

    /// Returns `false` if no notification has that id.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|notification| notification.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.entries.read().clone()
    }

    pub(crate) fn restore(&self, notifications: Vec<Notification>) {
        *self.entries.write() = notifications;
    }
}

impl Notifier for NotificationFeed {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.entries.write().push(notification);
        Ok(())
    }
}

/// Lock-free queue of notifications awaiting delivery.
#[derive(Debug, Default)]
pub struct NotificationOutbox {
    queue: SegQueue<Notification>,
    /// Held while draining so concurrent flushes cannot reorder deliveries.
    flushing: Mutex<()>,
}

impl NotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Delivers everything queued so far to `sink`, in FIFO order.
    ///
    /// Failed deliveries are logged and dropped. Returns how many were delivered.
    pub fn flush(&self, sink: &dyn Notifier) -> usize {
        let _flushing = self.flushing.lock();
        let mut delivered = 0;
        while let Some(notification) = self.queue.pop() {
            let id = notification.id.clone();
            match sink.notify(notification) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(notification_id = %id, error = %err, "dropping notification"),
            }
        }
        delivered
    }
}

impl Notifier for NotificationOutbox {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.queue.push(notification);
        Ok(())
    }
}
