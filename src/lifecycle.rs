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

//! Order lifecycle controller.
//!
//! [`OrderLifecycle::update_order`] is the only path that changes an order's
//! status. One update runs as:
//!
//! 1. load the order ([`LedgerError::NotFound`]),
//! 2. validate the requested transition ([`LedgerError::InvalidTransition`]),
//! 3. merge the patch and stamp `updated_at`,
//! 4. settle if the order is now delivered and not yet settled,
//! 5. persist with compare-and-swap,
//! 6. emit notifications.
//!
//! Any failure in steps 1-5 returns before a notification is emitted.
//! Updates to one order are serialized by a per-order lock, so a racing
//! second update sees the first one's result.

use crate::base::OrderId;
use crate::notify::{Audience, Notification, Notifier};
use crate::order::{Order, OrderPatch};
use crate::settlement::SettlementEngine;
use crate::status::{OrderStatus, validate_transition};
use crate::store::OrderStore;
use crate::LedgerError;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    settlement: Arc<SettlementEngine>,
    notifier: Arc<dyn Notifier>,
    /// One mutex per order id, created on first update.
    locks: DashMap<OrderId, Arc<Mutex<()>>>,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        settlement: Arc<SettlementEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            settlement,
            notifier,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &dyn OrderStore {
        self.store.as_ref()
    }

    /// Applies `patch` to the order.
    ///
    /// A `status` equal to the current one is ignored; other fields still merge.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] - no such order.
    /// - [`LedgerError::InvalidTransition`] - status not reachable from the current one.
    /// - [`LedgerError::MissingCourier`] - entering `assigned` without a courier.
    /// - [`LedgerError::OrderClosed`] - courier change on a delivered or cancelled order.
    /// - [`LedgerError::SettlementPending`] - an earlier delivery was settled but not
    ///   saved; only `delivered` is accepted until it is.
    /// - [`LedgerError::PersistenceFailure`] - settlement or store write failed.
    pub fn update_order(&self, order_id: &OrderId, patch: OrderPatch) -> Result<Order, LedgerError> {
        if self.store.get(order_id)?.is_none() {
            return Err(LedgerError::order_not_found(order_id));
        }

        let lock = self.locks.entry(order_id.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            self.apply(order_id, patch)
        };
        drop(lock);
        self.locks
            .remove_if(order_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    fn apply(&self, order_id: &OrderId, patch: OrderPatch) -> Result<Order, LedgerError> {
        let current = self
            .store
            .get(order_id)?
            .ok_or_else(|| LedgerError::order_not_found(order_id))?;

        let courier_patch = patch.courier_id.is_some()
            || patch.courier_name.is_some()
            || patch.courier_phone.is_some();

        // Settled but never saved as delivered: only a plain retry may proceed.
        if current.status != OrderStatus::Delivered
            && self.settlement.ledger().contains(order_id)
            && (patch.status != Some(OrderStatus::Delivered) || courier_patch)
        {
            return Err(LedgerError::SettlementPending(order_id.to_string()));
        }

        let status_change = match patch.status {
            Some(requested) if requested != current.status => {
                validate_transition(current.status, requested)?;
                Some((current.status, requested))
            }
            _ => None,
        };

        if courier_patch && current.status.is_terminal() {
            return Err(LedgerError::OrderClosed {
                id: order_id.to_string(),
                status: current.status,
            });
        }

        let mut order = current.clone();
        if let Some((_, to)) = status_change {
            order.status = to;
        }
        if let Some(courier_id) = patch.courier_id {
            order.courier_id = Some(courier_id);
        }
        if let Some(name) = patch.courier_name {
            order.courier_name = Some(name);
        }
        if let Some(phone) = patch.courier_phone {
            order.courier_phone = Some(phone);
        }
        if order.status == OrderStatus::Assigned && order.courier_id.is_none() {
            return Err(LedgerError::MissingCourier(order_id.to_string()));
        }
        order.updated_at = Utc::now();

        if order.status == OrderStatus::Delivered && !order.settlement_applied {
            let settlement = self.settlement.settle(&order)?;
            order.settlement_applied = true;
            order.settlement_applied_at = Some(settlement.entry().created_at);
        }

        let stored = self.store.compare_and_swap(order, current.revision)?;

        if let Some((from, to)) = status_change {
            tracing::info!(order_id = %stored.id, %from, %to, "order status changed");
        }
        let courier_attached =
            stored.courier_id.is_some() && stored.courier_id != current.courier_id;
        self.emit(&stored, status_change, courier_attached);

        Ok(stored)
    }

    fn emit(
        &self,
        order: &Order,
        status_change: Option<(OrderStatus, OrderStatus)>,
        courier_attached: bool,
    ) {
        let mut events = Vec::new();

        if let Some((from, to)) = status_change {
            events.push(
                Notification::new(
                    Audience::Shopkeeper,
                    "Order status updated",
                    format!("Order {} moved from {} to {}", order.id, from, to),
                )
                .for_bodega(&order.bodega_id)
                .about(&order.id),
            );

            if let Some(courier_id) = &order.courier_id {
                let event = if to == OrderStatus::Assigned {
                    Notification::new(
                        Audience::Courier,
                        "Delivery assigned",
                        format!("Order {} has been assigned to you", order.id),
                    )
                } else {
                    Notification::new(
                        Audience::Courier,
                        "Delivery status updated",
                        format!("Order {} is now {}", order.id, to),
                    )
                };
                events.push(
                    event
                        .for_bodega(&order.bodega_id)
                        .for_courier(courier_id)
                        .about(&order.id),
                );
            }
        }

        if courier_attached {
            if let Some(courier_id) = &order.courier_id {
                events.push(
                    Notification::new(
                        Audience::Courier,
                        "New delivery assigned",
                        format!(
                            "Pick up order {} at bodega {}",
                            order.id, order.bodega_id
                        ),
                    )
                    .for_bodega(&order.bodega_id)
                    .for_courier(courier_id)
                    .about(&order.id),
                );
            }
        }

        for event in events {
            if let Err(err) = self.notifier.notify(event) {
                tracing::warn!(order_id = %order.id, error = %err, "notification not delivered");
            }
        }
    }
}
