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

//! Platform facade.
//!
//! The [`Engine`] wires the order store, lifecycle controller, settlement
//! engine, points ledger and notification feed together and is the API the
//! courier, warehouse, loyalty and dashboard collaborators call.
//!
//! # Thread Safety
//!
//! Every method takes `&self`; share the engine behind an [`Arc`]. Updates
//! to one order are serialized, updates to different orders run in parallel.

use crate::account::{Account, AccountId};
use crate::base::{BodegaId, CourierId, OrderId, ShopkeeperId};
use crate::config::{SettlementConfig, SharedConfig};
use crate::ledger::{DateRange, EarningsSummary, LedgerEntry};
use crate::lifecycle::OrderLifecycle;
use crate::notify::{FeedFilter, Notification, NotificationFeed, NotificationOutbox};
use crate::order::{NewOrder, Order, OrderPatch};
use crate::points::Movement;
use crate::settlement::{ReconcileReport, SettlementEngine};
use crate::store::{InMemoryOrderStore, OrderFilter, OrderStore};
use crate::LedgerError;
use chrono::Utc;
use dashmap::mapref::one::Ref;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;

/// Everything needed to rebuild an engine. Account aggregates are not part
/// of it; they are recomputed from the logs on restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub ledger: Vec<LedgerEntry>,
    #[serde(default)]
    pub movements: Vec<Movement>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Snapshot {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), serde_json::Error> {
        serde_json::to_writer_pretty(writer, self)
    }
}

pub struct Engine {
    config: Arc<SharedConfig>,
    orders: Arc<InMemoryOrderStore>,
    settlement: Arc<SettlementEngine>,
    lifecycle: OrderLifecycle,
    outbox: Arc<NotificationOutbox>,
    feed: NotificationFeed,
}

impl Engine {
    /// Creates an empty engine with the default settlement config.
    pub fn new() -> Self {
        Self::with_config(SettlementConfig::default())
    }

    pub fn with_config(config: SettlementConfig) -> Self {
        let config = Arc::new(SharedConfig::new(config));
        let orders = Arc::new(InMemoryOrderStore::new());
        let settlement = Arc::new(SettlementEngine::new(config.clone()));
        let outbox = Arc::new(NotificationOutbox::new());
        let lifecycle = OrderLifecycle::new(orders.clone(), settlement.clone(), outbox.clone());

        Engine {
            config,
            orders,
            settlement,
            lifecycle,
            outbox,
            feed: NotificationFeed::new(),
        }
    }

    /// Rebuilds an engine from a snapshot and reconciles the account cache.
    ///
    /// # Errors
    ///
    /// Fails on duplicate order ids or duplicate ledger entries in the snapshot.
    pub fn restore(snapshot: Snapshot, config: SettlementConfig) -> Result<Self, LedgerError> {
        let engine = Self::with_config(config);
        for order in snapshot.orders {
            engine.orders.insert(order)?;
        }
        engine.settlement.restore(snapshot.ledger, snapshot.movements)?;
        engine.feed.restore(snapshot.notifications);

        let report = engine.reconcile()?;
        tracing::info!(
            orders = engine.orders.len(),
            ledger_entries = engine.settlement.ledger().len(),
            restored_movements = report.restored_movements,
            accounts_rebuilt = report.accounts_rebuilt,
            "engine restored from snapshot"
        );
        Ok(engine)
    }

    pub fn snapshot(&self) -> Result<Snapshot, LedgerError> {
        Ok(Snapshot {
            orders: self.orders.list(&OrderFilter::default())?,
            ledger: self.settlement.ledger().entries(),
            movements: self.settlement.points().movements(),
            notifications: self.feed.all(),
        })
    }

    // === Orders ===

    /// Stores a new order from checkout in status `new`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - negative total or price.
    /// - [`LedgerError::DuplicateOrder`] - id already used.
    pub fn place_order(&self, new_order: NewOrder) -> Result<Order, LedgerError> {
        let order = Order::place(new_order, Utc::now())?;
        self.orders.insert(order.clone())?;
        tracing::debug!(order_id = %order.id, bodega_id = %order.bodega_id, "order placed");
        Ok(order)
    }

    /// See [`OrderLifecycle::update_order`]. Notifications are delivered to
    /// the feed once the update has been persisted.
    pub fn update_order(&self, order_id: &OrderId, patch: OrderPatch) -> Result<Order, LedgerError> {
        let result = self.lifecycle.update_order(order_id, patch);
        self.outbox.flush(&self.feed);
        result
    }

    pub fn order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        self.orders
            .get(order_id)?
            .ok_or_else(|| LedgerError::order_not_found(order_id))
    }

    pub fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, LedgerError> {
        self.orders.list(filter)
    }

    // === Points ===

    pub fn balance(&self, shopkeeper_id: &ShopkeeperId, bodega_id: Option<&BodegaId>) -> i64 {
        self.settlement.points().balance(shopkeeper_id, bodega_id)
    }

    /// # Errors
    ///
    /// - [`LedgerError::InvalidPoints`] if `points <= 0`.
    /// - [`LedgerError::InsufficientBalance`] if `points` exceeds the balance.
    pub fn redeem(&self, shopkeeper_id: &ShopkeeperId, points: i64) -> Result<Movement, LedgerError> {
        let movement = self.settlement.redeem(shopkeeper_id, points)?;
        tracing::info!(shopkeeper_id = %shopkeeper_id, points, "points redeemed");
        Ok(movement)
    }

    pub fn movements(&self, shopkeeper_id: &ShopkeeperId) -> Vec<Movement> {
        self.settlement.points().movements_for(shopkeeper_id)
    }

    pub fn account(&self, id: &AccountId) -> Option<Ref<'_, AccountId, Account>> {
        self.settlement.points().account(id)
    }

    pub fn accounts(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, AccountId, Account>> {
        self.settlement.points().accounts()
    }

    // === Ledger ===

    pub fn ledger_entry(&self, order_id: &OrderId) -> Option<LedgerEntry> {
        self.settlement.ledger().get(order_id)
    }

    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.settlement.ledger().entries()
    }

    pub fn ledger_entries_for_courier(&self, courier_id: &CourierId, range: &DateRange) -> Vec<LedgerEntry> {
        self.settlement.ledger().for_courier(courier_id, range)
    }

    pub fn courier_earnings_summary(&self, courier_id: &CourierId, range: &DateRange) -> EarningsSummary {
        self.settlement.ledger().earnings_summary(courier_id, range)
    }

    /// See [`SettlementEngine::reconcile`].
    pub fn reconcile(&self) -> Result<ReconcileReport, LedgerError> {
        self.settlement.reconcile()
    }

    // === Notifications ===

    pub fn notifications(&self, filter: &FeedFilter) -> Vec<Notification> {
        self.feed.list(filter)
    }

    pub fn mark_notification_read(&self, id: &str) -> bool {
        self.feed.mark_read(id)
    }

    // === Config ===

    pub fn config(&self) -> SettlementConfig {
        self.settlement.config()
    }

    /// Replaces the settlement parameters for orders settled from now on.
    pub fn replace_config(&self, config: SettlementConfig) -> Result<(), LedgerError> {
        self.config.replace(config)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
