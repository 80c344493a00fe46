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

//! Settlement of delivered orders.
//!
//! Settling an order writes, in this order:
//!
//! 1. the [`LedgerEntry`] (the audit record, unique per order),
//! 2. the shopkeeper's `earn` movement and points aggregate,
//! 3. the courier's earnings aggregate.
//!
//! Step 1 is the idempotency gate: [`SettlementLedger::insert`] rejects a
//! second entry for the same order atomically, and the loser of that race
//! reports [`Settlement::AlreadyApplied`] instead of writing anything.
//! Derived records never exist without their entry; if the process dies
//! between steps, [`SettlementEngine::reconcile`] re-derives what is missing.
//!
//! Settlements and redemptions hold the write gate shared; reconcile holds it
//! exclusively so it never observes an entry whose effects are still pending.

use crate::base::{new_record_id, ShopkeeperId};
use crate::config::{ConfigProvider, SettlementConfig};
use crate::identity::shopkeeper_for_order;
use crate::ledger::{LedgerEntry, SettlementLedger};
use crate::order::Order;
use crate::points::{Movement, PointsLedger};
use crate::status::OrderStatus;
use crate::LedgerError;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Order total per loyalty point.
const POINTS_DIVISOR: Decimal = dec!(1000);

/// Outcome of [`SettlementEngine::settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// First settlement of the order; effects were applied.
    Applied(LedgerEntry),
    /// The order was already settled; nothing was written.
    AlreadyApplied(LedgerEntry),
}

impl Settlement {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Self::Applied(entry) | Self::AlreadyApplied(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Self::Applied(entry) | Self::AlreadyApplied(entry) => entry,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of [`SettlementEngine::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// `earn` movements re-derived from ledger entries.
    pub restored_movements: usize,
    /// Accounts whose cached totals were corrected.
    pub accounts_rebuilt: usize,
}

fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub struct SettlementEngine {
    config: Arc<dyn ConfigProvider>,
    ledger: SettlementLedger,
    points: PointsLedger,
    writes: RwLock<()>,
}

impl SettlementEngine {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            config,
            ledger: SettlementLedger::new(),
            points: PointsLedger::new(),
            writes: RwLock::new(()),
        }
    }

    pub fn ledger(&self) -> &SettlementLedger {
        &self.ledger
    }

    pub fn points(&self) -> &PointsLedger {
        &self.points
    }

    pub fn config(&self) -> SettlementConfig {
        self.config.settlement_config()
    }

    /// Computes the ledger entry for `order` under `config`.
    ///
    /// Deterministic apart from the entry id and timestamp:
    ///
    /// | Field | Formula |
    /// |-------|---------|
    /// | `loyalty_points` | `floor(total / 1000)` |
    /// | `platform_margin` | `round(total * platform_margin_percentage)` |
    /// | `courier_earning` | `round(base_courier_fee + total * courier_percentage)`, `0` without courier |
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] for negative totals or arithmetic overflow.
    pub fn compute(order: &Order, config: &SettlementConfig) -> Result<LedgerEntry, LedgerError> {
        let order_total = order.settlement_total()?;
        if order_total < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let loyalty_points = order_total
            .checked_div(POINTS_DIVISOR)
            .map(|points| points.floor())
            .and_then(|points| points.to_i64())
            .ok_or(LedgerError::InvalidAmount)?;

        let platform_margin = order_total
            .checked_mul(config.platform_margin_percentage)
            .map(round_minor)
            .ok_or(LedgerError::InvalidAmount)?;

        let courier_earning = if order.has_courier() {
            order_total
                .checked_mul(config.courier_percentage)
                .and_then(|share| share.checked_add(config.base_courier_fee))
                .map(round_minor)
                .ok_or(LedgerError::InvalidAmount)?
        } else {
            Decimal::ZERO
        };

        Ok(LedgerEntry {
            id: new_record_id(),
            order_id: order.id.clone(),
            bodega_id: order.bodega_id.clone(),
            courier_id: order.courier_id.clone(),
            shopkeeper_id: shopkeeper_for_order(order),
            order_total,
            loyalty_points,
            courier_earning,
            platform_margin,
            created_at: Utc::now(),
        })
    }

    /// Settles a delivered order exactly once.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotDelivered`] if the order is not `delivered`.
    /// - [`LedgerError::InvalidAmount`] if the amounts cannot be computed.
    /// - [`LedgerError::PersistenceFailure`] if derived effects could not be written;
    ///   the entry stands and [`Self::reconcile`] repairs the aggregates.
    pub fn settle(&self, order: &Order) -> Result<Settlement, LedgerError> {
        if order.status != OrderStatus::Delivered {
            return Err(LedgerError::NotDelivered(order.id.to_string()));
        }

        if let Some(existing) = self.ledger.get(&order.id) {
            tracing::debug!(order_id = %order.id, "order already settled");
            return Ok(Settlement::AlreadyApplied(existing));
        }

        let config = self.config.settlement_config();
        let entry = Self::compute(order, &config)?;

        let _writes = self.writes.read();
        match self.ledger.insert(entry.clone()) {
            Ok(()) => {}
            Err(LedgerError::DuplicateSettlement(_)) => {
                tracing::debug!(order_id = %order.id, "lost settlement race, using existing entry");
                let existing = self.ledger.get(&order.id).ok_or_else(|| {
                    LedgerError::PersistenceFailure(format!("ledger entry for {} vanished", order.id))
                })?;
                return Ok(Settlement::AlreadyApplied(existing));
            }
            Err(err) => return Err(err),
        }

        self.apply_effects(&entry).map_err(|err| {
            tracing::error!(order_id = %entry.order_id, error = %err, "settlement effects failed");
            LedgerError::PersistenceFailure(format!(
                "settlement effects for {} not applied: {err}",
                entry.order_id
            ))
        })?;

        tracing::info!(
            order_id = %entry.order_id,
            loyalty_points = entry.loyalty_points,
            courier_earning = %entry.courier_earning,
            platform_margin = %entry.platform_margin,
            "order settled"
        );
        Ok(Settlement::Applied(entry))
    }

    fn apply_effects(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if let Some(shopkeeper_id) = &entry.shopkeeper_id {
            self.points
                .earn(shopkeeper_id, entry.loyalty_points, &entry.order_id, &entry.bodega_id)?;
        }
        if let Some(courier_id) = &entry.courier_id {
            self.points.credit_courier(courier_id, entry.courier_earning)?;
        }
        Ok(())
    }

    /// Redeems points against the shopkeeper's balance.
    ///
    /// # Errors
    ///
    /// See [`PointsLedger::redeem`].
    pub fn redeem(&self, shopkeeper_id: &ShopkeeperId, points: i64) -> Result<Movement, LedgerError> {
        let _writes = self.writes.read();
        self.points.redeem(shopkeeper_id, points)
    }

    /// Re-derives missing `earn` movements from ledger entries, then rebuilds
    /// every account aggregate from the logs.
    pub fn reconcile(&self) -> Result<ReconcileReport, LedgerError> {
        let _writes = self.writes.write();
        let entries = self.ledger.entries();
        let mut report = ReconcileReport::default();

        for entry in &entries {
            let Some(shopkeeper_id) = &entry.shopkeeper_id else {
                continue;
            };
            if self.points.has_earn_for(&entry.order_id) {
                continue;
            }
            tracing::warn!(order_id = %entry.order_id, "restoring missing earn movement");
            self.points
                .earn(shopkeeper_id, entry.loyalty_points, &entry.order_id, &entry.bodega_id)?;
            report.restored_movements += 1;
        }

        report.accounts_rebuilt = self.points.rebuild(&entries);
        Ok(report)
    }

    /// Loads persisted ledger entries; the caller must [`Self::reconcile`] afterwards.
    pub(crate) fn restore(
        &self,
        entries: Vec<LedgerEntry>,
        movements: Vec<Movement>,
    ) -> Result<(), LedgerError> {
        for entry in entries {
            self.ledger.insert(entry)?;
        }
        self.points.restore_movements(movements);
        Ok(())
    }
}
