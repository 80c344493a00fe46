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

//! Loyalty points log and account aggregates.
//!
//! The movement log is the source of truth for shopkeeper balances; the
//! [`Account`] map is a materialized view of it. Both are written together
//! while the actor's account entry is held, so concurrent settlements and
//! redemptions for one shopkeeper never lose an update.
//!
//! Lock order is always: account entry, then movement log.

use crate::account::{Account, AccountId};
use crate::base::{BodegaId, CourierId, OrderId, ShopkeeperId, new_record_id};
use crate::ledger::LedgerEntry;
use crate::LedgerError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Earn,
    Redeem,
}

/// One signed points transaction. Positive for `earn`, negative for `redeem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    pub kind: MovementKind,
    pub points: i64,
    /// Empty string on the wire when the movement is not tied to an order.
    #[serde(rename = "pedidoId", default, with = "optional_order_id")]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub bodega_id: Option<BodegaId>,
    pub shopkeeper_id: ShopkeeperId,
    pub created_at: DateTime<Utc>,
}

mod optional_order_id {
    use crate::base::OrderId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<OrderId>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(id.as_ref().map_or("", OrderId::as_str))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OrderId>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|id| !id.is_empty()).map(OrderId))
    }
}

#[derive(Debug, Default)]
pub struct PointsLedger {
    movements: RwLock<Vec<Movement>>,
    accounts: DashMap<AccountId, Account>,
}

impl PointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the shopkeeper's movements, optionally scoped to one bodega.
    pub fn balance(&self, shopkeeper_id: &ShopkeeperId, bodega_id: Option<&BodegaId>) -> i64 {
        self.movements
            .read()
            .iter()
            .filter(|movement| &movement.shopkeeper_id == shopkeeper_id)
            .filter(|movement| {
                bodega_id.is_none_or(|bodega| movement.bodega_id.as_ref() == Some(bodega))
            })
            .map(|movement| movement.points)
            .sum()
    }

    /// Records loyalty points earned on a settled order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidPoints`] for negative points.
    pub fn earn(
        &self,
        shopkeeper_id: &ShopkeeperId,
        points: i64,
        order_id: &OrderId,
        bodega_id: &BodegaId,
    ) -> Result<Movement, LedgerError> {
        if points < 0 {
            return Err(LedgerError::InvalidPoints);
        }

        let key = AccountId::Shopkeeper(shopkeeper_id.clone());
        let account = self.accounts.entry(key.clone()).or_insert_with(|| Account::new(key));

        account.earn(points)?;
        let movement = Movement {
            id: new_record_id(),
            kind: MovementKind::Earn,
            points,
            order_id: Some(order_id.clone()),
            bodega_id: Some(bodega_id.clone()),
            shopkeeper_id: shopkeeper_id.clone(),
            created_at: Utc::now(),
        };
        self.movements.write().push(movement.clone());
        Ok(movement)
    }

    /// Spends points. Rejections leave no movement and no account behind.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPoints`] if `points <= 0`.
    /// - [`LedgerError::InsufficientBalance`] if `points` exceeds the balance.
    pub fn redeem(&self, shopkeeper_id: &ShopkeeperId, points: i64) -> Result<Movement, LedgerError> {
        if points <= 0 {
            return Err(LedgerError::InvalidPoints);
        }

        // Write guard held for exclusivity across the check and the append.
        let Some(account) = self
            .accounts
            .get_mut(&AccountId::Shopkeeper(shopkeeper_id.clone()))
        else {
            return Err(LedgerError::InsufficientBalance {
                requested: points,
                available: 0,
            });
        };

        let available = self.balance(shopkeeper_id, None);
        if points > available {
            return Err(LedgerError::InsufficientBalance {
                requested: points,
                available,
            });
        }

        account.redeem(points)?;
        let movement = Movement {
            id: new_record_id(),
            kind: MovementKind::Redeem,
            points: -points,
            order_id: None,
            bodega_id: None,
            shopkeeper_id: shopkeeper_id.clone(),
            created_at: Utc::now(),
        };
        self.movements.write().push(movement.clone());
        Ok(movement)
    }

    /// Adds a settlement's courier earning to the courier's account.
    pub fn credit_courier(&self, courier_id: &CourierId, amount: Decimal) -> Result<(), LedgerError> {
        let key = AccountId::Courier(courier_id.clone());
        let account = self.accounts.entry(key.clone()).or_insert_with(|| Account::new(key));
        account.credit_earnings(amount)
    }

    pub fn account(&self, id: &AccountId) -> Option<Ref<'_, AccountId, Account>> {
        self.accounts.get(id)
    }

    pub fn accounts(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, AccountId, Account>> {
        self.accounts.iter()
    }

    /// A shopkeeper's movements in append order.
    pub fn movements_for(&self, shopkeeper_id: &ShopkeeperId) -> Vec<Movement> {
        self.movements
            .read()
            .iter()
            .filter(|movement| &movement.shopkeeper_id == shopkeeper_id)
            .cloned()
            .collect()
    }

    pub fn movements(&self) -> Vec<Movement> {
        self.movements.read().clone()
    }

    pub fn has_earn_for(&self, order_id: &OrderId) -> bool {
        self.movements.read().iter().any(|movement| {
            movement.kind == MovementKind::Earn && movement.order_id.as_ref() == Some(order_id)
        })
    }

    /// Loads a movement log without touching the aggregates; follow with [`Self::rebuild`].
    pub(crate) fn restore_movements(&self, movements: Vec<Movement>) {
        *self.movements.write() = movements;
    }

    /// Recomputes every account from the movement log and `entries`.
    ///
    /// Must not run concurrently with settlements or redemptions.
    /// Returns the number of accounts whose cached totals changed.
    pub fn rebuild(&self, entries: &[LedgerEntry]) -> usize {
        let mut points: HashMap<ShopkeeperId, i64> = HashMap::new();
        for movement in self.movements.read().iter() {
            *points.entry(movement.shopkeeper_id.clone()).or_default() += movement.points;
        }

        let mut earnings: HashMap<CourierId, Decimal> = HashMap::new();
        for entry in entries {
            if let Some(courier_id) = &entry.courier_id {
                *earnings.entry(courier_id.clone()).or_default() += entry.courier_earning;
            }
        }

        for shopkeeper_id in points.keys() {
            let key = AccountId::Shopkeeper(shopkeeper_id.clone());
            self.accounts.entry(key.clone()).or_insert_with(|| Account::new(key));
        }
        for courier_id in earnings.keys() {
            let key = AccountId::Courier(courier_id.clone());
            self.accounts.entry(key.clone()).or_insert_with(|| Account::new(key));
        }

        let mut changed = 0;
        for account in self.accounts.iter() {
            let (expected_points, expected_earnings) = match account.key() {
                AccountId::Shopkeeper(id) => {
                    let sum = points.get(id).copied().unwrap_or_default();
                    if sum < 0 {
                        tracing::warn!(shopkeeper_id = %id, sum, "movement log sums below zero");
                    }
                    (sum.max(0), Decimal::ZERO)
                }
                AccountId::Courier(id) => (0, earnings.get(id).copied().unwrap_or_default()),
            };
            if account.reset(expected_points, expected_earnings) {
                tracing::info!(
                    account = %account.key(),
                    points = expected_points,
                    earnings = %expected_earnings,
                    "account aggregate rebuilt"
                );
                changed += 1;
            }
        }
        changed
    }
}
