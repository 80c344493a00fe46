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

//! Settlement ledger: one immutable entry per delivered order.
//!
//! Uniqueness of `pedidoId` is enforced at insert time through the
//! [`DashMap`] entry API, so a racing second insert observes the first and
//! fails with [`LedgerError::DuplicateSettlement`].

use crate::LedgerError;
use crate::base::{BodegaId, CourierId, OrderId, ShopkeeperId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Audit record of one order's settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    #[serde(rename = "pedidoId")]
    pub order_id: OrderId,
    pub bodega_id: BodegaId,
    pub courier_id: Option<CourierId>,
    pub shopkeeper_id: Option<ShopkeeperId>,
    pub order_total: Decimal,
    pub loyalty_points: i64,
    pub courier_earning: Decimal,
    pub platform_margin: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Inclusive time window; open on any side left as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Totals shown on a courier's earnings dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    pub courier_id: CourierId,
    pub deliveries: usize,
    pub earnings: Decimal,
}

#[derive(Debug, Default)]
pub struct SettlementLedger {
    entries: DashMap<OrderId, LedgerEntry>,
}

impl SettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateSettlement`] if the order already has one.
    pub fn insert(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        match self.entries.entry(entry.order_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateSettlement(entry.order_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<LedgerEntry> {
        self.entries.get(order_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.entries.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.collect_sorted(|_| true)
    }

    /// A courier's entries within `range`, oldest first.
    pub fn for_courier(&self, courier_id: &CourierId, range: &DateRange) -> Vec<LedgerEntry> {
        self.collect_sorted(|entry| {
            entry.courier_id.as_ref() == Some(courier_id) && range.contains(entry.created_at)
        })
    }

    pub fn earnings_summary(&self, courier_id: &CourierId, range: &DateRange) -> EarningsSummary {
        let entries = self.for_courier(courier_id, range);
        EarningsSummary {
            courier_id: courier_id.clone(),
            deliveries: entries.len(),
            earnings: entries.iter().map(|entry| entry.courier_earning).sum(),
        }
    }

    fn collect_sorted(&self, keep: impl Fn(&LedgerEntry) -> bool) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        entries
    }
}
