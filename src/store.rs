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

//! Order persistence.
//!
//! [`OrderStore`] is the seam between the lifecycle core and whatever keeps
//! orders. [`InMemoryOrderStore`] keys orders in a [`DashMap`] and makes
//! every write a compare-and-swap on [`Order::revision`].

use crate::LedgerError;
use crate::base::{BodegaId, CourierId, OrderId};
use crate::order::Order;
use crate::status::OrderStatus;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Listing filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub bodega_id: Option<BodegaId>,
    pub courier_id: Option<CourierId>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.bodega_id.as_ref().is_none_or(|id| *id == order.bodega_id)
            && self
                .courier_id
                .as_ref()
                .is_none_or(|id| order.courier_id.as_ref() == Some(id))
            && self.status.is_none_or(|status| status == order.status)
    }
}

pub trait OrderStore: Send + Sync {
    fn get(&self, id: &OrderId) -> Result<Option<Order>, LedgerError>;

    /// Orders matching `filter`, oldest first.
    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, LedgerError>;

    /// # Errors
    ///
    /// [`LedgerError::DuplicateOrder`] if the id is taken.
    fn insert(&self, order: Order) -> Result<(), LedgerError>;

    /// Replaces the stored order if its revision still equals `expected_revision`.
    ///
    /// Returns the stored order with its revision bumped.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the order does not exist.
    /// - [`LedgerError::PersistenceFailure`] if another writer got there first.
    fn compare_and_swap(&self, order: Order, expected_revision: u64) -> Result<Order, LedgerError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn get(&self, id: &OrderId) -> Result<Option<Order>, LedgerError> {
        Ok(self.orders.get(id).map(|order| order.clone()))
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, LedgerError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|order| filter.matches(order.value()))
            .map(|order| order.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    fn insert(&self, order: Order) -> Result<(), LedgerError> {
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateOrder(order.id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(order);
                Ok(())
            }
        }
    }

    fn compare_and_swap(&self, mut order: Order, expected_revision: u64) -> Result<Order, LedgerError> {
        let mut current = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| LedgerError::order_not_found(&order.id))?;

        if current.revision != expected_revision {
            return Err(LedgerError::PersistenceFailure(format!(
                "order {} changed concurrently (revision {} != {})",
                order.id, current.revision, expected_revision
            )));
        }

        order.revision = expected_revision + 1;
        *current = order.clone();
        Ok(order)
    }
}
