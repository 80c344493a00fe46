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

//! Order records as seen by the lifecycle and settlement core.
//!
//! Orders are created by checkout ([`NewOrder`]) and afterwards only change
//! through [`crate::OrderLifecycle::update_order`] with an [`OrderPatch`].

use crate::LedgerError;
use crate::base::{BodegaId, CourierId, OrderId};
use crate::status::OrderStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// Checkout-computed subtotal; wins over `unit_price * quantity` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,
}

impl LineItem {
    pub fn new(product_id: impl Into<String>, name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
            subtotal: None,
        }
    }

    /// `subtotal` if set, else `unit_price * quantity`; `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        match self.subtotal {
            Some(subtotal) => Some(subtotal),
            None => self.unit_price.checked_mul(Decimal::from(self.quantity)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub bodega_id: BodegaId,
    pub status: OrderStatus,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub courier_id: Option<CourierId>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub courier_phone: Option<String>,
    #[serde(default)]
    pub settlement_applied: bool,
    #[serde(default)]
    pub settlement_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Compare-and-swap token, bumped by the store on every write.
    #[serde(default)]
    pub revision: u64,
}

impl Order {
    /// Builds a `new` order from checkout data.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if the total or any line price is
    /// negative, or the line totals overflow.
    pub fn place(new_order: NewOrder, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        if new_order.total.is_some_and(|total| total < Decimal::ZERO) {
            return Err(LedgerError::InvalidAmount);
        }
        for item in &new_order.items {
            let line_total = item.line_total().ok_or(LedgerError::InvalidAmount)?;
            if item.unit_price < Decimal::ZERO || line_total < Decimal::ZERO {
                return Err(LedgerError::InvalidAmount);
            }
        }

        let order = Self {
            id: new_order.id,
            bodega_id: new_order.bodega_id,
            status: OrderStatus::New,
            total: new_order.total,
            items: new_order.items,
            customer_name: new_order.customer_name,
            customer_phone: new_order.customer_phone,
            courier_id: None,
            courier_name: None,
            courier_phone: None,
            settlement_applied: false,
            settlement_applied_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        };
        order.settlement_total()?;
        Ok(order)
    }

    /// Amount settlement is computed on: `total` if set, else the sum of line totals.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if a line total or the sum overflows.
    pub fn settlement_total(&self) -> Result<Decimal, LedgerError> {
        match self.total {
            Some(total) => Ok(total),
            None => self.items.iter().try_fold(Decimal::ZERO, |sum, item| {
                item.line_total()
                    .and_then(|line| sum.checked_add(line))
                    .ok_or(LedgerError::InvalidAmount)
            }),
        }
    }

    pub fn has_courier(&self) -> bool {
        self.courier_id.is_some()
    }
}

/// Checkout payload for a new order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub id: OrderId,
    pub bodega_id: BodegaId,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
}

impl NewOrder {
    pub fn new(id: impl Into<String>, bodega_id: impl Into<String>) -> Self {
        Self {
            id: OrderId::new(id),
            bodega_id: BodegaId::new(bodega_id),
            ..Self::default()
        }
    }

    pub fn with_total(mut self, total: Decimal) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_customer(mut self, name: impl Into<String>, phone: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self.customer_phone = Some(phone.into());
        self
    }
}

/// Fields a status/assignment update may change. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub courier_id: Option<CourierId>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub courier_phone: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_courier(
        mut self,
        courier_id: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        self.courier_id = Some(CourierId::new(courier_id));
        self.courier_name = Some(name.into());
        self.courier_phone = Some(phone.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.courier_id.is_none()
            && self.courier_name.is_none()
            && self.courier_phone.is_none()
    }
}
