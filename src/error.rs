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

//! Error types for order lifecycle and settlement processing.

use crate::status::OrderStatus;
use thiserror::Error;

/// Order lifecycle, settlement and points errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced order or account does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Requested status is not reachable from the current one
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Status string is not part of the order state machine
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),

    /// Order cannot enter `assigned` without a courier
    #[error("order {0} has no courier to assign")]
    MissingCourier(String),

    /// Redemption exceeds the shopkeeper's points balance
    #[error("insufficient points: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// Points are zero or negative
    #[error("invalid points (must be positive)")]
    InvalidPoints,

    /// Amount is negative or out of range
    #[error("invalid amount")]
    InvalidAmount,

    /// Settlement requested for an order that is not delivered
    #[error("order {0} is not delivered")]
    NotDelivered(String),

    /// Order ID already exists in the store
    #[error("duplicate order ID {0}")]
    DuplicateOrder(String),

    /// A ledger entry already exists for the order
    #[error("order {0} already settled")]
    DuplicateSettlement(String),

    /// A ledger entry exists but the order was never saved as delivered
    #[error("order {0} has a pending settlement; only delivery can be confirmed")]
    SettlementPending(String),

    /// Courier fields cannot change once the order is delivered or cancelled
    #[error("order {id} is {status} and cannot be reassigned")]
    OrderClosed { id: String, status: OrderStatus },

    /// Storage write failed
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl LedgerError {
    pub(crate) fn order_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "order",
            id: id.to_string(),
        }
    }
}

/// Notification delivery failure.
///
/// Never surfaced to callers of the lifecycle; logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);
