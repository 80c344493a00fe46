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

//! Order status state machine.
//!
//! ```text
//! new ─► confirmed ─► assigned ─► at_warehouse ─► picked_up ─► in_transit ─► delivered
//!  │         │           │             │              │             │
//!  └─────────┴───────────┴─────────────┴──────────────┴─────────────┴──► cancelled
//! ```
//!
//! `delivered` and `cancelled` are terminal. The graph lives in [`TRANSITIONS`];
//! [`can_transition`] is the only place it is consulted.

use crate::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Confirmed,
    Assigned,
    AtWarehouse,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

/// Directed edges of the order state machine.
pub const TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (OrderStatus::New, &[OrderStatus::Confirmed, OrderStatus::Cancelled]),
    (OrderStatus::Confirmed, &[OrderStatus::Assigned, OrderStatus::Cancelled]),
    (OrderStatus::Assigned, &[OrderStatus::AtWarehouse, OrderStatus::Cancelled]),
    (OrderStatus::AtWarehouse, &[OrderStatus::PickedUp, OrderStatus::Cancelled]),
    (OrderStatus::PickedUp, &[OrderStatus::InTransit, OrderStatus::Cancelled]),
    (OrderStatus::InTransit, &[OrderStatus::Delivered, OrderStatus::Cancelled]),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        Self::New,
        Self::Confirmed,
        Self::Assigned,
        Self::AtWarehouse,
        Self::PickedUp,
        Self::InTransit,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Assigned => "assigned",
            Self::AtWarehouse => "at_warehouse",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in one step.
    pub fn next_states(&self) -> &'static [OrderStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
            .unwrap_or(&[])
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LedgerError::UnknownStatus(s.to_string()))
    }
}

/// Returns `true` if `requested` is a direct successor of `current`.
///
/// Self-transitions are never allowed.
pub fn can_transition(current: OrderStatus, requested: OrderStatus) -> bool {
    current != requested && current.next_states().contains(&requested)
}

/// String form of [`can_transition`]; unknown statuses are rejected.
pub fn can_transition_str(current: &str, requested: &str) -> bool {
    match (current.parse(), requested.parse()) {
        (Ok(current), Ok(requested)) => can_transition(current, requested),
        _ => false,
    }
}

/// Like [`can_transition`] but reports the rejected edge.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] when the edge is not in [`TRANSITIONS`].
pub fn validate_transition(current: OrderStatus, requested: OrderStatus) -> Result<(), LedgerError> {
    if can_transition(current, requested) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            from: current,
            to: requested,
        })
    }
}
