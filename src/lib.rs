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

//! # Bodega Ledger
//!
//! Order lifecycle state machine and settlement ledger for a multi-role
//! ordering platform (shopkeepers, warehouses, couriers).
//!
//! When an order reaches `delivered` it is settled exactly once: a
//! [`LedgerEntry`] records the courier earning, the platform margin and the
//! shopkeeper's loyalty points, and the derived [`Account`] aggregates are
//! updated from it.
//!
//! ## Core Components
//!
//! - [`Engine`]: Facade used by the courier, warehouse and loyalty collaborators
//! - [`OrderLifecycle`]: Validates, persists and notifies status changes
//! - [`status::can_transition`]: The order state machine
//! - [`SettlementEngine`]: Computes and applies settlements idempotently
//! - [`PointsLedger`]: Append-only points log plus account aggregates
//! - [`LedgerError`]: Error types for all of the above
//!
//! ## Example
//!
//! ```
//! use bodega_ledger::{Engine, NewOrder, OrderPatch, OrderStatus, ShopkeeperId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let order = engine
//!     .place_order(
//!         NewOrder::new("P1", "B1")
//!             .with_total(dec!(37000))
//!             .with_customer("Ana", "300 555 1234"),
//!     )
//!     .unwrap();
//!
//! engine
//!     .update_order(&order.id, OrderPatch::status(OrderStatus::Confirmed))
//!     .unwrap();
//! engine
//!     .update_order(
//!         &order.id,
//!         OrderPatch::status(OrderStatus::Assigned).with_courier("C1", "Luz", "3100000000"),
//!     )
//!     .unwrap();
//! for status in [
//!     OrderStatus::AtWarehouse,
//!     OrderStatus::PickedUp,
//!     OrderStatus::InTransit,
//!     OrderStatus::Delivered,
//! ] {
//!     engine.update_order(&order.id, OrderPatch::status(status)).unwrap();
//! }
//!
//! let entry = engine.ledger_entry(&order.id).unwrap();
//! assert_eq!(entry.loyalty_points, 37);
//! assert_eq!(entry.courier_earning, dec!(5740));
//! assert_eq!(engine.balance(&ShopkeeperId::from("3005551234"), None), 37);
//! ```

pub mod account;
mod base;
pub mod config;
mod engine;
pub mod error;
pub mod identity;
pub mod ledger;
mod lifecycle;
pub mod notify;
mod order;
pub mod points;
mod settlement;
pub mod status;
pub mod store;

pub use account::{Account, AccountId, AccountKind};
pub use base::{BodegaId, CourierId, OrderId, ShopkeeperId};
pub use config::{ConfigProvider, SettlementConfig, SharedConfig};
pub use engine::{Engine, Snapshot};
pub use error::{LedgerError, NotifyError};
pub use ledger::{DateRange, EarningsSummary, LedgerEntry, SettlementLedger};
pub use lifecycle::OrderLifecycle;
pub use notify::{Audience, FeedFilter, Notification, NotificationFeed, NotificationOutbox, Notifier};
pub use order::{LineItem, NewOrder, Order, OrderPatch};
pub use points::{Movement, MovementKind, PointsLedger};
pub use settlement::{ReconcileReport, Settlement, SettlementEngine};
pub use status::{OrderStatus, can_transition};
pub use store::{InMemoryOrderStore, OrderFilter, OrderStore};
