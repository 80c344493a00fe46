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

//! Engine public API integration tests.

use bodega_ledger::{
    AccountId, Audience, CourierId, DateRange, Engine, FeedFilter, LedgerError, NewOrder, OrderId,
    OrderPatch, OrderStatus, SettlementConfig, SettlementEngine, ShopkeeperId,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const PHONE: &str = "300 555 1234";

fn tendero() -> ShopkeeperId {
    ShopkeeperId::from("3005551234")
}

fn place(engine: &Engine, id: &str, total: Decimal) -> OrderId {
    engine
        .place_order(
            NewOrder::new(id, "B1")
                .with_total(total)
                .with_customer("Ana", PHONE),
        )
        .unwrap()
        .id
}

fn advance(engine: &Engine, id: &OrderId, status: OrderStatus) {
    engine.update_order(id, OrderPatch::status(status)).unwrap();
}

fn assign(engine: &Engine, id: &OrderId, courier: &str) {
    engine
        .update_order(
            id,
            OrderPatch::status(OrderStatus::Assigned).with_courier(courier, "Luz", "3100000000"),
        )
        .unwrap();
}

/// Drives an order from `new` to `in_transit` with `courier`.
fn to_in_transit(engine: &Engine, id: &OrderId, courier: &str) {
    advance(engine, id, OrderStatus::Confirmed);
    assign(engine, id, courier);
    advance(engine, id, OrderStatus::AtWarehouse);
    advance(engine, id, OrderStatus::PickedUp);
    advance(engine, id, OrderStatus::InTransit);
}

fn deliver(engine: &Engine, id: &OrderId, courier: &str) {
    to_in_transit(engine, id, courier);
    advance(engine, id, OrderStatus::Delivered);
}

fn status_changes(engine: &Engine, id: &OrderId, to: OrderStatus) -> usize {
    engine
        .notifications(&FeedFilter::audience(Audience::Shopkeeper))
        .iter()
        .filter(|n| n.order_id.as_ref() == Some(id) && n.message.ends_with(&format!("to {to}")))
        .count()
}

#[test]
fn placed_order_starts_new() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));

    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert!(!order.settlement_applied);
}

#[test]
fn duplicate_order_id_is_rejected() {
    let engine = Engine::new();
    place(&engine, "P1", dec!(100));

    let result = engine.place_order(NewOrder::new("P1", "B2"));
    assert_eq!(result, Err(LedgerError::DuplicateOrder("P1".into())));
}

#[test]
fn update_of_unknown_order_is_not_found() {
    let engine = Engine::new();
    let result = engine.update_order(&OrderId::from("nope"), OrderPatch::status(OrderStatus::Confirmed));
    assert_eq!(
        result,
        Err(LedgerError::NotFound {
            kind: "order",
            id: "nope".into()
        })
    );
}

#[test]
fn settlement_without_courier() {
    let engine = SettlementEngine::new(Arc::new(SettlementConfig::default()));
    let mut order = bodega_ledger::Order::place(NewOrder::new("P1", "B1").with_total(dec!(37000)), Utc::now()).unwrap();
    order.status = OrderStatus::Delivered;

    let entry = engine.settle(&order).unwrap().into_entry();
    assert_eq!(entry.loyalty_points, 37);
    assert_eq!(entry.platform_margin, dec!(4440));
    assert_eq!(entry.courier_earning, Decimal::ZERO);
}

#[test]
fn delivery_with_courier_is_settled() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));
    deliver(&engine, &id, "C1");

    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.settlement_applied);
    assert!(order.settlement_applied_at.is_some());

    let entry = engine.ledger_entry(&id).unwrap();
    assert_eq!(entry.courier_earning, dec!(5740));
    assert_eq!(entry.platform_margin, dec!(4440));
    assert_eq!(entry.loyalty_points, 37);
    assert_eq!(entry.shopkeeper_id, Some(tendero()));

    let courier = engine.account(&AccountId::Courier(CourierId::from("C1"))).unwrap();
    assert_eq!(courier.earnings(), dec!(5740));
    drop(courier);
    assert_eq!(engine.balance(&tendero(), None), 37);
}

#[test]
fn skipping_to_assigned_is_rejected() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));

    let result = engine.update_order(
        &id,
        OrderPatch::status(OrderStatus::Assigned).with_courier("C1", "Luz", "3100000000"),
    );

    assert_eq!(
        result,
        Err(LedgerError::InvalidTransition {
            from: OrderStatus::New,
            to: OrderStatus::Assigned
        })
    );
    let order = engine.order(&id).unwrap();
    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.courier_id, None);
    assert!(engine.notifications(&FeedFilter::default()).is_empty());
}

#[test]
fn terminal_orders_do_not_move() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(1000));
    advance(&engine, &id, OrderStatus::Cancelled);

    let result = engine.update_order(&id, OrderPatch::status(OrderStatus::Confirmed));
    assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
}

#[test]
fn cancelled_orders_are_never_settled() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));
    to_in_transit(&engine, &id, "C1");
    advance(&engine, &id, OrderStatus::Cancelled);

    assert!(engine.ledger_entry(&id).is_none());
    assert!(!engine.order(&id).unwrap().settlement_applied);
    assert_eq!(engine.balance(&tendero(), None), 0);
}

#[test]
fn redemption_beyond_balance_is_rejected() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(50000));
    deliver(&engine, &id, "C1");
    assert_eq!(engine.balance(&tendero(), None), 50);

    let result = engine.redeem(&tendero(), 80);

    assert_eq!(
        result,
        Err(LedgerError::InsufficientBalance {
            requested: 80,
            available: 50
        })
    );
    assert_eq!(engine.balance(&tendero(), None), 50);
    assert_eq!(engine.movements(&tendero()).len(), 1);
}

#[test]
fn redemption_keeps_cache_in_step_with_log() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(50000));
    deliver(&engine, &id, "C1");

    engine.redeem(&tendero(), 20).unwrap();

    let account = engine.account(&AccountId::Shopkeeper(tendero())).unwrap();
    assert_eq!(account.points(), 30);
    assert_eq!(engine.balance(&tendero(), None), 30);
}

#[test]
fn redeem_rejects_non_positive_points() {
    let engine = Engine::new();
    assert_eq!(engine.redeem(&tendero(), 0), Err(LedgerError::InvalidPoints));
}

#[test]
fn repeated_delivery_settles_and_notifies_once() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));
    to_in_transit(&engine, &id, "C1");

    let first = engine.update_order(&id, OrderPatch::status(OrderStatus::Delivered)).unwrap();
    let second = engine.update_order(&id, OrderPatch::status(OrderStatus::Delivered)).unwrap();

    assert_eq!(first.settlement_applied_at, second.settlement_applied_at);
    assert_eq!(engine.ledger_entries().len(), 1);
    assert_eq!(status_changes(&engine, &id, OrderStatus::Delivered), 1);
    assert_eq!(engine.balance(&tendero(), None), 37);
}

#[test]
fn assignment_notifies_shopkeeper_and_courier() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(1000));
    advance(&engine, &id, OrderStatus::Confirmed);
    assign(&engine, &id, "C1");

    let courier_feed = FeedFilter {
        audience: Some(Audience::Courier),
        courier_id: Some(CourierId::from("C1")),
        ..FeedFilter::default()
    };
    let titles: Vec<_> = engine
        .notifications(&courier_feed)
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, ["Delivery assigned", "New delivery assigned"]);
    assert_eq!(status_changes(&engine, &id, OrderStatus::Assigned), 1);
}

#[test]
fn later_status_changes_notify_courier_generically() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(1000));
    advance(&engine, &id, OrderStatus::Confirmed);
    assign(&engine, &id, "C1");
    advance(&engine, &id, OrderStatus::AtWarehouse);

    let latest = engine
        .notifications(&FeedFilter::audience(Audience::Courier))
        .pop()
        .unwrap();
    assert_eq!(latest.title, "Delivery status updated");
    assert_eq!(latest.message, "Order P1 is now at_warehouse");
}

#[test]
fn reassigning_courier_notifies_new_courier_only() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(1000));
    advance(&engine, &id, OrderStatus::Confirmed);
    assign(&engine, &id, "C1");

    let patch = OrderPatch::default().with_courier("C2", "Eva", "3110000000");
    let order = engine.update_order(&id, patch).unwrap();
    assert_eq!(order.status, OrderStatus::Assigned);

    let c2 = FeedFilter {
        courier_id: Some(CourierId::from("C2")),
        ..FeedFilter::default()
    };
    let titles: Vec<_> = engine.notifications(&c2).into_iter().map(|n| n.title).collect();
    assert_eq!(titles, ["New delivery assigned"]);
}

#[test]
fn notifications_can_be_marked_read() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(1000));
    advance(&engine, &id, OrderStatus::Confirmed);

    let notification = engine.notifications(&FeedFilter::default()).remove(0);
    assert!(engine.mark_notification_read(&notification.id));

    let unread = FeedFilter {
        unread_only: true,
        ..FeedFilter::default()
    };
    assert!(engine.notifications(&unread).is_empty());
}

#[test]
fn courier_ledger_listing_and_summary() {
    let engine = Engine::new();
    for (id, courier) in [("P1", "C1"), ("P2", "C1"), ("P3", "C2")] {
        let order_id = place(&engine, id, dec!(10000));
        deliver(&engine, &order_id, courier);
    }

    let c1 = CourierId::from("C1");
    let entries = engine.ledger_entries_for_courier(&c1, &DateRange::all());
    let ids: Vec<_> = entries.iter().map(|e| e.order_id.to_string()).collect();
    assert_eq!(ids, ["P1", "P2"]);

    let summary = engine.courier_earnings_summary(&c1, &DateRange::all());
    assert_eq!(summary.deliveries, 2);
    assert_eq!(summary.earnings, dec!(10400));

    let yesterday = DateRange {
        from: None,
        to: Some(Utc::now() - Duration::days(1)),
    };
    assert!(engine.ledger_entries_for_courier(&c1, &yesterday).is_empty());
}

#[test]
fn balance_scoped_by_bodega() {
    let engine = Engine::new();
    let p1 = place(&engine, "P1", dec!(10000));
    let p2 = engine
        .place_order(
            NewOrder::new("P2", "B2")
                .with_total(dec!(5000))
                .with_customer("Ana", PHONE),
        )
        .unwrap()
        .id;
    deliver(&engine, &p1, "C1");
    deliver(&engine, &p2, "C1");

    assert_eq!(engine.balance(&tendero(), Some(&"B1".into())), 10);
    assert_eq!(engine.balance(&tendero(), Some(&"B2".into())), 5);
    assert_eq!(engine.balance(&tendero(), None), 15);
}

#[test]
fn config_change_applies_to_later_settlements_only() {
    let engine = Engine::new();
    let p1 = place(&engine, "P1", dec!(10000));
    deliver(&engine, &p1, "C1");

    engine
        .replace_config(SettlementConfig {
            base_courier_fee: dec!(8000),
            ..SettlementConfig::default()
        })
        .unwrap();
    let p2 = place(&engine, "P2", dec!(10000));
    deliver(&engine, &p2, "C1");

    assert_eq!(engine.ledger_entry(&p1).unwrap().courier_earning, dec!(5200));
    assert_eq!(engine.ledger_entry(&p2).unwrap().courier_earning, dec!(8200));
}

#[test]
fn snapshot_restore_rebuilds_accounts() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(50000));
    deliver(&engine, &id, "C1");
    engine.redeem(&tendero(), 15).unwrap();

    let snapshot = engine.snapshot().unwrap();
    let restored = Engine::restore(snapshot.clone(), SettlementConfig::default()).unwrap();

    assert_eq!(restored.balance(&tendero(), None), 35);
    let account = restored.account(&AccountId::Shopkeeper(tendero())).unwrap();
    assert_eq!(account.points(), 35);
    drop(account);
    assert_eq!(restored.snapshot().unwrap().ledger, snapshot.ledger);
    assert!(restored.order(&id).unwrap().settlement_applied);
}

#[test]
fn reconcile_on_consistent_engine_changes_nothing() {
    let engine = Engine::new();
    let id = place(&engine, "P1", dec!(37000));
    deliver(&engine, &id, "C1");

    let report = engine.reconcile().unwrap();
    assert_eq!(report.restored_movements, 0);
    assert_eq!(report.accounts_rebuilt, 0);
}
