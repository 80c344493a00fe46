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

//! Concurrency tests run under parking_lot's deadlock detector.
//!
//! These drive the real engine from many threads and check that
//! settlement stays exactly-once and points balances stay consistent.

use bodega_ledger::{
    AccountId, Engine, FeedFilter, NewOrder, Order, OrderFilter, OrderId, OrderPatch, OrderStatus,
    SettlementConfig, SettlementEngine, ShopkeeperId,
};
use chrono::Utc;
use parking_lot::deadlock;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PHONE: &str = "3005551234";

fn tendero() -> ShopkeeperId {
    ShopkeeperId::from(PHONE)
}

/// Spawns a background thread that panics if parking_lot finds a lock cycle.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

fn place(engine: &Engine, id: &str) -> OrderId {
    engine
        .place_order(
            NewOrder::new(id, "B1")
                .with_total(dec!(10000))
                .with_customer("Ana", PHONE),
        )
        .unwrap()
        .id
}

fn to_in_transit(engine: &Engine, id: &OrderId) {
    for patch in [
        OrderPatch::status(OrderStatus::Confirmed),
        OrderPatch::status(OrderStatus::Assigned).with_courier("C1", "Luz", "3100000000"),
        OrderPatch::status(OrderStatus::AtWarehouse),
        OrderPatch::status(OrderStatus::PickedUp),
        OrderPatch::status(OrderStatus::InTransit),
    ] {
        engine.update_order(id, patch).unwrap();
    }
}

#[test]
fn concurrent_delivery_confirmations_settle_once() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    let id = place(&engine, "P1");
    to_in_transit(&engine, &id);

    const NUM_THREADS: usize = 32;
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let engine = engine.clone();
            let id = id.clone();
            thread::spawn(move || {
                engine
                    .update_order(&id, OrderPatch::status(OrderStatus::Delivered))
                    .expect("delivery confirmation should succeed")
            })
        })
        .collect();

    let applied_at: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked").settlement_applied_at)
        .collect();

    stop_deadlock_detector(detector);

    assert_eq!(engine.ledger_entries().len(), 1);
    assert_eq!(engine.movements(&tendero()).len(), 1);
    assert_eq!(engine.balance(&tendero(), None), 10);
    assert!(applied_at.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn racing_settle_calls_apply_exactly_once() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(SettlementEngine::new(Arc::new(SettlementConfig::default())));
    let mut order = Order::place(
        NewOrder::new("P1", "B1")
            .with_total(dec!(37000))
            .with_customer("Ana", PHONE),
        Utc::now(),
    )
    .unwrap();
    order.status = OrderStatus::Delivered;
    let order = Arc::new(order);
    let applied = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            let order = order.clone();
            let applied = applied.clone();
            thread::spawn(move || {
                if engine.settle(&order).unwrap().is_applied() {
                    applied.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(engine.ledger().len(), 1);
    assert_eq!(engine.points().balance(&tendero(), None), 37);
}

#[test]
fn concurrent_settlements_for_one_shopkeeper_sum_up() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());

    const NUM_ORDERS: usize = 40;
    let ids: Vec<_> = (0..NUM_ORDERS).map(|i| place(&engine, &format!("P{i}"))).collect();

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let engine = engine.clone();
            thread::spawn(move || {
                to_in_transit(&engine, &id);
                engine
                    .update_order(&id, OrderPatch::status(OrderStatus::Delivered))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    let expected = NUM_ORDERS as i64 * 10;
    assert_eq!(engine.balance(&tendero(), None), expected);
    let account = engine.account(&AccountId::Shopkeeper(tendero())).unwrap();
    assert_eq!(account.points(), expected);
    drop(account);
    assert_eq!(engine.ledger_entries().len(), NUM_ORDERS);
    let delivered = OrderFilter {
        status: Some(OrderStatus::Delivered),
        ..OrderFilter::default()
    };
    assert_eq!(engine.orders(&delivered).unwrap().len(), NUM_ORDERS);
}

#[test]
fn redemptions_race_with_earnings_without_overdraw() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    let redeemed = Arc::new(AtomicI64::new(0));

    let ids: Vec<_> = (0..10).map(|i| place(&engine, &format!("P{i}"))).collect();
    for id in &ids {
        to_in_transit(&engine, id);
    }

    let mut handles = Vec::new();
    for id in ids {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            engine
                .update_order(&id, OrderPatch::status(OrderStatus::Delivered))
                .unwrap();
        }));
    }
    for _ in 0..10 {
        let engine = engine.clone();
        let redeemed = redeemed.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                if engine.redeem(&tendero(), 3).is_ok() {
                    redeemed.fetch_add(3, Ordering::SeqCst);
                }
                assert!(engine.balance(&tendero(), None) >= 0);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    let balance = engine.balance(&tendero(), None);
    assert_eq!(balance, 100 - redeemed.load(Ordering::SeqCst));
    assert!(balance >= 0);
    let account = engine.account(&AccountId::Shopkeeper(tendero())).unwrap();
    assert_eq!(account.points(), balance);
}

#[test]
fn readers_iterate_while_writers_mutate() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    let running = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let _ = engine.accounts().count();
                    let _ = engine.notifications(&FeedFilter::default()).len();
                    let _ = engine.snapshot().unwrap();
                    let _ = engine.reconcile().unwrap();
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..8)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    let id = place(&engine, &format!("T{t}-{i}"));
                    to_in_transit(&engine, &id);
                    engine
                        .update_order(&id, OrderPatch::status(OrderStatus::Delivered))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().expect("Thread panicked");
    }
    running.store(false, Ordering::SeqCst);
    for handle in readers {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(engine.ledger_entries().len(), 40);
    assert_eq!(engine.balance(&tendero(), None), 400);
    let report = engine.reconcile().unwrap();
    assert_eq!(report.restored_movements, 0);
}
