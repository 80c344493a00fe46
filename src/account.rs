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

//! Per-actor balance aggregates.
//!
//! An [`Account`] is a cache derived from the movement log (shopkeeper
//! points) or the settlement ledger (courier earnings). It is never the
//! source of truth; [`crate::Engine::reconcile`] can rebuild it.
//!
//! # Example
//!
//! ```
//! use bodega_ledger::{Account, AccountId, ShopkeeperId};
//!
//! let account = Account::new(AccountId::Shopkeeper(ShopkeeperId::from("3005551234")));
//! assert_eq!(account.points(), 0);
//! ```

use crate::LedgerError;
use crate::base::{CourierId, ShopkeeperId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Shopkeeper,
    Courier,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shopkeeper => f.write_str("shopkeeper"),
            Self::Courier => f.write_str("courier"),
        }
    }
}

/// Account key: the actor kind is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountId {
    Shopkeeper(ShopkeeperId),
    Courier(CourierId),
}

impl AccountId {
    pub fn kind(&self) -> AccountKind {
        match self {
            Self::Shopkeeper(_) => AccountKind::Shopkeeper,
            Self::Courier(_) => AccountKind::Courier,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Shopkeeper(id) => id.as_str(),
            Self::Courier(id) => id.as_str(),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

#[derive(Debug)]
struct AccountData {
    id: AccountId,
    /// Shopkeeper loyalty points.
    points: i64,
    /// Courier cumulative earnings.
    earnings: Decimal,
    updated_at: DateTime<Utc>,
}

impl AccountData {
    fn new(id: AccountId) -> Self {
        Self {
            id,
            points: 0,
            earnings: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.points >= 0,
            "Invariant violated: points went negative: {}",
            self.points
        );
        debug_assert!(
            self.earnings >= Decimal::ZERO,
            "Invariant violated: earnings went negative: {}",
            self.earnings
        );
        debug_assert!(
            self.id.kind() == AccountKind::Shopkeeper || self.points == 0,
            "Invariant violated: courier account holds points"
        );
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn earn(&mut self, points: i64) -> Result<(), LedgerError> {
        if self.id.kind() != AccountKind::Shopkeeper {
            return Err(LedgerError::InvalidPoints);
        }
        if points < 0 {
            return Err(LedgerError::InvalidPoints);
        }
        self.points = self.points.checked_add(points).ok_or(LedgerError::InvalidPoints)?;
        self.touch();
        self.assert_invariants();
        Ok(())
    }

    /// Deducts points, clamping at zero.
    fn redeem(&mut self, points: i64) -> Result<(), LedgerError> {
        if self.id.kind() != AccountKind::Shopkeeper || points <= 0 {
            return Err(LedgerError::InvalidPoints);
        }
        self.points = (self.points - points).max(0);
        self.touch();
        self.assert_invariants();
        Ok(())
    }

    fn credit_earnings(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if self.id.kind() != AccountKind::Courier || amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.earnings += amount;
        self.touch();
        self.assert_invariants();
        Ok(())
    }
}

/// Derived balance of one shopkeeper or courier.
#[derive(Debug)]
pub struct Account {
    inner: Mutex<AccountData>,
}

impl Account {
    const DECIMAL_PRECISION: u32 = 2;

    pub fn new(id: AccountId) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(id)),
        }
    }

    pub fn id(&self) -> AccountId {
        self.inner.lock().id.clone()
    }

    pub fn kind(&self) -> AccountKind {
        self.inner.lock().id.kind()
    }

    pub fn points(&self) -> i64 {
        self.inner.lock().points
    }

    pub fn earnings(&self) -> Decimal {
        self.inner.lock().earnings
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().updated_at
    }

    pub(crate) fn earn(&self, points: i64) -> Result<(), LedgerError> {
        self.inner.lock().earn(points)
    }

    pub(crate) fn redeem(&self, points: i64) -> Result<(), LedgerError> {
        self.inner.lock().redeem(points)
    }

    pub(crate) fn credit_earnings(&self, amount: Decimal) -> Result<(), LedgerError> {
        self.inner.lock().credit_earnings(amount)
    }

    /// Overwrites the cached totals. Returns `true` if anything changed.
    pub(crate) fn reset(&self, points: i64, earnings: Decimal) -> bool {
        let mut data = self.inner.lock();
        if data.points == points && data.earnings == earnings {
            return false;
        }
        data.points = points;
        data.earnings = earnings;
        data.touch();
        data.assert_invariants();
        true
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Account", 5)?;
        state.serialize_field("account", data.id.as_str())?;
        state.serialize_field("kind", &data.id.kind())?;
        state.serialize_field("points", &data.points)?;
        state.serialize_field(
            "earnings",
            &data.earnings.round_dp(Account::DECIMAL_PRECISION),
        )?;
        state.serialize_field("updatedAt", &data.updated_at)?;
        state.end()
    }
}
