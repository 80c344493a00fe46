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

//! Settlement parameters.
//!
//! The engine reads a [`SettlementConfig`] snapshot once per settlement, so a
//! ledger entry always reflects the parameters in effect when it was written.

use crate::LedgerError;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettlementConfig {
    /// Flat fee paid to the courier per delivered order, in minor units.
    #[serde(with = "rust_decimal::serde::float")]
    pub base_courier_fee: Decimal,
    /// Share of the order total added to the courier fee.
    #[serde(with = "rust_decimal::serde::float")]
    pub courier_percentage: Decimal,
    /// Share of the order total kept by the platform.
    #[serde(with = "rust_decimal::serde::float")]
    pub platform_margin_percentage: Decimal,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            base_courier_fee: dec!(5000),
            courier_percentage: dec!(0.02),
            platform_margin_percentage: dec!(0.12),
        }
    }
}

impl SettlementConfig {
    /// Reads a JSON config; missing fields keep their defaults.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if any parameter is negative.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.base_courier_fee < Decimal::ZERO
            || self.courier_percentage < Decimal::ZERO
            || self.platform_margin_percentage < Decimal::ZERO
        {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }
}

/// Source of the current settlement parameters.
pub trait ConfigProvider: Send + Sync {
    fn settlement_config(&self) -> SettlementConfig;
}

impl ConfigProvider for SettlementConfig {
    fn settlement_config(&self) -> SettlementConfig {
        *self
    }
}

/// Config that the admin side can replace at runtime.
#[derive(Debug, Default)]
pub struct SharedConfig {
    inner: RwLock<SettlementConfig>,
}

impl SharedConfig {
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Replaces the config for all future settlements.
    ///
    /// # Errors
    ///
    /// Rejects invalid configs, leaving the current one in place.
    pub fn replace(&self, config: SettlementConfig) -> Result<(), LedgerError> {
        config.validate()?;
        *self.inner.write() = config;
        tracing::info!(?config, "settlement config replaced");
        Ok(())
    }
}

impl ConfigProvider for SharedConfig {
    fn settlement_config(&self) -> SettlementConfig {
        *self.inner.read()
    }
}
