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

//! Shopkeeper identity resolution.
//!
//! Checkout does not carry a stable shopkeeper account, so the identity is
//! derived from the customer phone (digits only) and, failing that, from the
//! customer name (trimmed, lowercased, single-spaced).

use crate::base::ShopkeeperId;
use crate::order::Order;

/// Strips everything but ASCII digits. Returns `None` when nothing is left.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then(|| name.to_lowercase())
}

/// Phone first, then name; `None` if neither yields anything.
pub fn resolve_shopkeeper(phone: Option<&str>, name: Option<&str>) -> Option<ShopkeeperId> {
    phone
        .and_then(normalize_phone)
        .or_else(|| name.and_then(normalize_name))
        .map(ShopkeeperId)
}

pub fn shopkeeper_for_order(order: &Order) -> Option<ShopkeeperId> {
    resolve_shopkeeper(order.customer_phone.as_deref(), order.customer_name.as_deref())
}
