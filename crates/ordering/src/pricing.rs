//! Line snapshotting and order totals.

use serde::{Deserialize, Serialize};

use miam_catalog::Restaurant;
use miam_core::{DomainError, DomainResult, MenuItemId, Money};

pub const MAX_LINES: usize = 50;
pub const MAX_QUANTITY: u32 = 99;

/// What the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_id: MenuItemId,
    pub quantity: u32,
}

/// Menu line frozen at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: MenuItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLines {
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
}

/// Resolve requested lines against the restaurant's current menu.
///
/// Repeated items are merged before the quantity bound is checked. The
/// restaurant must be open and every item available.
pub fn price_lines(restaurant: &Restaurant, requests: &[LineRequest]) -> DomainResult<PricedLines> {
    if !restaurant.exists() {
        return Err(DomainError::NotFound);
    }
    if !restaurant.is_open() {
        return Err(DomainError::invariant("restaurant is closed"));
    }

    let mut merged: Vec<LineRequest> = Vec::new();
    for req in requests {
        match merged.iter_mut().find(|m| m.item_id == req.item_id) {
            Some(m) => m.quantity = m.quantity.saturating_add(req.quantity),
            None => merged.push(*req),
        }
    }
    if merged.is_empty() {
        return Err(DomainError::validation("an order needs at least one line"));
    }
    if merged.len() > MAX_LINES {
        return Err(DomainError::validation(format!("at most {MAX_LINES} lines per order")));
    }

    let mut lines = Vec::with_capacity(merged.len());
    for req in merged {
        if req.quantity == 0 || req.quantity > MAX_QUANTITY {
            return Err(DomainError::validation(format!(
                "quantity must be within 1..={MAX_QUANTITY}"
            )));
        }
        let item = restaurant.item(req.item_id).ok_or_else(|| {
            DomainError::validation(format!("menu item {} does not exist", req.item_id))
        })?;
        if !item.available {
            return Err(DomainError::invariant(format!("'{}' is unavailable", item.name)));
        }
        lines.push(OrderLine {
            item_id: item.id,
            name: item.name.clone(),
            unit_price: item.price,
            quantity: req.quantity,
            line_total: item.price.times(req.quantity)?,
        });
    }

    let subtotal = lines
        .iter()
        .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.line_total))?;
    Ok(PricedLines { lines, subtotal })
}

/// `subtotal + delivery_fee + tip`; a negative tip is refused.
pub fn order_total(subtotal: Money, delivery_fee: Money, tip: Money) -> DomainResult<Money> {
    if tip.is_negative() {
        return Err(DomainError::validation("tip cannot be negative"));
    }
    subtotal.checked_add(delivery_fee)?.checked_add(tip)
}
