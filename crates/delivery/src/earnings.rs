//! Delivery pricing and courier earnings.
//!
//! All arithmetic is integer cents. The fee grows per started meter and is
//! rounded up to the next cent; the courier share is rounded half-up, and the
//! platform keeps the remainder of the fee so the two always add up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{BasisPoints, DomainError, DomainResult, Money};

use crate::wallet::CourierWallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsPolicy {
    pub base_fee: Money,
    pub per_km: Money,
    pub courier_share: BasisPoints,
    pub platform_commission: BasisPoints,
    pub delivery_radius_m: u32,
    pub min_payout: Money,
}

impl Default for EarningsPolicy {
    fn default() -> Self {
        Self {
            base_fee: Money::from_cents(250),
            per_km: Money::from_cents(60),
            courier_share: BasisPoints::new(8_000),
            platform_commission: BasisPoints::new(1_500),
            delivery_radius_m: 25_000,
            min_payout: Money::from_cents(1_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryQuote {
    pub distance_m: u32,
    pub delivery_fee: Money,
    pub courier_earning: Money,
    pub platform_delivery_cut: Money,
}

impl EarningsPolicy {
    /// Rejects negative amounts and rates above 100 %.
    pub fn validate(self) -> DomainResult<Self> {
        if self.base_fee.is_negative() || self.per_km.is_negative() {
            return Err(DomainError::validation("delivery fees cannot be negative"));
        }
        if self.min_payout.is_negative() {
            return Err(DomainError::validation("minimum payout cannot be negative"));
        }
        if self.delivery_radius_m == 0 {
            return Err(DomainError::validation("delivery radius must be positive"));
        }
        self.courier_share.ensure_at_most_whole()?;
        self.platform_commission.ensure_at_most_whole()?;
        Ok(self)
    }

    pub fn within_radius(&self, distance_m: u32) -> bool {
        distance_m <= self.delivery_radius_m
    }

    /// `base + ceil(distance_m × per_km / 1000)`, split between courier and platform.
    pub fn quote(&self, distance_m: u32) -> DomainResult<DeliveryQuote> {
        if !self.within_radius(distance_m) {
            return Err(DomainError::invariant(format!(
                "address is {:.1} km away, beyond the {:.1} km delivery radius",
                f64::from(distance_m) / 1000.0,
                f64::from(self.delivery_radius_m) / 1000.0
            )));
        }
        let distance_part = (i64::from(distance_m) * self.per_km.cents() + 999) / 1000;
        let delivery_fee = self.base_fee.checked_add(Money::from_cents(distance_part))?;
        let courier_earning = delivery_fee.percent(self.courier_share);
        let platform_delivery_cut = delivery_fee.checked_sub(courier_earning)?;
        Ok(DeliveryQuote { distance_m, delivery_fee, courier_earning, platform_delivery_cut })
    }

    /// Platform cut of the food subtotal; the restaurant keeps the rest.
    pub fn commission_on(&self, subtotal: Money) -> Money {
        subtotal.percent(self.platform_commission)
    }
}

/// Courier earnings over `[from, to)` plus the wallet balances at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub deliveries: u32,
    pub distance_m: u64,
    pub delivery_earnings: Money,
    pub tips: Money,
    pub total: Money,
    pub available: Money,
    pub pending_payout: Money,
    pub paid_out: Money,
}

impl EarningsSummary {
    pub fn for_period(
        wallet: &CourierWallet,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        let in_period = wallet.credits().iter().filter(|c| {
            from.is_none_or(|f| c.credited_at >= f) && to.is_none_or(|t| c.credited_at < t)
        });

        let mut summary = Self {
            from,
            to,
            deliveries: 0,
            distance_m: 0,
            delivery_earnings: Money::ZERO,
            tips: Money::ZERO,
            total: Money::ZERO,
            available: wallet.available(),
            pending_payout: wallet.pending(),
            paid_out: wallet.paid_out(),
        };
        for credit in in_period {
            summary.deliveries += 1;
            summary.distance_m += u64::from(credit.distance_m);
            summary.delivery_earnings = summary.delivery_earnings + credit.earning;
            summary.tips = summary.tips + credit.tip;
        }
        summary.total = summary.delivery_earnings + summary.tips;
        summary
    }
}
