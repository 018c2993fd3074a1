//! `miam-delivery`: courier jobs, delivery pricing and courier wallets.
//!
//! - [`delivery`]: one delivery per order, from *available* to *delivered*
//! - [`earnings`]: fee quotes, courier share and period summaries
//! - [`wallet`]: per-courier balance, idempotent credits and payouts

pub mod delivery;
pub mod earnings;
pub mod wallet;

pub use delivery::{
    AcceptDelivery, CancelDelivery, CourierAction, CreateDelivery, DELIVERY_AGGREGATE, Delivery,
    DeliveryCommand, DeliveryCompleted, DeliveryCreated, DeliveryEvent, DeliveryStatus,
    DeliveryStatusChanged, MarkReadyForPickup, delivery_id_for,
};
pub use earnings::{DeliveryQuote, EarningsPolicy, EarningsSummary};
pub use wallet::{
    CourierWallet, CreditDelivery, PayoutRecord, PayoutStatus, RejectPayout, RequestPayout,
    SettlePayout, WALLET_AGGREGATE, WalletCommand, WalletCredit, WalletEvent, PayoutRequested,
    PayoutResolved, WalletCredited,
};
