//! Read model builders.
//!
//! Projections consume committed envelopes and build query-optimized views.
//! All projections are:
//! - **Rebuildable**: reset and replay from the store on startup
//! - **Idempotent**: per-stream cursors skip envelopes already applied
//! - **Inline**: the dispatcher applies them before releasing the stream

pub mod accounts;
pub mod deliveries;
pub mod orders;
pub mod payments;
pub mod payouts;
pub mod restaurants;

pub use accounts::{AccountView, AccountsProjection};
pub use deliveries::{DeliveriesProjection, DeliveryView};
pub use orders::{OrderScope, OrderStats, OrderView, OrdersProjection};
pub use payments::{PaymentView, PaymentsProjection};
pub use payouts::{PayoutView, PayoutsProjection};
pub use restaurants::{RestaurantFilter, RestaurantView, RestaurantsProjection};
