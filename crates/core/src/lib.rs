//! `miam-core`: domain foundation shared by every marketplace area.
//!
//! Pure types only: identifiers, money, geography, the aggregate contract and
//! the domain error model. Nothing here performs IO.

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod geo;
pub mod id;
pub mod money;

pub use actor::Actor;
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use geo::{Address, GeoPoint};
pub use id::{
    AggregateId, DeliveryId, MenuItemId, MessageId, NotificationId, OrderId, PaymentId, PayoutId,
    RestaurantId, UserId,
};
pub use money::{BasisPoints, Money};
