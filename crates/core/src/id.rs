//! Strongly-typed identifiers.
//!
//! Every id wraps a UUIDv7 and converts losslessly to and from [`AggregateId`],
//! which is the stream key used by the event store.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Fresh time-ordered identifier. Tests should prefer `from_uuid`.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_id!(
    /// Identifies an aggregate stream in the event store.
    AggregateId,
    "AggregateId"
);

macro_rules! stream_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        uuid_id!($(#[$meta])* $t, $name);

        impl From<$t> for AggregateId {
            fn from(value: $t) -> Self {
                AggregateId::from_uuid(value.0)
            }
        }

        impl From<AggregateId> for $t {
            fn from(value: AggregateId) -> Self {
                Self(*value.as_uuid())
            }
        }
    };
}

stream_id!(
    /// A registered account (client, restaurateur, courier or admin).
    UserId,
    "UserId"
);
stream_id!(RestaurantId, "RestaurantId");
stream_id!(MenuItemId, "MenuItemId");
stream_id!(OrderId, "OrderId");
stream_id!(PaymentId, "PaymentId");
stream_id!(DeliveryId, "DeliveryId");
stream_id!(PayoutId, "PayoutId");
stream_id!(NotificationId, "NotificationId");
stream_id!(MessageId, "MessageId");
