//! `miam-notifications`: per-user inbox and the notification catalogue.
//!
//! The inbox is an aggregate keyed by the recipient's user id. Which events
//! produce which notification, and for whom, is described by [`NotificationKind`];
//! resolving an audience to concrete users is up to the caller.

pub mod inbox;
pub mod kind;

pub use inbox::{
    AllNotificationsRead, DeliverNotification, INBOX_AGGREGATE, Inbox, InboxCommand, InboxEvent,
    MarkAllRead, MarkRead, Notification, NotificationDelivered, NotificationRead,
};
pub use kind::{Audience, NotificationKind, Rendered};
