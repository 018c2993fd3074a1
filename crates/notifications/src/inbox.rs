use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{Aggregate, AggregateRoot, DomainError, NotificationId, OrderId, UserId};
use miam_events::Event;

use crate::kind::NotificationKind;

pub const INBOX_AGGREGATE: &str = "notifications.inbox";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbox {
    id: UserId,
    notifications: Vec<Notification>,
    version: u64,
}

impl Inbox {
    pub fn empty(id: UserId) -> Self {
        Self { id, notifications: Vec::new(), version: 0 }
    }

    /// Oldest first, in delivery order.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read()).count()
    }

    fn find(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.notification_id == id)
    }
}

impl AggregateRoot for Inbox {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverNotification {
    pub recipient_id: UserId,
    pub notification_id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub order_id: Option<OrderId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRead {
    pub recipient_id: UserId,
    pub notification_id: NotificationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAllRead {
    pub recipient_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxCommand {
    Deliver(DeliverNotification),
    MarkRead(MarkRead),
    MarkAllRead(MarkAllRead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDelivered {
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRead {
    pub recipient_id: UserId,
    pub notification_id: NotificationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllNotificationsRead {
    pub recipient_id: UserId,
    pub notification_ids: Vec<NotificationId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxEvent {
    Delivered(NotificationDelivered),
    Read(NotificationRead),
    AllRead(AllNotificationsRead),
}

impl InboxEvent {
    pub fn recipient_id(&self) -> UserId {
        match self {
            InboxEvent::Delivered(e) => e.notification.recipient_id,
            InboxEvent::Read(e) => e.recipient_id,
            InboxEvent::AllRead(e) => e.recipient_id,
        }
    }
}

impl Event for InboxEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InboxEvent::Delivered(_) => "notifications.inbox.delivered",
            InboxEvent::Read(_) => "notifications.inbox.read",
            InboxEvent::AllRead(_) => "notifications.inbox.all_read",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InboxEvent::Delivered(e) => e.notification.created_at,
            InboxEvent::Read(e) => e.occurred_at,
            InboxEvent::AllRead(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Inbox {
    type Command = InboxCommand;
    type Event = InboxEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InboxEvent::Delivered(e) => {
                self.id = e.notification.recipient_id;
                self.notifications.push(e.notification.clone());
            }
            InboxEvent::Read(e) => {
                if let Some(n) = self
                    .notifications
                    .iter_mut()
                    .find(|n| n.notification_id == e.notification_id)
                {
                    n.read_at = Some(e.occurred_at);
                }
            }
            InboxEvent::AllRead(e) => {
                for n in self
                    .notifications
                    .iter_mut()
                    .filter(|n| e.notification_ids.contains(&n.notification_id))
                {
                    n.read_at = Some(e.occurred_at);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InboxCommand::Deliver(cmd) => {
                if self.find(cmd.notification_id).is_some() {
                    return Ok(vec![]);
                }
                if cmd.title.trim().is_empty() {
                    return Err(DomainError::validation("notification title cannot be empty"));
                }
                Ok(vec![InboxEvent::Delivered(NotificationDelivered {
                    notification: Notification {
                        notification_id: cmd.notification_id,
                        recipient_id: cmd.recipient_id,
                        kind: cmd.kind,
                        title: cmd.title.clone(),
                        body: cmd.body.clone(),
                        order_id: cmd.order_id,
                        created_at: cmd.occurred_at,
                        read_at: None,
                    },
                })])
            }
            InboxCommand::MarkRead(cmd) => {
                let Some(n) = self.find(cmd.notification_id) else {
                    return Err(DomainError::NotFound);
                };
                if n.is_read() {
                    return Ok(vec![]);
                }
                Ok(vec![InboxEvent::Read(NotificationRead {
                    recipient_id: self.id,
                    notification_id: cmd.notification_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            InboxCommand::MarkAllRead(cmd) => {
                let unread: Vec<_> = self
                    .notifications
                    .iter()
                    .filter(|n| !n.is_read())
                    .map(|n| n.notification_id)
                    .collect();
                if unread.is_empty() {
                    return Ok(vec![]);
                }
                Ok(vec![InboxEvent::AllRead(AllNotificationsRead {
                    recipient_id: self.id,
                    notification_ids: unread,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
