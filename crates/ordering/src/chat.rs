//! Per-order chat thread between the client, the restaurant and the courier.
//!
//! The thread shares its stream key with the order. Who may post is decided by
//! the caller against the order's participants; the thread only guards the
//! message itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{Aggregate, AggregateRoot, DomainError, MessageId, OrderId, UserId};
use miam_events::Event;

pub const CHAT_AGGREGATE: &str = "ordering.chat";
pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub author_id: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChat {
    id: OrderId,
    messages: Vec<ChatMessage>,
    version: u64,
}

impl OrderChat {
    pub fn empty(id: OrderId) -> Self {
        Self { id, messages: Vec::new(), version: 0 }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

impl AggregateRoot for OrderChat {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMessage {
    pub order_id: OrderId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderChatCommand {
    Post(PostMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePosted {
    pub order_id: OrderId,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderChatEvent {
    MessagePosted(MessagePosted),
}

impl Event for OrderChatEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderChatEvent::MessagePosted(_) => "ordering.chat.message_posted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderChatEvent::MessagePosted(e) => e.message.sent_at,
        }
    }
}

impl Aggregate for OrderChat {
    type Command = OrderChatCommand;
    type Event = OrderChatEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderChatEvent::MessagePosted(e) => {
                self.id = e.order_id;
                self.messages.push(e.message.clone());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderChatCommand::Post(cmd) => {
                let body = cmd.body.trim();
                if body.is_empty() {
                    return Err(DomainError::validation("message cannot be empty"));
                }
                if body.chars().count() > MAX_MESSAGE_LEN {
                    return Err(DomainError::validation(format!(
                        "message cannot exceed {MAX_MESSAGE_LEN} characters"
                    )));
                }
                if self.messages.iter().any(|m| m.message_id == cmd.message_id) {
                    return Ok(vec![]);
                }
                Ok(vec![OrderChatEvent::MessagePosted(MessagePosted {
                    order_id: cmd.order_id,
                    message: ChatMessage {
                        message_id: cmd.message_id,
                        author_id: cmd.author_id,
                        body: body.to_string(),
                        sent_at: cmd.occurred_at,
                    },
                })])
            }
        }
    }
}
