//! `miam-ordering`: orders, their pricing, and the per-order chat.
//!
//! An order snapshots the menu lines and the delivery terms at placement;
//! after that it only moves through its status lifecycle. Payment, delivery
//! and courier facts arrive as commands issued by the fulfillment policy.

pub mod chat;
pub mod order;
pub mod pricing;

pub use chat::{
    CHAT_AGGREGATE, ChatMessage, MAX_MESSAGE_LEN, MessagePosted, OrderChat, OrderChatCommand,
    OrderChatEvent, PostMessage,
};
pub use order::{
    AssignCourier, CancelOrder, CourierChanged, DeliveryTerms, ORDER_AGGREGATE, Order,
    OrderCancelled, OrderCommand, OrderEvent, OrderParties, OrderPaymentChanged, OrderPlaced,
    OrderSignal, OrderStatus, OrderStatusChanged, OrderTransition, PaymentMethod, PaymentSignal,
    PaymentStatus, PlaceOrder,
};
pub use pricing::{
    LineRequest, MAX_LINES, MAX_QUANTITY, OrderLine, PricedLines, order_total, price_lines,
};
