//! `miam-payments`: payments for orders and the gateway seam.

pub mod gateway;
pub mod payment;

pub use gateway::{ChargeRequest, GatewayError, GatewayOutcome, MockGateway, PaymentGateway};
pub use payment::{
    CompletePayment, FailPayment, InitiatePayment, PAYMENT_AGGREGATE, Payment, PaymentCommand,
    PaymentCompleted, PaymentEvent, PaymentFailed, PaymentInitiated, PaymentRefunded,
    PaymentState, RefundPayment,
};
