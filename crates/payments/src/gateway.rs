//! Payment provider seam.
//!
//! Online methods are charged synchronously while the client waits. A decline
//! is a normal outcome; a [`GatewayError`] means the provider could not be
//! reached or refused the request itself.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use miam_core::{Money, OrderId, PaymentId};
use miam_ordering::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment provider rejected the request: {0}")]
    InvalidRequest(String),

    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayOutcome, GatewayError>;

    /// Return a captured charge to the payer.
    async fn refund(&self, reference: &str, amount: Money) -> Result<String, GatewayError>;
}

/// In-process provider. Amounts whose cents end in `99` are declined.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    latency: Duration,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    async fn simulate_network(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    #[instrument(
        skip(self),
        fields(payment_id = %request.payment_id, order_id = %request.order_id)
    )]
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayOutcome, GatewayError> {
        if !request.amount.is_positive() {
            return Err(GatewayError::InvalidRequest("amount must be greater than zero".into()));
        }
        if !request.method.is_online() {
            return Err(GatewayError::InvalidRequest("cash is not charged online".into()));
        }
        self.simulate_network().await;

        if request.amount.cents() % 100 == 99 {
            warn!(amount = %request.amount, "mock charge declined");
            return Ok(GatewayOutcome::Declined { reason: "card declined".into() });
        }
        let reference = format!("mock_ch_{}", Uuid::now_v7().simple());
        info!(%reference, amount = %request.amount, "mock charge approved");
        Ok(GatewayOutcome::Approved { reference })
    }

    #[instrument(skip(self))]
    async fn refund(&self, reference: &str, amount: Money) -> Result<String, GatewayError> {
        if !reference.starts_with("mock_ch_") {
            return Err(GatewayError::InvalidRequest(format!("unknown charge {reference}")));
        }
        self.simulate_network().await;
        let refund_ref = format!("mock_re_{}", Uuid::now_v7().simple());
        info!(%refund_ref, %amount, "mock refund issued");
        Ok(refund_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cents: i64, method: PaymentMethod) -> ChargeRequest {
        ChargeRequest {
            payment_id: PaymentId::new(),
            order_id: OrderId::new(),
            amount: Money::from_cents(cents),
            method,
        }
    }

    #[tokio::test]
    async fn approves_ordinary_amounts() {
        let outcome = MockGateway::new()
            .charge(&request(2936, PaymentMethod::Card))
            .await
            .unwrap();
        match outcome {
            GatewayOutcome::Approved { reference } => assert!(reference.starts_with("mock_ch_")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn declines_amounts_ending_in_99() {
        let outcome = MockGateway::new()
            .charge(&request(1099, PaymentMethod::MobileMoney))
            .await
            .unwrap();
        assert!(matches!(outcome, GatewayOutcome::Declined { .. }));
    }

    #[tokio::test]
    async fn refuses_cash_and_non_positive_amounts() {
        let gw = MockGateway::new();
        assert!(gw.charge(&request(1000, PaymentMethod::Cash)).await.is_err());
        assert!(gw.charge(&request(0, PaymentMethod::Card)).await.is_err());
    }

    #[tokio::test]
    async fn refunds_known_charges() {
        let gw = MockGateway::new();
        assert!(gw.refund("mock_ch_abc", Money::from_cents(100)).await.is_ok());
        assert!(gw.refund("stripe_xyz", Money::from_cents(100)).await.is_err());
    }
}
