use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::UserId;
use super::idempotency::IdempotencyKey;

/// Charge request sent to the gateway for paid-tier submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub amount: u64,
    pub payer_id: UserId,
    pub payer_reference: String,
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Proof of a successful charge, stored on the submission it paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: u64,
}

/// Checkout boundary. A paid-tier submission is only created after `charge` succeeds.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentReceipt, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}
