use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::product::{Amount, ProductId};

/// Server-issued idempotency key for one purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl OrderStatus {
    /// A terminal status has no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Whether the backend may move an order from `self` to `next`.
    /// Transitions are monotonic: non-terminal states only move forward,
    /// terminal states never change.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Processing => next.is_terminal(),
            _ => false,
        }
    }
}

/// The backend's durable record of one purchase attempt.
///
/// Created once per attempt by the ledger; `status` is mutated only by the
/// backend. `amount` is fixed at creation time and is the server's value,
/// not the client's cached price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "orderId")]
    pub id: OrderId,
    pub product_id: ProductId,
    pub wallet_address: String,
    pub amount: Amount,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}
