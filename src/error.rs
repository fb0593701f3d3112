use thiserror::Error;

use crate::domain::order::OrderId;
use crate::domain::product::{Amount, ProductId};

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Failure taxonomy for the purchase flow.
///
/// Wallet and transport failures are recoverable at step boundaries: the
/// session stays on its current step and the same call can be retried.
/// `InvalidState` marks a contract violation (e.g. `pay` before `approve`)
/// and forces a session reset.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("wallet is not connected")]
    WalletNotConnected,
    #[error("product {0} is not available for purchase")]
    ProductInactive(ProductId),
    #[error("a purchase is already in progress for this wallet")]
    PurchaseInProgress,
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },
    #[error("signature request rejected by user")]
    UserRejected,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Whether the same step may be retried without resetting the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UserRejected | Self::Network(_))
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
