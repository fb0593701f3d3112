use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::order::{Order, OrderId};
use super::product::{Amount, NetworkInfo, Product, ProductId};
use crate::error::Result;

pub type WalletRef = Arc<dyn WalletConnector>;
pub type CatalogRef = Arc<dyn CatalogClient>;
pub type LedgerRef = Arc<dyn OrderLedgerClient>;

/// Connection-lifecycle notifications from the wallet provider.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    /// The signing account changed or disconnected (`None`).
    AccountChanged(Option<String>),
    ChainChanged(u64),
}

/// The wallet provider: an opaque signer plus chain reader.
///
/// `approve` and `submit_payment` resolve once the signer confirms and the
/// transaction broadcasts. Neither waits for chain confirmation; that is
/// the reconciler's job.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Currently connected account, `None` when disconnected.
    fn address(&self) -> Option<String>;

    /// Last-known token balance. Reads the connector's cache; never a
    /// network call.
    fn balance(&self) -> Amount;

    /// Authorize `spender` to move up to `amount` of the payment token.
    /// Returns the broadcast transaction hash.
    async fn approve(&self, spender: &str, amount: Amount) -> Result<String>;

    /// Execute the payment through the gateway for an existing order.
    /// Returns the broadcast transaction hash.
    async fn submit_payment(&self, product_id: &ProductId, order_id: &OrderId) -> Result<String>;

    /// Account/chain change notifications.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Read access to the product catalog and chain parameters.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn products(&self) -> Result<Vec<Product>>;
    async fn network(&self) -> Result<NetworkInfo>;
}

/// The backend order ledger.
#[async_trait]
pub trait OrderLedgerClient: Send + Sync {
    /// Create a new order for `product_id`. The returned order carries the
    /// server-issued id and the authoritative amount.
    async fn create_order(&self, product_id: &ProductId, wallet: &str) -> Result<Order>;

    async fn get_order(&self, order_id: &OrderId) -> Result<Order>;

    /// All orders ever created for a wallet, newest first. Backs the order
    /// history view that timed-out purchases are routed to.
    async fn orders_for_wallet(&self, wallet: &str) -> Result<Vec<Order>>;
}
