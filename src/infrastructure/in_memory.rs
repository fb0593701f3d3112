use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{CatalogClient, OrderLedgerClient};
use crate::domain::product::{NetworkInfo, Product, ProductId};
use crate::error::{PaymentError, Result};

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// An order ledger held entirely in memory.
///
/// Mints server-style order ids, prices orders from its own product list
/// (the client's cached price is never consulted), and enforces monotonic
/// status transitions the way the real backend does. Used by the test
/// suites and by demos that run without a backend.
pub struct InMemoryLedger {
    products: HashMap<ProductId, Product>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    next_order: AtomicU64,
    fault_budget: AtomicU32,
}

impl InMemoryLedger {
    pub fn with_products(products: Vec<Product>) -> Arc<Self> {
        Arc::new(Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            orders: Arc::new(RwLock::new(HashMap::new())),
            next_order: AtomicU64::new(1),
            fault_budget: AtomicU32::new(0),
        })
    }

    /// Makes the next `n` ledger calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fault_budget.store(n, Ordering::SeqCst);
    }

    /// Number of orders created so far.
    pub fn created_orders(&self) -> u64 {
        self.next_order.load(Ordering::SeqCst) - 1
    }

    /// Backend-side status mutation, rejecting non-monotonic transitions.
    pub async fn advance(&self, order_id: &OrderId, status: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))?;
        if !order.status.can_transition_to(status) {
            return Err(PaymentError::InvalidState(
                "order status transitions are monotonic",
            ));
        }
        order.status = status;
        if status.is_terminal() {
            order.completed_at = Some(unix_time());
        }
        Ok(())
    }

    fn consume_fault(&self) -> Result<()> {
        // fetch_update returns Err when the budget is already zero.
        let armed = self
            .fault_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(PaymentError::Network("injected transport fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderLedgerClient for InMemoryLedger {
    async fn create_order(&self, product_id: &ProductId, wallet: &str) -> Result<Order> {
        self.consume_fault()?;
        let product = self
            .products
            .get(product_id)
            .filter(|p| p.active)
            .ok_or_else(|| PaymentError::ProductInactive(product_id.clone()))?;

        let id = OrderId::new(format!(
            "ord-{}",
            self.next_order.fetch_add(1, Ordering::SeqCst)
        ));
        let order = Order {
            id: id.clone(),
            product_id: product_id.clone(),
            wallet_address: wallet.to_string(),
            amount: product.price,
            status: OrderStatus::Pending,
            tx_hash: None,
            created_at: unix_time(),
            completed_at: None,
        };
        self.orders.write().await.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        self.consume_fault()?;
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))
    }

    async fn orders_for_wallet(&self, wallet: &str) -> Result<Vec<Order>> {
        self.consume_fault()?;
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.wallet_address == wallet)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

/// A fixed catalog, for tests and demos.
pub struct StaticCatalog {
    products: Vec<Product>,
    network: NetworkInfo,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>, network: NetworkInfo) -> Arc<Self> {
        Arc::new(Self { products, network })
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.products.clone())
    }

    async fn network(&self) -> Result<NetworkInfo> {
        Ok(self.network.clone())
    }
}
