use std::sync::Arc;

use chainpay::PaymentOrchestrator;
use chainpay::domain::product::{Amount, NetworkInfo, Product, ProductId};
use chainpay::infrastructure::fake_wallet::FakeWallet;
use chainpay::infrastructure::in_memory::InMemoryLedger;

pub fn product(id: &str, price: u64) -> Product {
    Product {
        id: ProductId::new(id),
        price: Amount::new(price),
        description: format!("catalog entry {id}"),
        active: true,
    }
}

pub fn network() -> NetworkInfo {
    NetworkInfo {
        chain_id: 137,
        name: "polygon".to_string(),
        token_address: "0xt0ken".to_string(),
        gateway_address: "0x9a7eway".to_string(),
    }
}

pub struct Harness {
    pub wallet: Arc<FakeWallet>,
    pub ledger: Arc<InMemoryLedger>,
    pub orchestrator: Arc<PaymentOrchestrator>,
}

/// A wallet with `balance` against a one-product catalog priced `price`.
pub fn harness(balance: u64, price: u64) -> Harness {
    let wallet = FakeWallet::with_balance(balance);
    let ledger = InMemoryLedger::with_products(vec![product("prod-1", price)]);
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        wallet.clone(),
        ledger.clone(),
        network(),
    ));
    Harness {
        wallet,
        ledger,
        orchestrator,
    }
}
