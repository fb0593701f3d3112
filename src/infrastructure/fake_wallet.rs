use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::order::OrderId;
use crate::domain::ports::{WalletConnector, WalletEvent};
use crate::domain::product::{Amount, ProductId};
use crate::error::{PaymentError, Result};

/// A scriptable wallet connector.
///
/// Signs nothing and touches no chain: `approve` and `submit_payment` hand
/// back deterministic fake transaction hashes unless a failure has been
/// scripted. Call counters let tests assert which wallet interactions a
/// flow performed (or, for pre-flight failures, that none happened).
pub struct FakeWallet {
    address: RwLock<Option<String>>,
    balance: AtomicU64,
    approve_calls: AtomicU32,
    submit_calls: AtomicU32,
    reject_next_approve: AtomicBool,
    fail_next_submit: AtomicBool,
    last_approved: RwLock<Option<(String, Amount)>>,
    events: broadcast::Sender<WalletEvent>,
}

impl FakeWallet {
    pub fn with_balance(balance: u64) -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            address: RwLock::new(Some("0xbuyer".to_string())),
            balance: AtomicU64::new(balance),
            approve_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            reject_next_approve: AtomicBool::new(false),
            fail_next_submit: AtomicBool::new(false),
            last_approved: RwLock::new(None),
            events,
        })
    }

    pub fn disconnected() -> Arc<Self> {
        let wallet = Self::with_balance(0);
        wallet.switch_account(None);
        wallet
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::SeqCst);
    }

    /// Scripts a user rejection for the next `approve` call.
    pub fn reject_next_approve(&self) {
        self.reject_next_approve.store(true, Ordering::SeqCst);
    }

    /// Scripts an RPC failure for the next `submit_payment` call.
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::SeqCst);
    }

    pub fn approve_calls(&self) -> u32 {
        self.approve_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// The amount passed to the most recent successful `approve`.
    pub fn last_approved_amount(&self) -> Option<Amount> {
        self.last_approved
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(_, amount)| *amount))
    }

    /// The spender passed to the most recent successful `approve`.
    pub fn last_approved_spender(&self) -> Option<String> {
        self.last_approved
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(spender, _)| spender.clone()))
    }

    /// Simulates the provider switching accounts, notifying subscribers.
    pub fn switch_account(&self, address: Option<String>) {
        if let Ok(mut guard) = self.address.write() {
            *guard = address.clone();
        }
        let _ = self.events.send(WalletEvent::AccountChanged(address));
    }
}

#[async_trait]
impl WalletConnector for FakeWallet {
    fn address(&self) -> Option<String> {
        self.address.read().ok().and_then(|guard| guard.clone())
    }

    fn balance(&self) -> Amount {
        Amount::new(self.balance.load(Ordering::SeqCst))
    }

    async fn approve(&self, spender: &str, amount: Amount) -> Result<String> {
        let call = self.approve_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_next_approve.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::UserRejected);
        }
        if let Ok(mut guard) = self.last_approved.write() {
            *guard = Some((spender.to_string(), amount));
        }
        Ok(format!("0xapproval{call:04}"))
    }

    async fn submit_payment(&self, _product_id: &ProductId, order_id: &OrderId) -> Result<String> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Network("rpc unavailable".to_string()));
        }
        Ok(format!("0xpayment{call:04}for{order_id}"))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
