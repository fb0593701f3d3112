use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::instrument;

use crate::application::reconciler::{ConfirmationReconciler, PollPolicy, ReconcileOutcome};
use crate::domain::order::Order;
use crate::domain::ports::{CatalogRef, LedgerRef, WalletEvent, WalletRef};
use crate::domain::product::{NetworkInfo, Product};
use crate::domain::session::{
    PendingOrder, PurchaseSession, PurchaseStep, SessionEvent, SessionId,
};
use crate::error::{PaymentError, Result};

/// Where a finished reconciliation left the purchase.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    Completed(Order),
    Failed(Order),
    /// Still unresolved after the attempt budget. The session stays in
    /// `Verifying`; route the user to order history instead of reporting a
    /// definite failure.
    TimedOut,
    /// The session was reset while polling; nothing was applied.
    Cancelled,
}

/// Drives the purchase state machine
/// (`Select → Approve → Pay → Verifying → Complete/Failed`).
///
/// Holds at most one session per connected wallet. Steps for a session are
/// serialized: each method takes the session slot for the duration of its
/// wallet and ledger calls, so two orchestrator steps never interleave.
/// The slot is *not* held across the reconciler's polling loop, which is
/// what keeps `reset` callable while a purchase is being verified.
pub struct PaymentOrchestrator {
    wallet: WalletRef,
    ledger: LedgerRef,
    network: NetworkInfo,
    reconciler: Arc<ConfirmationReconciler>,
    session: Mutex<Option<PurchaseSession>>,
    next_session_id: AtomicU64,
}

impl PaymentOrchestrator {
    pub fn new(wallet: WalletRef, ledger: LedgerRef, network: NetworkInfo) -> Self {
        let reconciler = Arc::new(ConfirmationReconciler::new(ledger.clone()));
        Self {
            wallet,
            ledger,
            network,
            reconciler,
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Fetches chain parameters from the catalog and wires the
    /// orchestrator against them.
    pub async fn from_catalog(
        wallet: WalletRef,
        catalog: CatalogRef,
        ledger: LedgerRef,
    ) -> Result<Self> {
        let network = catalog.network().await?;
        Ok(Self::new(wallet, ledger, network))
    }

    /// Opens a purchase session for `product` and advances it to `Approve`.
    ///
    /// Rejected when the wallet is disconnected, the product is inactive,
    /// or another session is active for this wallet: interleaving two
    /// purchases on one wallet races its token allowance and nonce.
    #[instrument(skip(self, product), fields(product = %product.id))]
    pub async fn start_purchase(&self, product: Product) -> Result<SessionId> {
        if self.wallet.address().is_none() {
            return Err(PaymentError::WalletNotConnected);
        }
        if !product.active {
            return Err(PaymentError::ProductInactive(product.id));
        }

        let mut slot = self.session.lock().await;
        if let Some(existing) = slot.as_ref()
            && existing.is_active()
        {
            return Err(PaymentError::PurchaseInProgress);
        }

        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let mut session = PurchaseSession::new(id, product);
        session.advance(SessionEvent::ProductSelected)?;
        tracing::debug!("opened {id} at step {:?}", session.step);
        *slot = Some(session);
        Ok(id)
    }

    /// Phase one: authorize the gateway to spend the order amount.
    ///
    /// Fails fast on insufficient cached balance, before any network or
    /// wallet call. Creates the backend order on first invocation only; a
    /// retry after a wallet rejection reuses the existing order, so one
    /// session never produces two orders.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: SessionId) -> Result<()> {
        let mut slot = self.session.lock().await;
        let session = Self::expect_session(&mut slot, id)?;
        match session.step {
            PurchaseStep::Approve => {}
            // Double invocation from an impatient UI: the allowance is
            // already granted for the pending order, nothing to redo.
            PurchaseStep::Pay if session.pending_order.is_some() => return Ok(()),
            _ => return Err(PaymentError::InvalidState("approve requires step Approve")),
        }

        let price = session.product.price;
        let balance = self.wallet.balance();
        if balance < price {
            return Err(PaymentError::InsufficientBalance {
                needed: price,
                available: balance,
            });
        }

        let pending = match session.pending_order.clone() {
            Some(pending) => pending,
            None => {
                let wallet_address = self
                    .wallet
                    .address()
                    .ok_or(PaymentError::WalletNotConnected)?;
                let order = self
                    .ledger
                    .create_order(&session.product.id, &wallet_address)
                    .await?;
                if order.amount != price {
                    tracing::warn!(
                        "order {} amount {} differs from cached price {}; server amount wins",
                        order.id,
                        order.amount,
                        price
                    );
                }
                let pending = PendingOrder {
                    order_id: order.id,
                    amount: order.amount,
                };
                session.pending_order = Some(pending.clone());
                pending
            }
        };

        self.wallet
            .approve(&self.network.gateway_address, pending.amount)
            .await?;

        session.advance(SessionEvent::ApprovalConfirmed)?;
        tracing::debug!("{id} approved order {}", pending.order_id);
        Ok(())
    }

    /// Phase two: execute the payment through the gateway.
    ///
    /// Requires an approved session with a pending order; calling it out of
    /// order is a programming error, not a user-facing condition. A wallet
    /// rejection leaves the session in `Pay` and the retry reuses the same
    /// order id.
    #[instrument(skip(self))]
    pub async fn pay(&self, id: SessionId) -> Result<String> {
        let mut slot = self.session.lock().await;
        let session = Self::expect_session(&mut slot, id)?;
        if session.step != PurchaseStep::Pay {
            return Err(PaymentError::InvalidState("pay requires step Pay"));
        }
        let Some(pending) = session.pending_order.clone() else {
            return Err(PaymentError::InvalidState("pay requires a pending order"));
        };

        let tx_hash = self
            .wallet
            .submit_payment(&session.product.id, &pending.order_id)
            .await?;

        session.tx_hash = Some(tx_hash.clone());
        session.advance(SessionEvent::PaymentSubmitted)?;
        tracing::debug!("{id} submitted payment {tx_hash} for order {}", pending.order_id);
        Ok(tx_hash)
    }

    /// Reconciles the submitted payment against the ledger and applies the
    /// outcome to the session.
    ///
    /// The session slot is released while polling runs; a `reset` issued in
    /// the meantime cancels the poll loop, and the loop's late result is
    /// discarded rather than applied to the cleared session.
    #[instrument(skip(self, policy))]
    pub async fn await_confirmation(
        &self,
        id: SessionId,
        policy: PollPolicy,
    ) -> Result<PurchaseOutcome> {
        let order_id = {
            let mut slot = self.session.lock().await;
            let session = Self::expect_session(&mut slot, id)?;
            if session.step != PurchaseStep::Verifying {
                return Err(PaymentError::InvalidState(
                    "confirmation requires step Verifying",
                ));
            }
            match &session.pending_order {
                Some(pending) => pending.order_id.clone(),
                None => return Err(PaymentError::InvalidState("no order to verify")),
            }
        };

        let outcome = self.reconciler.await_completion(&order_id, policy).await?;

        let mut slot = self.session.lock().await;
        let still_verifying = slot
            .as_mut()
            .filter(|s| s.id == id && s.step == PurchaseStep::Verifying);
        let Some(session) = still_verifying else {
            // Reset or superseded while polling; the classification is stale.
            tracing::debug!("discarding late reconciliation result for {id}");
            return Ok(PurchaseOutcome::Cancelled);
        };

        match outcome {
            ReconcileOutcome::Completed(order) => {
                session.advance(SessionEvent::OrderCompleted)?;
                Ok(PurchaseOutcome::Completed(order))
            }
            ReconcileOutcome::Failed(order) => {
                session.advance(SessionEvent::OrderFailed)?;
                Ok(PurchaseOutcome::Failed(order))
            }
            ReconcileOutcome::TimedOut => Ok(PurchaseOutcome::TimedOut),
            ReconcileOutcome::Cancelled => Ok(PurchaseOutcome::Cancelled),
        }
    }

    /// Manual "verify now": one immediate classification attempt.
    pub async fn verify_now(&self, id: SessionId) -> Result<PurchaseOutcome> {
        self.await_confirmation(id, PollPolicy::verify_now()).await
    }

    /// Universal transition: cancels in-flight reconciliation and returns
    /// the session to `Select`. The on-chain transaction, if one was
    /// submitted, is unaffected; its order remains in the ledger.
    #[instrument(skip(self))]
    pub async fn reset(&self, id: SessionId) -> Result<()> {
        let mut slot = self.session.lock().await;
        let session = Self::expect_session(&mut slot, id)?;
        if let Some(pending) = &session.pending_order {
            self.reconciler.cancel(&pending.order_id).await;
        }
        session.clear();
        tracing::debug!("{id} reset to Select");
        Ok(())
    }

    /// Reacts to a wallet-side account or chain change by resetting the
    /// active session: a purchase negotiated for one signer must not
    /// continue under another.
    pub async fn handle_wallet_event(&self, event: WalletEvent) {
        tracing::debug!("wallet event: {event:?}");
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_mut()
            && session.is_active()
        {
            if let Some(pending) = &session.pending_order {
                self.reconciler.cancel(&pending.order_id).await;
            }
            tracing::warn!("resetting {} after wallet change", session.id);
            session.clear();
        }
    }

    /// Snapshot of the current session, if `id` still names it.
    pub async fn session(&self, id: SessionId) -> Option<PurchaseSession> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|s| s.id == id)
            .cloned()
    }

    /// Orders previously created for `wallet`, for the order-history view.
    pub async fn order_history(&self, wallet: &str) -> Result<Vec<Order>> {
        self.ledger.orders_for_wallet(wallet).await
    }

    pub fn network(&self) -> &NetworkInfo {
        &self.network
    }

    fn expect_session<'a>(
        slot: &'a mut Option<PurchaseSession>,
        id: SessionId,
    ) -> Result<&'a mut PurchaseSession> {
        match slot.as_mut() {
            Some(session) if session.id == id => Ok(session),
            _ => Err(PaymentError::InvalidState("unknown or stale session")),
        }
    }
}
