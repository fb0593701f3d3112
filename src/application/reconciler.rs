use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::LedgerRef;
use crate::error::{PaymentError, Result};

/// Retry budget for one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_millis(3000),
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Single immediate classification, used by the manual "verify now"
    /// action.
    pub fn verify_now() -> Self {
        Self {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Final classification of a reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The order reached `Completed` on chain.
    Completed(Order),
    /// The order reached `Failed` or `Expired`. Non-recoverable for this
    /// order id; a new purchase must create a new order.
    Failed(Order),
    /// The attempt budget ran out while the order was still in flight. The
    /// order may yet complete; callers should route to order history rather
    /// than report a definite failure.
    TimedOut,
    /// The run was cancelled before reaching a classification. The
    /// underlying on-chain transaction is unaffected.
    Cancelled,
}

/// Polls the order ledger until a locally initiated payment reaches a
/// terminal, observable outcome.
///
/// Runs are single-flight per order id: starting a run for an order that is
/// already being polled cancels the previous loop first. Poll attempts
/// within a run are strictly sequential.
pub struct ConfirmationReconciler {
    ledger: LedgerRef,
    in_flight: Mutex<HashMap<OrderId, (u64, CancellationToken)>>,
    generation: std::sync::atomic::AtomicU64,
}

impl ConfirmationReconciler {
    pub fn new(ledger: LedgerRef) -> Self {
        Self {
            ledger,
            in_flight: Mutex::new(HashMap::new()),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Polls `get_order` until a terminal status, cancellation, or attempt
    /// exhaustion.
    ///
    /// Transport errors on single attempts are transient: they are logged,
    /// consume one attempt, and the loop continues. Only an unknown order
    /// id is a hard error.
    #[instrument(skip(self, policy), fields(max_attempts = policy.max_attempts))]
    pub async fn await_completion(
        &self,
        order_id: &OrderId,
        policy: PollPolicy,
    ) -> Result<ReconcileOutcome> {
        let (generation, token) = self.register(order_id).await;
        let outcome = self.poll(order_id, policy, &token).await;
        self.deregister(order_id, generation).await;
        outcome
    }

    /// Cancels the in-flight run for `order_id`, if any. The eventual late
    /// response of the cancelled loop is discarded by its caller.
    pub async fn cancel(&self, order_id: &OrderId) {
        if let Some((_, token)) = self.in_flight.lock().await.remove(order_id) {
            tracing::debug!("cancelling reconciliation for {order_id}");
            token.cancel();
        }
    }

    async fn poll(
        &self,
        order_id: &OrderId,
        policy: PollPolicy,
        token: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        for attempt in 1..=policy.max_attempts {
            let lookup = tokio::select! {
                _ = token.cancelled() => return Ok(ReconcileOutcome::Cancelled),
                lookup = self.ledger.get_order(order_id) => lookup,
            };

            match lookup {
                Ok(order) => match order.status {
                    OrderStatus::Completed => {
                        tracing::debug!("order {order_id} completed after {attempt} attempts");
                        return Ok(ReconcileOutcome::Completed(order));
                    }
                    OrderStatus::Failed | OrderStatus::Expired => {
                        tracing::debug!("order {order_id} terminal: {:?}", order.status);
                        return Ok(ReconcileOutcome::Failed(order));
                    }
                    OrderStatus::Pending | OrderStatus::Processing => {}
                },
                Err(PaymentError::OrderNotFound(id)) => {
                    return Err(PaymentError::OrderNotFound(id));
                }
                // Transient; consumed by the attempt budget.
                Err(err) => {
                    tracing::warn!("poll attempt {attempt} for {order_id} failed: {err}");
                }
            }

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = token.cancelled() => return Ok(ReconcileOutcome::Cancelled),
                    _ = tokio::time::sleep(policy.interval) => {}
                }
            }
        }

        tracing::debug!("order {order_id} still unresolved after {} attempts", policy.max_attempts);
        Ok(ReconcileOutcome::TimedOut)
    }

    async fn register(&self, order_id: &OrderId) -> (u64, CancellationToken) {
        let mut in_flight = self.in_flight.lock().await;
        if let Some((_, prior)) = in_flight.remove(order_id) {
            tracing::debug!("superseding in-flight reconciliation for {order_id}");
            prior.cancel();
        }
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let token = CancellationToken::new();
        in_flight.insert(order_id.clone(), (generation, token.clone()));
        (generation, token)
    }

    async fn deregister(&self, order_id: &OrderId, generation: u64) {
        let mut in_flight = self.in_flight.lock().await;
        // A superseding run may already own this slot.
        if let Some((current, _)) = in_flight.get(order_id)
            && *current == generation
        {
            in_flight.remove(order_id);
        }
    }
}
