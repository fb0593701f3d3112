use std::fmt;

use crate::domain::order::OrderId;
use crate::domain::product::{Amount, Product};
use crate::error::{PaymentError, Result};

/// Client-local handle for one purchase session. Ids are never reused
/// within a process, so a stale handle can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurchaseStep {
    #[default]
    Select,
    Approve,
    Pay,
    Verifying,
    Complete,
    Failed,
}

/// Inputs to the purchase state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ProductSelected,
    ApprovalConfirmed,
    PaymentSubmitted,
    OrderCompleted,
    OrderFailed,
    Reset,
}

impl PurchaseStep {
    /// The pure transition function of the purchase state machine.
    ///
    /// `Reset` is the only universal transition; every other event is legal
    /// from exactly one step. Illegal pairs are contract violations, not
    /// user-facing conditions.
    pub fn apply(self, event: SessionEvent) -> Result<PurchaseStep> {
        match (self, event) {
            (_, SessionEvent::Reset) => Ok(Self::Select),
            (Self::Select, SessionEvent::ProductSelected) => Ok(Self::Approve),
            (Self::Approve, SessionEvent::ApprovalConfirmed) => Ok(Self::Pay),
            (Self::Pay, SessionEvent::PaymentSubmitted) => Ok(Self::Verifying),
            (Self::Verifying, SessionEvent::OrderCompleted) => Ok(Self::Complete),
            (Self::Verifying, SessionEvent::OrderFailed) => Ok(Self::Failed),
            _ => Err(PaymentError::InvalidState(
                "event not legal for current purchase step",
            )),
        }
    }

    /// Steps holding wallet-side work in flight. At most one session per
    /// connected wallet may sit in an active step.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Approve | Self::Pay | Self::Verifying)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// The slice of the server order a session needs to keep: the idempotency
/// key and the authoritative amount.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub amount: Amount,
}

/// Ephemeral client-side state for one purchase attempt.
///
/// Intentionally not persisted: the server-side order is the durable
/// record, recoverable through order history and manual verification.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseSession {
    pub id: SessionId,
    pub product: Product,
    pub step: PurchaseStep,
    pub pending_order: Option<PendingOrder>,
    pub tx_hash: Option<String>,
}

impl PurchaseSession {
    pub fn new(id: SessionId, product: Product) -> Self {
        Self {
            id,
            product,
            step: PurchaseStep::Select,
            pending_order: None,
            tx_hash: None,
        }
    }

    /// Applies an event to the session's step, leaving other fields alone.
    pub fn advance(&mut self, event: SessionEvent) -> Result<()> {
        self.step = self.step.apply(event)?;
        Ok(())
    }

    /// Universal transition back to `Select`, dropping all per-attempt
    /// state. The server order, if one was created, lives on untouched.
    pub fn clear(&mut self) {
        self.step = PurchaseStep::Select;
        self.pending_order = None;
        self.tx_hash = None;
    }

    pub fn is_active(&self) -> bool {
        self.step.is_active()
    }
}
