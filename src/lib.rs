//! Client-side orchestration for on-chain catalog payments: a two-phase
//! token payment (spend approval, then execution) driven as an explicit
//! state machine, reconciled against a backend order ledger by bounded
//! polling.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::orchestrator::{PaymentOrchestrator, PurchaseOutcome};
pub use application::reconciler::{ConfirmationReconciler, PollPolicy, ReconcileOutcome};
pub use error::{PaymentError, Result};
