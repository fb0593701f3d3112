mod common;

use std::sync::Arc;
use std::time::Duration;

use chainpay::domain::order::OrderStatus;
use chainpay::domain::ports::WalletConnector;
use chainpay::domain::session::PurchaseStep;
use chainpay::{ConfirmationReconciler, PollPolicy, ReconcileOutcome};

use common::{harness, product};

#[tokio::test(start_paused = true)]
async fn test_reconciler_against_live_ledger() {
    let h = harness(1_000, 50);

    let id = h.orchestrator.start_purchase(product("prod-1", 50)).await.unwrap();
    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.pay(id).await.unwrap();
    let order_id = h
        .orchestrator
        .session(id)
        .await
        .unwrap()
        .pending_order
        .unwrap()
        .order_id;

    // Drive the reconciler directly, the way a standalone order-status
    // widget would, while the backend settles the order.
    let reconciler = ConfirmationReconciler::new(h.ledger.clone());
    tokio::spawn({
        let ledger = h.ledger.clone();
        let order_id = order_id.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            ledger.advance(&order_id, OrderStatus::Completed).await.unwrap();
        }
    });

    let outcome = reconciler
        .await_completion(&order_id, PollPolicy::new(20, Duration::from_millis(10)))
        .await
        .unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Completed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_single_flight_supersedes_across_callers() {
    let h = harness(1_000, 50);

    let id = h.orchestrator.start_purchase(product("prod-1", 50)).await.unwrap();
    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.pay(id).await.unwrap();
    let order_id = h
        .orchestrator
        .session(id)
        .await
        .unwrap()
        .pending_order
        .unwrap()
        .order_id;

    let reconciler = Arc::new(ConfirmationReconciler::new(h.ledger.clone()));
    let first = tokio::spawn({
        let reconciler = reconciler.clone();
        let order_id = order_id.clone();
        async move {
            reconciler
                .await_completion(&order_id, PollPolicy::new(1_000, Duration::from_millis(10)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    // A second caller takes over the same order id.
    let second = reconciler
        .await_completion(&order_id, PollPolicy::new(2, Duration::from_millis(10)))
        .await
        .unwrap();

    assert_eq!(first.await.unwrap().unwrap(), ReconcileOutcome::Cancelled);
    assert_eq!(second, ReconcileOutcome::TimedOut);
}

#[tokio::test]
async fn test_wallet_account_change_resets_session() {
    let h = harness(1_000, 50);

    let id = h.orchestrator.start_purchase(product("prod-1", 50)).await.unwrap();
    h.orchestrator.approve(id).await.unwrap();

    // Wire the connector's notification stream to the orchestrator the way
    // an embedding application would.
    let mut events = h.wallet.subscribe();
    h.wallet.switch_account(Some("0xsomeoneelse".to_string()));
    let event = events.recv().await.unwrap();
    h.orchestrator.handle_wallet_event(event).await;

    let session = h.orchestrator.session(id).await.unwrap();
    assert_eq!(session.step, PurchaseStep::Select);
    assert!(session.pending_order.is_none());

    // The new account can start its own purchase.
    assert!(
        h.orchestrator
            .start_purchase(product("prod-1", 50))
            .await
            .is_ok()
    );
}

#[tokio::test(start_paused = true)]
async fn test_polling_is_bounded_in_time() {
    let h = harness(1_000, 50);

    let id = h.orchestrator.start_purchase(product("prod-1", 50)).await.unwrap();
    h.orchestrator.approve(id).await.unwrap();
    h.orchestrator.pay(id).await.unwrap();

    let policy = PollPolicy::new(5, Duration::from_millis(10));
    let started = tokio::time::Instant::now();
    let outcome = h.orchestrator.await_confirmation(id, policy).await.unwrap();

    assert_eq!(outcome, chainpay::PurchaseOutcome::TimedOut);
    // Five attempts, four inter-poll waits: the loop never outlives its
    // budget.
    assert!(started.elapsed() <= Duration::from_millis(5 * 10));
}
