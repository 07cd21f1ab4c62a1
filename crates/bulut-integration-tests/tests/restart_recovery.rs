//! Integration test: in-flight executions survive a restart.
//!
//! 1. A transfer is submitted but not yet settled when execute returns
//! 2. A new coordinator is built over the same ledger and gateway
//! 3. recover() confirms it without submitting again

use bulut_execution::gateway::SimulatedGateway;
use bulut_integration_tests::{Harness, Wallet};
use bulut_types::execution::ExecutionStatus;

#[tokio::test]
async fn test_recover_after_restart() {
    let before = Harness::with_gateway(SimulatedGateway::new().with_settle_after(4));
    before.register("@alice");
    let me = Wallet::new();
    let intent = before.validate(serde_json::json!({
        "id": "int_rent",
        "type": "single",
        "amount": "1200",
        "currency": "USD",
        "sender": me.address.to_string(),
        "recipients": [{"handle": "@alice"}],
    }));

    let exec = before.coordinator.execute(&intent).await.expect("execute");
    assert_eq!(exec.status, ExecutionStatus::Submitted);
    assert_eq!(before.gateway.submit_calls(), 1);

    let after = Harness::over_ledger(
        before.ledger.clone(),
        before.gateway.clone(),
        before.clock.clone(),
    );
    let recovered = after.coordinator.recover().await.expect("recover");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].id, exec.id);
    assert_eq!(recovered[0].status, ExecutionStatus::Confirmed);
    assert_eq!(after.gateway.submit_calls(), 1);

    // Executing the same intent again returns the settled record.
    let again = after.coordinator.execute(&intent).await.expect("repeat");
    assert_eq!(again.id, exec.id);
    assert_eq!(again.status, ExecutionStatus::Confirmed);
    assert!(after.coordinator.recover().await.expect("recover").is_empty());
}
