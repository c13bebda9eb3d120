use crate::workflows::moderation::domain::{ModerationStatus, SubmissionId};
use crate::workflows::moderation::idempotency::{
    FlowGate, FlowState, IdempotencyKey, IdempotencyLedger, SubmissionFlow,
};
use crate::workflows::moderation::payments::PaymentReceipt;

fn receipt() -> PaymentReceipt {
    PaymentReceipt {
        transaction_id: "txn-1".to_string(),
        amount: 99,
    }
}

#[test]
fn double_click_is_silently_blocked() {
    let mut flow = SubmissionFlow::with_key(IdempotencyKey("k-1".to_string()), false);

    assert_eq!(
        flow.begin_submit(),
        FlowGate::Proceed(IdempotencyKey("k-1".to_string()))
    );
    assert_eq!(flow.begin_submit(), FlowGate::Blocked);
    assert_eq!(flow.state(), &FlowState::Submitting);
}

#[test]
fn free_flow_walks_to_terminal() {
    let mut flow = SubmissionFlow::new(false);
    assert!(matches!(flow.begin_submit(), FlowGate::Proceed(_)));

    let id = SubmissionId("req-000010".to_string());
    flow.persisted(id.clone()).expect("persisted");
    assert!(flow.is_committed());
    flow.awaiting_decision().expect("awaiting");
    flow.settle(ModerationStatus::Live).expect("settled");
    flow.settle(ModerationStatus::Live).expect("repeat is a no-op");

    assert_eq!(
        flow.state(),
        &FlowState::Terminal {
            submission_id: id,
            status: ModerationStatus::Live,
        }
    );
    assert!(flow.settle(ModerationStatus::Rejected).is_err());
    assert_eq!(flow.begin_submit(), FlowGate::Blocked);
}

#[test]
fn paid_flow_charges_once() {
    let mut flow = SubmissionFlow::new(true);
    assert!(matches!(flow.begin_submit(), FlowGate::Proceed(_)));
    assert_eq!(flow.state(), &FlowState::AwaitingPayment);

    assert!(matches!(flow.begin_payment(), FlowGate::Proceed(_)));
    assert_eq!(flow.state(), &FlowState::Paying);
    flow.payment_confirmed(receipt()).expect("confirmed");
    assert_eq!(flow.begin_payment(), FlowGate::Blocked);
    assert_eq!(flow.state(), &FlowState::Submitting);
    assert_eq!(flow.payment().map(|receipt| receipt.amount), Some(99));
}

#[test]
fn failure_before_commit_allows_retry_with_same_key() {
    let mut flow = SubmissionFlow::new(false);
    let key = flow.key().clone();
    assert!(matches!(flow.begin_submit(), FlowGate::Proceed(_)));
    flow.failed();
    assert_eq!(flow.state(), &FlowState::Idle);
    assert_eq!(flow.begin_submit(), FlowGate::Proceed(key));
}

#[test]
fn failure_after_commit_changes_nothing() {
    let mut flow = SubmissionFlow::new(false);
    flow.begin_submit();
    flow.persisted(SubmissionId("req-000011".to_string()))
        .expect("persisted");
    flow.failed();
    assert!(flow.is_committed());
    assert_eq!(flow.state().label(), "persisted");
    assert_eq!(flow.begin_submit(), FlowGate::Blocked);
}

#[test]
fn illegal_transitions_report_state() {
    let mut flow = SubmissionFlow::new(false);
    let error = flow
        .persisted(SubmissionId("req-000012".to_string()))
        .expect_err("not submitting yet");
    assert_eq!(error.state, "idle");
    assert!(flow.settle(ModerationStatus::Pending).is_err());
}

#[test]
fn ledger_claims_are_exclusive_and_released_on_drop() {
    let ledger = IdempotencyLedger::default();
    let key = IdempotencyKey("k-9".to_string());

    let claim = ledger.claim(&key).expect("first claim");
    assert!(ledger.is_in_flight(&key));
    assert!(ledger.claim(&key).is_none());

    drop(claim);
    assert!(!ledger.is_in_flight(&key));
    assert!(ledger.claim(&key).is_some());
}

#[test]
fn generated_keys_are_unique() {
    let a = IdempotencyKey::generate();
    let b = IdempotencyKey::generate();
    assert_ne!(a, b);
    assert!(a.0.starts_with("idem-"));
}

#[test]
fn second_pay_click_is_blocked_while_charge_is_outstanding() {
    let mut flow = SubmissionFlow::new(true);
    assert!(matches!(flow.begin_submit(), FlowGate::Proceed(_)));

    assert!(matches!(flow.begin_payment(), FlowGate::Proceed(_)));
    assert_eq!(flow.begin_payment(), FlowGate::Blocked);
    assert_eq!(flow.begin_submit(), FlowGate::Blocked);
    assert_eq!(flow.state().label(), "paying");
}

#[test]
fn failed_charge_can_be_retried_once_more() {
    let mut flow = SubmissionFlow::new(true);
    flow.begin_submit();
    assert!(matches!(flow.begin_payment(), FlowGate::Proceed(_)));

    flow.failed();
    assert_eq!(flow.state(), &FlowState::AwaitingPayment);
    assert!(flow.payment().is_none());

    assert!(matches!(flow.begin_payment(), FlowGate::Proceed(_)));
    assert_eq!(flow.begin_payment(), FlowGate::Blocked);
    flow.payment_confirmed(receipt()).expect("confirmed");
    assert_eq!(flow.state(), &FlowState::Submitting);
}
