use super::common::*;
use crate::workflows::moderation::domain::{DecisionSource, ModerationStatus, SubmissionId};
use crate::workflows::moderation::notify::NotificationKind;
use crate::workflows::moderation::oracle::OracleVerdict;
use crate::workflows::moderation::pipeline::{PipelineError, ResultCode};
use crate::workflows::moderation::review::{ReviewOutcome, WorklistState};
use crate::workflows::moderation::transition::TerminalAction;

async fn escalated_offer(
    harness: &Harness<FixedOracle>,
    request_id: &SubmissionId,
    seller: &str,
) -> SubmissionId {
    let receipt = harness
        .pipeline
        .submit(offer_submission(seller, request_id))
        .await
        .expect("offer accepted");
    let id = receipt.record.id.clone();
    let report = receipt
        .moderated()
        .await
        .expect("moderated")
        .expect("report present");
    assert!(report.decision.is_escalation());
    harness.tick();
    id
}

#[tokio::test]
async fn double_approve_counts_the_offer_once() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let request = live_request(&harness, "buyer-1").await;
    let offer_id = escalated_offer(&harness, &request.id, "seller-1").await;
    let state = harness.state();

    let first = state.queue.approve(&offer_id, "looks good").expect("approved");
    assert_eq!(first.outcome, ReviewOutcome::Applied);
    assert_eq!(first.status, ModerationStatus::Approved);
    let notifications_after_first = harness.notifier.events().len();

    let second = state.queue.approve(&offer_id, "again").expect("no-op");
    assert_eq!(second.outcome, ReviewOutcome::AlreadyTerminal);

    assert_eq!(harness.record(&request.id).response_count, 1);
    assert_eq!(harness.notifier.events().len(), notifications_after_first);

    let offer = harness.record(&offer_id);
    assert!(offer.chat_enabled);
    assert_eq!(offer.moderation.moderator_notes, "looks good");
    assert_eq!(offer.moderation.decided_by, Some(DecisionSource::Reviewer));
}

#[tokio::test]
async fn each_approved_offer_counts_separately() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let request = live_request(&harness, "buyer-1").await;
    let first = escalated_offer(&harness, &request.id, "seller-1").await;
    let second = escalated_offer(&harness, &request.id, "seller-2").await;
    let state = harness.state();

    state.queue.approve(&first, "").expect("approved");
    state.queue.approve(&second, "").expect("approved");
    assert_eq!(harness.record(&request.id).response_count, 2);
}

#[tokio::test]
async fn terminal_state_never_changes() {
    let harness = harness(FixedOracle::new(OracleVerdict::Reject, 95));
    let receipt = harness
        .pipeline
        .submit(request_submission("buyer-1"))
        .await
        .expect("accepted");
    let id = receipt.record.id.clone();
    receipt.moderated().await.expect("moderated");
    assert_eq!(harness.record(&id).status, ModerationStatus::Rejected);

    let state = harness.state();
    let event = state.queue.approve(&id, "override").expect("no-op");
    assert_eq!(event.outcome, ReviewOutcome::AlreadyTerminal);
    assert_eq!(event.status, ModerationStatus::Rejected);

    let stored = harness.record(&id);
    assert_eq!(stored.status, ModerationStatus::Rejected);
    assert_eq!(stored.moderation.decided_by, Some(DecisionSource::Automated));
}

#[tokio::test]
async fn rejecting_a_request_notifies_without_counters() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let receipt = harness
        .pipeline
        .submit(request_submission("buyer-1"))
        .await
        .expect("accepted");
    let id = receipt.record.id.clone();
    receipt.moderated().await.expect("moderated");

    let state = harness.state();
    let event = state.queue.reject(&id, "prohibited item").expect("rejected");
    assert_eq!(event.outcome, ReviewOutcome::Applied);

    let stored = harness.record(&id);
    assert_eq!(stored.status, ModerationStatus::Rejected);
    assert_eq!(stored.moderation.moderator_notes, "prohibited item");
    assert_eq!(stored.response_count, 0);
    assert_eq!(stored.status_view().message, "Your request was not approved");

    let events = harness.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, NotificationKind::SubmissionRejected);
}

#[tokio::test]
async fn pending_lists_oldest_first_with_limit() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let mut ids = Vec::new();
    for (owner, category) in [("buyer-1", "Sports"), ("buyer-2", "Books"), ("buyer-3", "Garden")] {
        let mut submission = request_submission(owner);
        submission.content.category = category.to_string();
        let receipt = harness.pipeline.submit(submission).await.expect("accepted");
        ids.push(receipt.record.id.clone());
        receipt.moderated().await.expect("moderated");
        harness.tick();
    }

    let state = harness.state();
    let listed: Vec<SubmissionId> = state
        .queue
        .pending(Some(2))
        .expect("listed")
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(listed, ids[..2].to_vec());

    state.queue.approve(&ids[0], "").expect("approved");
    let remaining = state.queue.pending(None).expect("listed");
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn purge_all_clears_the_store() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    for owner in ["buyer-1", "buyer-2"] {
        let mut submission = request_submission(owner);
        submission.content.category = owner.to_string();
        harness.pipeline.submit(submission).await.expect("accepted");
    }

    let state = harness.state();
    assert_eq!(state.queue.purge_all().expect("purged"), 2);
    assert!(harness.store.is_empty());
}

#[test]
fn unknown_submission_is_not_found() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let state = harness.state();
    let error = state
        .queue
        .approve(&SubmissionId("req-404".to_string()), "")
        .expect_err("missing");
    assert!(matches!(error, PipelineError::NotFound));
    assert_eq!(error.code(), ResultCode::NotFound);
}

#[tokio::test]
async fn worklist_rows_leave_only_on_confirmed_events() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let request = live_request(&harness, "buyer-1").await;
    let offer_id = escalated_offer(&harness, &request.id, "seller-1").await;
    let state = harness.state();

    let mut worklist = worklist_from(state.queue.pending(None).expect("listed"));
    assert_eq!(worklist.len(), 1);

    let command = worklist
        .begin(&offer_id, TerminalAction::Accept, "ok")
        .expect("first click issues a command");
    assert!(worklist
        .begin(&offer_id, TerminalAction::Accept, "ok")
        .is_none());
    assert_eq!(
        worklist.state(&offer_id),
        Some(WorklistState::InFlight(TerminalAction::Accept))
    );

    worklist.refresh(state.queue.pending(None).expect("listed"));
    assert_eq!(
        worklist.state(&offer_id),
        Some(WorklistState::InFlight(TerminalAction::Accept))
    );

    let event = state.queue.dispatch(command).expect("dispatched");
    worklist.confirm(&event);
    assert!(worklist.is_empty());
    assert_eq!(harness.record(&request.id).response_count, 1);
}

#[tokio::test]
async fn failed_command_makes_row_actionable_again() {
    let harness = harness(FixedOracle::new(OracleVerdict::Uncertain, 40));
    let receipt = harness
        .pipeline
        .submit(request_submission("buyer-1"))
        .await
        .expect("accepted");
    let id = receipt.record.id.clone();
    receipt.moderated().await.expect("moderated");

    let state = harness.state();
    let mut worklist = worklist_from(state.queue.pending(None).expect("listed"));
    worklist
        .begin(&id, TerminalAction::Reject, "spam")
        .expect("command issued");
    worklist.fail(&id);
    assert_eq!(worklist.state(&id), Some(WorklistState::Awaiting));
    assert!(worklist.begin(&id, TerminalAction::Reject, "spam").is_some());
}
