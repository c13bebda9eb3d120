//! The single place where a submission leaves `pending`.
//!
//! Both the policy engine and the manual review queue go through [`finalize`], so side effects
//! (chat enablement, the parent request's response count, notifications) fire only for the
//! writer whose compare-and-swap actually applied.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    DecisionSource, ModerationStatus, SubmissionId, SubmissionKind, SubmissionRecord,
};
use super::notify::{dispatch, Notification, NotificationDispatcher, NotificationKind};
use super::store::{StatusTransition, StoreError, SubmissionStore, TransitionOutcome};

/// Direction of a terminal write, independent of submission kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalAction {
    Accept,
    Reject,
}

impl TerminalAction {
    pub const fn label(self) -> &'static str {
        match self {
            TerminalAction::Accept => "approve",
            TerminalAction::Reject => "reject",
        }
    }

    pub const fn status_for(self, kind: SubmissionKind) -> ModerationStatus {
        match self {
            TerminalAction::Accept => kind.accepted_status(),
            TerminalAction::Reject => ModerationStatus::Rejected,
        }
    }
}

pub(crate) fn finalize<S, N>(
    store: &S,
    notifier: &N,
    id: &SubmissionId,
    action: TerminalAction,
    source: DecisionSource,
    notes: String,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, StoreError>
where
    S: SubmissionStore + ?Sized,
    N: NotificationDispatcher + ?Sized,
{
    let current = store.get(id)?.ok_or(StoreError::NotFound)?;
    let to = action.status_for(current.kind);

    let outcome = store.transition(
        id,
        StatusTransition {
            to,
            source,
            notes,
            at,
            enable_chat: current.kind == SubmissionKind::Offer && to.is_accepted(),
        },
    )?;

    match &outcome {
        TransitionOutcome::Applied(record) => {
            info!(
                submission_id = %record.id,
                kind = record.kind.label(),
                status = record.status.label(),
                decided_by = ?source,
                "moderation decision applied"
            );
            apply_side_effects(store, notifier, record);
        }
        TransitionOutcome::AlreadyTerminal(record) => {
            info!(
                submission_id = %record.id,
                status = record.status.label(),
                attempted = action.label(),
                "submission already terminal; ignoring"
            );
            if record.kind == SubmissionKind::Offer && record.status.is_accepted() {
                count_response(store, record);
            }
        }
    }

    Ok(outcome)
}

fn apply_side_effects<S, N>(store: &S, notifier: &N, record: &SubmissionRecord)
where
    S: SubmissionStore + ?Sized,
    N: NotificationDispatcher + ?Sized,
{
    let kind = if record.status.is_accepted() {
        NotificationKind::SubmissionApproved
    } else {
        NotificationKind::SubmissionRejected
    };
    dispatch(notifier, notification_for(record, kind, record));

    if record.kind != SubmissionKind::Offer || !record.status.is_accepted() {
        return;
    }

    count_response(store, record);

    let Some(request_id) = &record.request_id else {
        return;
    };
    match store.get(request_id) {
        Ok(Some(request)) => {
            let mut buyer_chat = notification_for(&request, NotificationKind::NewChat, record);
            buyer_chat
                .details
                .insert("request_id".to_string(), request.id.to_string());
            dispatch(notifier, buyer_chat);
            dispatch(
                notifier,
                notification_for(record, NotificationKind::NewChat, record),
            );
        }
        Ok(None) => warn!(%request_id, offer_id = %record.id, "parent request missing"),
        Err(err) => warn!(%request_id, error = %err, "could not load parent request"),
    }
}

/// Idempotent per (request, offer); safe to repeat after a partial failure.
fn count_response<S>(store: &S, offer: &SubmissionRecord)
where
    S: SubmissionStore + ?Sized,
{
    let Some(request_id) = &offer.request_id else {
        return;
    };
    match store.increment_response_count(request_id, &offer.id) {
        Ok(true) => info!(%request_id, offer_id = %offer.id, "response counted"),
        Ok(false) => {}
        Err(err) => warn!(
            %request_id,
            offer_id = %offer.id,
            error = %err,
            "response count not updated"
        ),
    }
}

fn notification_for(
    recipient: &SubmissionRecord,
    kind: NotificationKind,
    subject: &SubmissionRecord,
) -> Notification {
    let mut details = BTreeMap::new();
    details.insert("kind".to_string(), subject.kind.label().to_string());
    details.insert("status".to_string(), subject.status.label().to_string());
    details.insert("title".to_string(), subject.content.title.clone());
    Notification {
        user_id: recipient.owner_id.clone(),
        kind,
        submission_id: subject.id.clone(),
        details,
    }
}
