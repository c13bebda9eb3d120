//! Operator-facing review queue.
//!
//! [`ManualReviewQueue`] executes commands against the store. [`ReviewWorklist`] is the shared
//! operator view built on top of it: issuing a command only marks the row in-flight, and the row
//! leaves the list when the matching [`ReviewEvent`] confirms the store write.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::clock::Clock;
use super::domain::{DecisionSource, ModerationStatus, SubmissionId, SubmissionRecord};
use super::notify::NotificationDispatcher;
use super::pipeline::PipelineError;
use super::store::{SubmissionFilter, SubmissionStore, TransitionOutcome};
use super::transition::{finalize, TerminalAction};

/// Operator command against a single escalated submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommand {
    pub submission_id: SubmissionId,
    pub action: TerminalAction,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Applied,
    /// The item had already left `pending`; nothing was written.
    AlreadyTerminal,
}

/// Store-confirmed result of a [`ReviewCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub submission_id: SubmissionId,
    pub action: TerminalAction,
    pub outcome: ReviewOutcome,
    pub status: ModerationStatus,
}

/// Admin queue over escalated submissions.
pub struct ManualReviewQueue<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
}

impl<S, N> Clone for ManualReviewQueue<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, N> ManualReviewQueue<S, N>
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Escalated items still waiting for a reviewer, oldest first.
    pub fn pending(&self, limit: Option<usize>) -> Result<Vec<SubmissionRecord>, PipelineError> {
        let filter = SubmissionFilter {
            statuses: Some(vec![ModerationStatus::Pending]),
            requires_manual_review: Some(true),
            limit,
            ..SubmissionFilter::default()
        };
        Ok(self.store.query(&filter)?)
    }

    pub fn approve(&self, id: &SubmissionId, notes: &str) -> Result<ReviewEvent, PipelineError> {
        self.dispatch(ReviewCommand {
            submission_id: id.clone(),
            action: TerminalAction::Accept,
            notes: notes.to_string(),
        })
    }

    pub fn reject(&self, id: &SubmissionId, notes: &str) -> Result<ReviewEvent, PipelineError> {
        self.dispatch(ReviewCommand {
            submission_id: id.clone(),
            action: TerminalAction::Reject,
            notes: notes.to_string(),
        })
    }

    pub fn dispatch(&self, command: ReviewCommand) -> Result<ReviewEvent, PipelineError> {
        let outcome = finalize(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &command.submission_id,
            command.action,
            DecisionSource::Reviewer,
            command.notes,
            self.clock.now(),
        )?;

        let event = ReviewEvent {
            submission_id: command.submission_id,
            action: command.action,
            status: outcome.record().status,
            outcome: match outcome {
                TransitionOutcome::Applied(_) => ReviewOutcome::Applied,
                TransitionOutcome::AlreadyTerminal(_) => ReviewOutcome::AlreadyTerminal,
            },
        };
        Ok(event)
    }

    /// Bulk administrative reset. Returns the number of removed submissions.
    pub fn purge_all(&self) -> Result<usize, PipelineError> {
        let purged = self.store.purge_all()?;
        info!(purged, "submission store purged");
        Ok(purged)
    }
}

/// Row state in the operator view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorklistState {
    Awaiting,
    InFlight(TerminalAction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorklistRow {
    pub record: SubmissionRecord,
    pub state: WorklistState,
}

/// Operator view of the queue. Rows disappear only on confirmed events.
#[derive(Debug, Clone, Default)]
pub struct ReviewWorklist {
    rows: BTreeMap<SubmissionId, WorklistRow>,
}

impl ReviewWorklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fresh listing. In-flight rows keep their state; rows no longer listed drop out.
    pub fn refresh(&mut self, pending: Vec<SubmissionRecord>) {
        let mut rows = BTreeMap::new();
        for record in pending {
            let state = self
                .rows
                .get(&record.id)
                .map(|row| row.state)
                .unwrap_or(WorklistState::Awaiting);
            rows.insert(record.id.clone(), WorklistRow { record, state });
        }
        self.rows = rows;
    }

    /// Mark a row in-flight. `None` if the row is missing or a command is already running.
    pub fn begin(
        &mut self,
        id: &SubmissionId,
        action: TerminalAction,
        notes: impl Into<String>,
    ) -> Option<ReviewCommand> {
        let row = self.rows.get_mut(id)?;
        if row.state != WorklistState::Awaiting {
            return None;
        }
        row.state = WorklistState::InFlight(action);
        Some(ReviewCommand {
            submission_id: id.clone(),
            action,
            notes: notes.into(),
        })
    }

    /// Apply a store-confirmed event. Both outcomes mean the item is no longer pending.
    pub fn confirm(&mut self, event: &ReviewEvent) {
        self.rows.remove(&event.submission_id);
    }

    /// A command failed before the store confirmed anything; the row becomes actionable again.
    pub fn fail(&mut self, id: &SubmissionId) {
        if let Some(row) = self.rows.get_mut(id) {
            row.state = WorklistState::Awaiting;
        }
    }

    pub fn state(&self, id: &SubmissionId) -> Option<WorklistState> {
        self.rows.get(id).map(|row| row.state)
    }

    pub fn rows(&self) -> impl Iterator<Item = &WorklistRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
