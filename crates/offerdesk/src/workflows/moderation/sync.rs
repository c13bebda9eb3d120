//! Submitter-side status synchronization.
//!
//! A watcher follows one submission through a push subscription with a polling fallback.
//! Both feed the same [`Reconciler`], so however many times the terminal state is observed,
//! [`ClientEffects::on_terminal`] fires once and both strategies stop together.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::domain::{
    ModerationStatus, SubmissionId, SubmissionKind, SubmissionRecord, SubmissionStatusView,
};
use super::store::SubmissionStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where the client should go once moderation settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    LiveRequests,
    MyResponses,
    Dashboard,
}

impl Navigation {
    pub const fn path(self) -> &'static str {
        match self {
            Navigation::LiveRequests => "/enquiries",
            Navigation::MyResponses => "/my-responses",
            Navigation::Dashboard => "/dashboard",
        }
    }

    pub const fn for_outcome(kind: SubmissionKind, status: ModerationStatus) -> Self {
        match (kind, status.is_accepted()) {
            (SubmissionKind::Request, true) => Navigation::LiveRequests,
            (SubmissionKind::Offer, true) => Navigation::MyResponses,
            (_, false) => Navigation::Dashboard,
        }
    }
}

/// What the client shows when the submission reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutcome {
    pub submission_id: SubmissionId,
    pub kind: SubmissionKind,
    pub status: ModerationStatus,
    pub message: String,
    pub navigate_to: Navigation,
}

/// Client-side reactions driven by the synchronizer.
pub trait ClientEffects: Send + 'static {
    /// Non-terminal status change (for example "Pending manual review").
    fn on_status(&mut self, _view: &SubmissionStatusView) {}

    /// Called exactly once per watched submission.
    fn on_terminal(&mut self, outcome: &TerminalOutcome);
}

/// Result of feeding one observation into the [`Reconciler`].
#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    /// Nothing new, or the watcher already settled.
    Ignored,
    Progress(SubmissionStatusView),
    Terminal(TerminalOutcome),
}

/// Single reconciliation point for push and poll observations. `merge` is idempotent.
#[derive(Debug, Clone)]
pub struct Reconciler {
    submission_id: SubmissionId,
    last_view: Option<SubmissionStatusView>,
    observed: Vec<ModerationStatus>,
    terminal: Option<TerminalOutcome>,
}

impl Reconciler {
    pub fn new(submission_id: SubmissionId) -> Self {
        Self {
            submission_id,
            last_view: None,
            observed: Vec::new(),
            terminal: None,
        }
    }

    pub fn merge(&mut self, record: &SubmissionRecord) -> Merge {
        if self.terminal.is_some() || record.id != self.submission_id {
            return Merge::Ignored;
        }

        let view = record.status_view();
        if self.last_view.as_ref() == Some(&view) {
            return Merge::Ignored;
        }

        if self.observed.last() != Some(&record.status) {
            self.observed.push(record.status);
        }
        self.last_view = Some(view.clone());

        if !record.status.is_terminal() {
            return Merge::Progress(view);
        }

        let outcome = TerminalOutcome {
            submission_id: record.id.clone(),
            kind: record.kind,
            status: record.status,
            message: view.message,
            navigate_to: Navigation::for_outcome(record.kind, record.status),
        };
        self.terminal = Some(outcome.clone());
        Merge::Terminal(outcome)
    }

    pub fn is_settled(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal(&self) -> Option<&TerminalOutcome> {
        self.terminal.as_ref()
    }

    pub fn observed(&self) -> &[ModerationStatus] {
        &self.observed
    }
}

/// Why a watcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStop {
    Terminal,
    Cancelled,
    GaveUp,
    /// The submission disappeared from the store.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub submission_id: SubmissionId,
    pub outcome: Option<TerminalOutcome>,
    pub observed: Vec<ModerationStatus>,
    pub polls: u32,
    pub stop: SyncStop,
}

/// Owner of one running watcher. Dropping it cancels the watcher.
#[derive(Debug)]
pub struct SyncHandle {
    token: CancellationToken,
    task: Option<JoinHandle<SyncReport>>,
}

impl SyncHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the watcher to stop on its own (terminal state, give-up, or cancel).
    pub async fn finished(mut self) -> Result<SyncReport, JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(SyncReport {
                submission_id: SubmissionId(String::new()),
                outcome: None,
                observed: Vec::new(),
                polls: 0,
                stop: SyncStop::Cancelled,
            }),
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns per-submission watchers against a store.
pub struct StatusSynchronizer<S> {
    store: Arc<S>,
    poll_interval: Duration,
    give_up_after: Option<Duration>,
}

impl<S> Clone for StatusSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            poll_interval: self.poll_interval,
            give_up_after: self.give_up_after,
        }
    }
}

impl<S> StatusSynchronizer<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>, poll_interval: Duration) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };
        Self {
            store,
            poll_interval,
            give_up_after: None,
        }
    }

    pub fn with_give_up_after(mut self, limit: Duration) -> Self {
        self.give_up_after = Some(limit);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn watch<E>(&self, submission_id: SubmissionId, effects: E) -> SyncHandle
    where
        E: ClientEffects,
    {
        let token = CancellationToken::new();
        let watcher = Watcher {
            store: Arc::clone(&self.store),
            reconciler: Reconciler::new(submission_id.clone()),
            submission_id,
            effects,
            polls: 0,
            token: token.clone(),
        };
        let task = tokio::spawn(watcher.run(self.poll_interval, self.give_up_after));
        SyncHandle {
            token,
            task: Some(task),
        }
    }
}

enum Event {
    Cancelled,
    GaveUp,
    Pushed(Option<SubmissionRecord>),
    Tick,
}

struct Watcher<S, E> {
    store: Arc<S>,
    submission_id: SubmissionId,
    reconciler: Reconciler,
    effects: E,
    polls: u32,
    token: CancellationToken,
}

impl<S, E> Watcher<S, E>
where
    S: SubmissionStore + 'static,
    E: ClientEffects,
{
    async fn run(mut self, poll_interval: Duration, give_up_after: Option<Duration>) -> SyncReport {
        let mut subscription = match self.store.subscribe(&self.submission_id) {
            Ok(mut receiver) => {
                let current = receiver.borrow_and_update().clone();
                self.apply(&current);
                Some(receiver)
            }
            Err(err) => {
                warn!(
                    submission_id = %self.submission_id,
                    error = %err,
                    "status subscription unavailable; polling"
                );
                if let Some(stop) = self.fetch_once() {
                    return self.finish(stop);
                }
                None
            }
        };

        if self.reconciler.is_settled() {
            return self.finish(SyncStop::Terminal);
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = give_up_after.map(|limit| Instant::now() + limit);
        let give_up = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(give_up);

        let token = self.token.clone();
        let stop = loop {
            let event = tokio::select! {
                _ = token.cancelled() => Event::Cancelled,
                _ = &mut give_up => Event::GaveUp,
                change = next_change(&mut subscription) => Event::Pushed(change),
                _ = ticker.tick() => Event::Tick,
            };

            match event {
                Event::Cancelled => break SyncStop::Cancelled,
                Event::GaveUp => break SyncStop::GaveUp,
                Event::Pushed(Some(record)) => self.apply(&record),
                Event::Pushed(None) => {
                    warn!(
                        submission_id = %self.submission_id,
                        "status subscription closed; falling back to polling"
                    );
                    subscription = None;
                    if let Some(stop) = self.fetch_once() {
                        break stop;
                    }
                }
                Event::Tick => {
                    self.polls += 1;
                    debug!(submission_id = %self.submission_id, polls = self.polls, "status poll");
                    if let Some(stop) = self.fetch_once() {
                        break stop;
                    }
                }
            }

            if self.reconciler.is_settled() {
                break SyncStop::Terminal;
            }
        };

        self.finish(stop)
    }

    /// One-shot read used by polling and subscription fallback. `Some` means stop.
    fn fetch_once(&mut self) -> Option<SyncStop> {
        match self.store.get(&self.submission_id) {
            Ok(Some(record)) => {
                self.apply(&record);
                self.reconciler.is_settled().then_some(SyncStop::Terminal)
            }
            Ok(None) => Some(SyncStop::Missing),
            Err(err) => {
                warn!(submission_id = %self.submission_id, error = %err, "status poll failed");
                None
            }
        }
    }

    fn apply(&mut self, record: &SubmissionRecord) {
        match self.reconciler.merge(record) {
            Merge::Ignored => {}
            Merge::Progress(view) => self.effects.on_status(&view),
            Merge::Terminal(outcome) => {
                info!(
                    submission_id = %outcome.submission_id,
                    status = outcome.status.label(),
                    navigate_to = outcome.navigate_to.path(),
                    "submission settled"
                );
                self.effects.on_terminal(&outcome);
            }
        }
    }

    fn finish(self, stop: SyncStop) -> SyncReport {
        self.token.cancel();
        SyncReport {
            submission_id: self.submission_id,
            outcome: self.reconciler.terminal().cloned(),
            observed: self.reconciler.observed().to_vec(),
            polls: self.polls,
            stop,
        }
    }
}

async fn next_change(
    subscription: &mut Option<watch::Receiver<SubmissionRecord>>,
) -> Option<SubmissionRecord> {
    match subscription {
        Some(receiver) => match receiver.changed().await {
            Ok(()) => Some(receiver.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
