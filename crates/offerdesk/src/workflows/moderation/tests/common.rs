use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tokio::sync::{watch, Notify};

use crate::workflows::moderation::clock::ManualClock;
use crate::workflows::moderation::domain::{
    NewSubmission, PaymentDetails, SubmissionContent, SubmissionId, SubmissionKind,
    SubmissionRecord, SubmissionStatusView, SubmitterTier, TrustContext, UserId,
};
use crate::workflows::moderation::idempotency::IdempotencyKey;
use crate::workflows::moderation::notify::{Notification, NotificationDispatcher, NotifyError};
use crate::workflows::moderation::oracle::{
    OracleAssessment, OracleError, OracleVerdict, ScoringOracle,
};
use crate::workflows::moderation::payments::{
    ChargeRequest, PaymentError, PaymentGateway, PaymentReceipt,
};
use crate::workflows::moderation::pipeline::{ModerationPipeline, PipelineOptions};
use crate::workflows::moderation::store::{
    Created, MemorySubmissionStore, StatusTransition, StoreError, SubmissionFilter,
    SubmissionPatch, SubmissionStore, TransitionOutcome,
};
use crate::workflows::moderation::sync::{ClientEffects, TerminalOutcome};
use crate::workflows::moderation::{ModerationState, ReviewWorklist};

pub(super) const BIKE_TITLE: &str = "Need a used mountain bike for weekend trails";
pub(super) const BIKE_DESCRIPTION: &str = "Looking for a sturdy hardtail with front suspension, \
hydraulic disc brakes, medium frame size, tubeless ready wheels, recently serviced drivetrain \
and no cracks anywhere on the frame";

pub(super) fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub(super) fn content(title: &str, description: &str) -> SubmissionContent {
    SubmissionContent {
        title: title.to_string(),
        description: description.to_string(),
        category: "Sports".to_string(),
        price: 30_000,
        notes: String::new(),
        media: Vec::new(),
        location: Some("Pune".to_string()),
    }
}

pub(super) fn free_trust() -> TrustContext {
    TrustContext {
        submitter_verified: false,
        submitter_tier: SubmitterTier::Free,
    }
}

pub(super) fn verified_trust() -> TrustContext {
    TrustContext {
        submitter_verified: true,
        submitter_tier: SubmitterTier::Free,
    }
}

pub(super) fn request_submission(owner: &str) -> NewSubmission {
    NewSubmission {
        kind: SubmissionKind::Request,
        owner_id: UserId(owner.to_string()),
        request_id: None,
        content: content(BIKE_TITLE, BIKE_DESCRIPTION),
        trust: free_trust(),
        payment: None,
        idempotency_key: None,
    }
}

pub(super) fn offer_submission(owner: &str, request_id: &SubmissionId) -> NewSubmission {
    NewSubmission {
        kind: SubmissionKind::Offer,
        owner_id: UserId(owner.to_string()),
        request_id: Some(request_id.clone()),
        content: content(
            "Trek hardtail, medium frame",
            "Serviced last month, hydraulic brakes, tubeless wheels, ready to ride",
        ),
        trust: free_trust(),
        payment: None,
        idempotency_key: None,
    }
}

pub(super) fn paid_request_submission(owner: &str) -> NewSubmission {
    let mut submission = request_submission(owner);
    submission.trust.submitter_tier = SubmitterTier::Paid;
    submission.payment = Some(PaymentDetails {
        amount: 99,
        payer_reference: "card-4242".to_string(),
    });
    submission.idempotency_key = Some(IdempotencyKey("paid-key-1".to_string()));
    submission
}

/// Oracle returning a fixed answer and counting calls.
pub(super) struct FixedOracle {
    assessment: OracleAssessment,
    calls: AtomicUsize,
}

impl FixedOracle {
    pub(super) fn new(verdict: OracleVerdict, confidence: u8) -> Self {
        Self {
            assessment: OracleAssessment::new(verdict, confidence, "fixed"),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringOracle for FixedOracle {
    async fn score(
        &self,
        _content: &SubmissionContent,
        _trust: &TrustContext,
    ) -> Result<OracleAssessment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.assessment.clone())
    }
}

/// Oracle that never answers within any sane deadline.
pub(super) struct SilentOracle;

#[async_trait]
impl ScoringOracle for SilentOracle {
    async fn score(
        &self,
        _content: &SubmissionContent,
        _trust: &TrustContext,
    ) -> Result<OracleAssessment, OracleError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(OracleAssessment::new(OracleVerdict::Approve, 99, "late"))
    }
}

/// Oracle that holds its answer until released.
#[derive(Default)]
pub(super) struct GatedOracle {
    pub(super) release: Notify,
}

#[async_trait]
impl ScoringOracle for GatedOracle {
    async fn score(
        &self,
        _content: &SubmissionContent,
        _trust: &TrustContext,
    ) -> Result<OracleAssessment, OracleError> {
        self.release.notified().await;
        Ok(OracleAssessment::new(OracleVerdict::Approve, 99, "released"))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("push service down".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingGateway {
    charges: Mutex<Vec<ChargeRequest>>,
    decline: bool,
}

impl RecordingGateway {
    pub(super) fn declining() -> Self {
        Self {
            charges: Mutex::new(Vec::new()),
            decline: true,
        }
    }

    pub(super) fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().expect("gateway mutex poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentReceipt, PaymentError> {
        let mut charges = self.charges.lock().expect("gateway mutex poisoned");
        if self.decline {
            return Err(PaymentError::Declined("insufficient funds".to_string()));
        }
        charges.push(request.clone());
        Ok(PaymentReceipt {
            transaction_id: format!("txn-{}", charges.len()),
            amount: request.amount,
        })
    }
}

pub(super) struct Harness<O> {
    pub(super) pipeline: ModerationPipeline<MemorySubmissionStore, RecordingNotifier>,
    pub(super) store: Arc<MemorySubmissionStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) oracle: Arc<O>,
    pub(super) gateway: Arc<RecordingGateway>,
    pub(super) clock: ManualClock,
}

pub(super) fn harness<O>(oracle: O) -> Harness<O>
where
    O: ScoringOracle + 'static,
{
    harness_with(oracle, RecordingGateway::default(), PipelineOptions::default())
}

pub(super) fn harness_with<O>(
    oracle: O,
    gateway: RecordingGateway,
    options: PipelineOptions,
) -> Harness<O>
where
    O: ScoringOracle + 'static,
{
    let store = Arc::new(MemorySubmissionStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let oracle = Arc::new(oracle);
    let gateway = Arc::new(gateway);
    let clock = ManualClock::new(start_time());
    let pipeline = ModerationPipeline::new(
        store.clone(),
        notifier.clone(),
        oracle.clone(),
        gateway.clone(),
        options,
    )
    .with_clock(Arc::new(clock.clone()));

    Harness {
        pipeline,
        store,
        notifier,
        oracle,
        gateway,
        clock,
    }
}

impl<O> Harness<O> {
    pub(super) fn state(&self) -> ModerationState<MemorySubmissionStore, RecordingNotifier> {
        ModerationState::new(self.pipeline.clone())
    }

    pub(super) fn tick(&self) {
        self.clock.advance(chrono::Duration::minutes(1));
    }

    pub(super) fn record(&self, id: &SubmissionId) -> SubmissionRecord {
        self.store
            .get(id)
            .expect("store reachable")
            .expect("record exists")
    }
}

/// Publish a request from a verified buyer so it goes live and can receive offers.
pub(super) async fn live_request<O>(harness: &Harness<O>, owner: &str) -> SubmissionRecord
where
    O: ScoringOracle + 'static,
{
    let mut submission = request_submission(owner);
    submission.trust = verified_trust();
    let receipt = harness
        .pipeline
        .submit(submission)
        .await
        .expect("request accepted");
    let id = receipt.record.id.clone();
    receipt.moderated().await.expect("moderation finished");
    harness.tick();
    let record = harness.record(&id);
    assert!(record.status.is_accepted());
    record
}

/// Store wrapper whose push channel is unavailable, forcing the polling path.
#[derive(Default, Clone)]
pub(super) struct NoPushStore {
    pub(super) inner: MemorySubmissionStore,
}

impl SubmissionStore for NoPushStore {
    fn create(&self, record: SubmissionRecord) -> Result<Created, StoreError> {
        self.inner.create(record)
    }

    fn get(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        self.inner.get(id)
    }

    fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        self.inner.find_by_idempotency_key(key)
    }

    fn update(
        &self,
        id: &SubmissionId,
        patch: SubmissionPatch,
    ) -> Result<SubmissionRecord, StoreError> {
        self.inner.update(id, patch)
    }

    fn transition(
        &self,
        id: &SubmissionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.transition(id, transition)
    }

    fn increment_response_count(
        &self,
        request_id: &SubmissionId,
        offer_id: &SubmissionId,
    ) -> Result<bool, StoreError> {
        self.inner.increment_response_count(request_id, offer_id)
    }

    fn subscribe(
        &self,
        _id: &SubmissionId,
    ) -> Result<watch::Receiver<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("realtime channel offline".to_string()))
    }

    fn query(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.inner.query(filter)
    }

    fn purge_all(&self) -> Result<usize, StoreError> {
        self.inner.purge_all()
    }
}

/// Store that is down for every operation.
pub(super) struct UnavailableStore;

impl SubmissionStore for UnavailableStore {
    fn create(&self, _record: SubmissionRecord) -> Result<Created, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn get(&self, _id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find_by_idempotency_key(
        &self,
        _key: &IdempotencyKey,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _id: &SubmissionId,
        _patch: SubmissionPatch,
    ) -> Result<SubmissionRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn transition(
        &self,
        _id: &SubmissionId,
        _transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn increment_response_count(
        &self,
        _request_id: &SubmissionId,
        _offer_id: &SubmissionId,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn subscribe(
        &self,
        _id: &SubmissionId,
    ) -> Result<watch::Receiver<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn query(&self, _filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn purge_all(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingEffects {
    pub(super) statuses: Arc<Mutex<Vec<SubmissionStatusView>>>,
    pub(super) terminals: Arc<Mutex<Vec<TerminalOutcome>>>,
}

impl RecordingEffects {
    pub(super) fn terminals(&self) -> Vec<TerminalOutcome> {
        self.terminals.lock().expect("effects mutex poisoned").clone()
    }

    pub(super) fn statuses(&self) -> Vec<SubmissionStatusView> {
        self.statuses.lock().expect("effects mutex poisoned").clone()
    }
}

impl ClientEffects for RecordingEffects {
    fn on_status(&mut self, view: &SubmissionStatusView) {
        self.statuses
            .lock()
            .expect("effects mutex poisoned")
            .push(view.clone());
    }

    fn on_terminal(&mut self, outcome: &TerminalOutcome) {
        self.terminals
            .lock()
            .expect("effects mutex poisoned")
            .push(outcome.clone());
    }
}

pub(super) fn worklist_from(pending: Vec<SubmissionRecord>) -> ReviewWorklist {
    let mut worklist = ReviewWorklist::new();
    worklist.refresh(pending);
    worklist
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
