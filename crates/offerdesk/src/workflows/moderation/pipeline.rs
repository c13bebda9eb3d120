use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::domain::{
    DecisionSource, ModerationMetadata, ModerationStatus, NewSubmission, SubmissionId,
    SubmissionKind, SubmissionRecord, SubmitterTier,
};
use super::duplicates::{DuplicateDetector, DEFAULT_LOOKBACK_HOURS, DEFAULT_SIMILARITY_THRESHOLD};
use super::idempotency::IdempotencyLedger;
use super::intake::{IntakeGuard, IntakeViolation};
use super::notify::NotificationDispatcher;
use super::oracle::{assess, OracleAssessment, OracleVerdict, ScoringOracle};
use super::payments::{ChargeRequest, PaymentError, PaymentGateway};
use super::policy::{decide, ModerationDecision, ModerationSettings, PolicyInputs, SettingsHandle};
use super::store::{StoreError, SubmissionPatch, SubmissionStore};
use super::transition::{finalize, TerminalAction};

pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for [`ModerationPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub settings: ModerationSettings,
    pub similarity_threshold: f64,
    pub lookback: chrono::Duration,
    pub oracle_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            settings: ModerationSettings::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            lookback: chrono::Duration::hours(DEFAULT_LOOKBACK_HOURS),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

/// Service composing intake, duplicate detection, scoring, and the policy engine.
pub struct ModerationPipeline<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    oracle: Arc<dyn ScoringOracle>,
    payments: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    settings: SettingsHandle,
    detector: DuplicateDetector,
    guard: IntakeGuard,
    ledger: IdempotencyLedger,
    oracle_timeout: Duration,
}

impl<S, N> Clone for ModerationPipeline<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            oracle: Arc::clone(&self.oracle),
            payments: Arc::clone(&self.payments),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
            detector: self.detector.clone(),
            guard: self.guard.clone(),
            ledger: self.ledger.clone(),
            oracle_timeout: self.oracle_timeout,
        }
    }
}

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id(kind: SubmissionKind) -> SubmissionId {
    let id = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubmissionId(format!("{}-{id:06}", kind.id_prefix()))
}

/// Outcome of [`ModerationPipeline::submit`].
#[derive(Debug)]
pub struct SubmitReceipt {
    /// The stored record right after duplicate annotation; always `pending` unless replayed.
    pub record: SubmissionRecord,
    pub replayed: bool,
    /// Background scoring task. `None` for replays.
    pub moderation: Option<JoinHandle<Result<ModerationReport, PipelineError>>>,
}

impl SubmitReceipt {
    /// Wait for background moderation to finish.
    pub async fn moderated(self) -> Result<Option<ModerationReport>, PipelineError> {
        match self.moderation {
            None => Ok(None),
            Some(handle) => match handle.await {
                Ok(result) => result.map(Some),
                Err(err) => Err(PipelineError::TaskFailed(err.to_string())),
            },
        }
    }
}

/// What the automated pass did with one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationReport {
    pub submission_id: SubmissionId,
    pub decision: ModerationDecision,
    pub assessment: Option<OracleAssessment>,
    pub status: ModerationStatus,
    /// False when a reviewer (or another writer) reached a terminal state first.
    pub applied: bool,
}

impl<S, N> ModerationPipeline<S, N>
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        oracle: Arc<dyn ScoringOracle>,
        payments: Arc<dyn PaymentGateway>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            notifier,
            oracle,
            payments,
            clock: Arc::new(SystemClock),
            settings: SettingsHandle::new(options.settings),
            detector: DuplicateDetector::new(options.similarity_threshold, options.lookback),
            guard: IntakeGuard::default(),
            ledger: IdempotencyLedger::default(),
            oracle_timeout: options.oracle_timeout,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Validate, charge if required, persist as `pending`, annotate duplicates, then hand the
    /// record to a background scoring task.
    pub async fn submit(&self, submission: NewSubmission) -> Result<SubmitReceipt, PipelineError> {
        let submission = self.guard.validate(submission)?;

        if let Some(receipt) = self.replay(&submission)? {
            return Ok(receipt);
        }

        let _claim = match &submission.idempotency_key {
            Some(key) => Some(self.ledger.claim(key).ok_or(PipelineError::InFlight)?),
            None => None,
        };

        if let Some(receipt) = self.replay(&submission)? {
            return Ok(receipt);
        }

        if let Some(request_id) = &submission.request_id {
            let parent = self
                .store
                .get(request_id)?
                .ok_or(PipelineError::NotFound)?;
            if parent.kind != SubmissionKind::Request || parent.status != ModerationStatus::Live {
                return Err(PipelineError::RequestNotOpen(request_id.clone()));
            }
        }

        let payment = match (&submission.trust.submitter_tier, &submission.payment) {
            (SubmitterTier::Paid, Some(details)) => {
                let receipt = self
                    .payments
                    .charge(&ChargeRequest {
                        amount: details.amount,
                        payer_id: submission.owner_id.clone(),
                        payer_reference: details.payer_reference.clone(),
                        idempotency_key: submission.idempotency_key.clone(),
                    })
                    .await?;
                info!(
                    owner_id = %submission.owner_id,
                    transaction_id = %receipt.transaction_id,
                    "payment captured"
                );
                Some(receipt)
            }
            _ => None,
        };

        let now = self.clock.now();
        let record = SubmissionRecord {
            id: next_submission_id(submission.kind),
            kind: submission.kind,
            owner_id: submission.owner_id,
            request_id: submission.request_id,
            content: submission.content,
            trust: submission.trust,
            status: ModerationStatus::Pending,
            moderation: ModerationMetadata::default(),
            response_count: 0,
            chat_enabled: false,
            payment,
            idempotency_key: submission.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.create(record)?;
        if created.replayed {
            return Ok(SubmitReceipt {
                record: created.record,
                replayed: true,
                moderation: None,
            });
        }

        let record = self.detector.annotate(self.store.as_ref(), &created.record);
        info!(
            submission_id = %record.id,
            kind = record.kind.label(),
            is_duplicate = record.moderation.is_duplicate,
            "submission received"
        );

        let pipeline = self.clone();
        let id = record.id.clone();
        let moderation = tokio::spawn(async move { pipeline.moderate(&id).await });

        Ok(SubmitReceipt {
            record,
            replayed: false,
            moderation: Some(moderation),
        })
    }

    /// Score one pending submission and apply the policy decision.
    pub async fn moderate(&self, id: &SubmissionId) -> Result<ModerationReport, PipelineError> {
        let record = self.store.get(id)?.ok_or(PipelineError::NotFound)?;
        if record.status.is_terminal() {
            return Err(PipelineError::AlreadyTerminal(record.status));
        }

        let assessment = if record.trust.submitter_verified {
            None
        } else {
            Some(
                assess(
                    self.oracle.as_ref(),
                    &record.content,
                    &record.trust,
                    self.oracle_timeout,
                )
                .await,
            )
        };

        let inputs = PolicyInputs {
            is_duplicate: record.moderation.is_duplicate,
            requires_manual_review: record.moderation.requires_manual_review,
            verdict: assessment
                .as_ref()
                .map(|assessment| assessment.verdict)
                .unwrap_or(OracleVerdict::Uncertain),
            confidence: assessment
                .as_ref()
                .map(|assessment| assessment.confidence)
                .unwrap_or(0),
            submitter_verified: record.trust.submitter_verified,
            submitter_tier: record.trust.submitter_tier,
        };
        let decision = decide(&inputs, &self.settings.snapshot());
        debug!(submission_id = %id, decision = %decision.summary(), "policy evaluated");

        let action = match &decision {
            ModerationDecision::AutoApprove { .. } => Some(TerminalAction::Accept),
            ModerationDecision::AutoReject { .. } => Some(TerminalAction::Reject),
            ModerationDecision::Escalate { .. } => None,
        };

        let mut patch = SubmissionPatch {
            oracle: assessment.clone(),
            only_if_pending: true,
            ..SubmissionPatch::default()
        };
        if action.is_none() {
            patch.requires_manual_review = Some(true);
            patch.moderator_notes = Some(append_note(
                &record.moderation.moderator_notes,
                &decision.summary(),
            ));
        }

        if !patch.is_empty() {
            match self.store.update(id, patch) {
                Ok(_) => {}
                Err(StoreError::Terminal(status)) => {
                    return Ok(ModerationReport {
                        submission_id: id.clone(),
                        decision,
                        assessment,
                        status,
                        applied: false,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        let Some(action) = action else {
            info!(submission_id = %id, reason = %decision.summary(), "escalated for manual review");
            return Ok(ModerationReport {
                submission_id: id.clone(),
                decision,
                assessment,
                status: ModerationStatus::Pending,
                applied: true,
            });
        };

        let outcome = finalize(
            self.store.as_ref(),
            self.notifier.as_ref(),
            id,
            action,
            DecisionSource::Automated,
            decision.summary(),
            self.clock.now(),
        )?;

        Ok(ModerationReport {
            submission_id: id.clone(),
            decision,
            assessment,
            status: outcome.record().status,
            applied: outcome.applied(),
        })
    }

    pub fn get(&self, id: &SubmissionId) -> Result<SubmissionRecord, PipelineError> {
        self.store.get(id)?.ok_or(PipelineError::NotFound)
    }

    fn replay(&self, submission: &NewSubmission) -> Result<Option<SubmitReceipt>, PipelineError> {
        let Some(key) = &submission.idempotency_key else {
            return Ok(None);
        };
        let Some(existing) = self.store.find_by_idempotency_key(key)? else {
            return Ok(None);
        };
        info!(submission_id = %existing.id, idempotency_key = %key, "replayed submission");
        Ok(Some(SubmitReceipt {
            record: existing,
            replayed: true,
            moderation: None,
        }))
    }
}

fn append_note(existing: &str, note: &str) -> String {
    if existing.is_empty() {
        note.to_string()
    } else {
        format!("{existing}; {note}")
    }
}

/// Coarse outcome class surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
    Success,
    ValidationError,
    NotFound,
    AlreadyTerminal,
    UpstreamUnavailable,
}

impl ResultCode {
    pub const fn label(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::ValidationError => "validation-error",
            ResultCode::NotFound => "not-found",
            ResultCode::AlreadyTerminal => "already-terminal",
            ResultCode::UpstreamUnavailable => "upstream-unavailable",
        }
    }
}

/// Error raised by the moderation pipeline and review queue.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] IntakeViolation),
    #[error("request {0} is not open for offers")]
    RequestNotOpen(SubmissionId),
    #[error("submission not found")]
    NotFound,
    #[error("submission is already {}", .0.label())]
    AlreadyTerminal(ModerationStatus),
    #[error("this submission is already being processed")]
    InFlight,
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Store(StoreError),
    #[error("moderation task failed: {0}")]
    TaskFailed(String),
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => PipelineError::NotFound,
            StoreError::Terminal(status) => PipelineError::AlreadyTerminal(status),
            other => PipelineError::Store(other),
        }
    }
}

impl PipelineError {
    /// Text safe to show a submitter. Gateway and store details stay in the logs.
    pub fn public_message(&self) -> String {
        match (self, self.code()) {
            (_, ResultCode::UpstreamUnavailable) => "service temporarily unavailable".to_string(),
            (PipelineError::Payment(_), _) => "payment was not completed".to_string(),
            (PipelineError::NotFound, _) => "submission not found".to_string(),
            (other, _) => other.to_string(),
        }
    }

    pub fn code(&self) -> ResultCode {
        match self {
            PipelineError::Validation(_)
            | PipelineError::RequestNotOpen(_)
            | PipelineError::Payment(PaymentError::Declined(_))
            | PipelineError::Store(StoreError::InvalidTransition { .. }) => {
                ResultCode::ValidationError
            }
            PipelineError::NotFound => ResultCode::NotFound,
            PipelineError::AlreadyTerminal(_)
            | PipelineError::InFlight
            | PipelineError::Store(StoreError::Conflict) => ResultCode::AlreadyTerminal,
            PipelineError::Payment(PaymentError::Unavailable(_))
            | PipelineError::Store(_)
            | PipelineError::TaskFailed(_) => ResultCode::UpstreamUnavailable,
        }
    }
}
