mod memory;

pub use memory::MemorySubmissionStore;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::domain::{
    DecisionSource, ModerationStatus, SubmissionId, SubmissionKind, SubmissionRecord,
};
use super::idempotency::IdempotencyKey;
use super::oracle::OracleAssessment;

/// Storage abstraction so the pipeline can be exercised in isolation.
///
/// Moderation state never changes through [`SubmissionStore::update`]; only
/// [`SubmissionStore::transition`] may move a record out of `pending`, and it does so as a
/// compare-and-swap against the stored state.
pub trait SubmissionStore: Send + Sync {
    /// Persist a new record. A record carrying an idempotency key that was already used
    /// returns the original record with `replayed` set instead of creating a second one.
    fn create(&self, record: SubmissionRecord) -> Result<Created, StoreError>;
    fn get(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError>;
    fn find_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<SubmissionRecord>, StoreError>;
    /// Field-level update; fields left as `None` are untouched.
    fn update(
        &self,
        id: &SubmissionId,
        patch: SubmissionPatch,
    ) -> Result<SubmissionRecord, StoreError>;
    fn transition(
        &self,
        id: &SubmissionId,
        transition: StatusTransition,
    ) -> Result<TransitionOutcome, StoreError>;
    /// Atomically bump `response_count` on the request. Returns `false` when this offer
    /// was already counted.
    fn increment_response_count(
        &self,
        request_id: &SubmissionId,
        offer_id: &SubmissionId,
    ) -> Result<bool, StoreError>;
    fn subscribe(&self, id: &SubmissionId)
        -> Result<watch::Receiver<SubmissionRecord>, StoreError>;
    fn query(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>, StoreError>;
    fn purge_all(&self) -> Result<usize, StoreError>;
}

/// Result of [`SubmissionStore::create`].
#[derive(Debug, Clone)]
pub struct Created {
    pub record: SubmissionRecord,
    pub replayed: bool,
}

/// Field-level patch. Status is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionPatch {
    pub is_duplicate: Option<bool>,
    pub duplicate_matches: Option<Vec<SubmissionId>>,
    pub requires_manual_review: Option<bool>,
    pub moderator_notes: Option<String>,
    pub oracle: Option<OracleAssessment>,
    /// Reject the patch with [`StoreError::Terminal`] once the record has left `pending`.
    pub only_if_pending: bool,
}

impl SubmissionPatch {
    pub fn is_empty(&self) -> bool {
        self.is_duplicate.is_none()
            && self.duplicate_matches.is_none()
            && self.requires_manual_review.is_none()
            && self.moderator_notes.is_none()
            && self.oracle.is_none()
    }
}

/// Terminal write conditioned on the record still being `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub to: ModerationStatus,
    pub source: DecisionSource,
    pub notes: String,
    pub at: DateTime<Utc>,
    pub enable_chat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(SubmissionRecord),
    /// Another writer got there first; the stored record is returned untouched.
    AlreadyTerminal(SubmissionRecord),
}

impl TransitionOutcome {
    pub fn record(&self) -> &SubmissionRecord {
        match self {
            TransitionOutcome::Applied(record) | TransitionOutcome::AlreadyTerminal(record) => {
                record
            }
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Query filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionFilter {
    pub kind: Option<SubmissionKind>,
    /// Compared case-insensitively after trimming.
    pub category: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub created_before: Option<DateTime<Utc>>,
    pub statuses: Option<Vec<ModerationStatus>>,
    pub requires_manual_review: Option<bool>,
    pub request_id: Option<SubmissionId>,
    pub limit: Option<usize>,
}

impl SubmissionFilter {
    pub fn matches(&self, record: &SubmissionRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if !record
                .content
                .category
                .trim()
                .eq_ignore_ascii_case(category.trim())
            {
                return false;
            }
        }

        if let Some(from) = self.created_from {
            if record.created_at < from {
                return false;
            }
        }

        if let Some(before) = self.created_before {
            if record.created_at >= before {
                return false;
            }
        }

        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }

        if let Some(flag) = self.requires_manual_review {
            if record.moderation.requires_manual_review != flag {
                return false;
            }
        }

        if let Some(request_id) = &self.request_id {
            if record.request_id.as_ref() != Some(request_id) {
                return false;
            }
        }

        true
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is already {}", .0.label())]
    Terminal(ModerationStatus),
    #[error("{} cannot move to {}", .kind.label(), .to.label())]
    InvalidTransition {
        kind: SubmissionKind,
        to: ModerationStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
