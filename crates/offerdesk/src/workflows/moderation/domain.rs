use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::idempotency::IdempotencyKey;
use super::oracle::OracleAssessment;
use super::payments::PaymentReceipt;

/// Identifier wrapper for persisted submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for marketplace users (buyers, sellers, operators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two concrete submission variants: buyer requests and seller offers against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Request,
    Offer,
}

impl SubmissionKind {
    pub const fn label(self) -> &'static str {
        match self {
            SubmissionKind::Request => "request",
            SubmissionKind::Offer => "offer",
        }
    }

    /// Terminal success state for this kind. Requests go `live`, offers get `approved`.
    pub const fn accepted_status(self) -> ModerationStatus {
        match self {
            SubmissionKind::Request => ModerationStatus::Live,
            SubmissionKind::Offer => ModerationStatus::Approved,
        }
    }

    pub(crate) const fn id_prefix(self) -> &'static str {
        match self {
            SubmissionKind::Request => "req",
            SubmissionKind::Offer => "off",
        }
    }
}

/// Moderation state. Monotonic: `pending` moves at most once into a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Live,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Live => "live",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ModerationStatus::Pending)
    }

    pub const fn is_accepted(self) -> bool {
        matches!(self, ModerationStatus::Live | ModerationStatus::Approved)
    }

    /// Whether a submission of `kind` may legally end up in this state.
    pub const fn valid_for(self, kind: SubmissionKind) -> bool {
        match (self, kind) {
            (ModerationStatus::Pending, _) | (ModerationStatus::Rejected, _) => true,
            (ModerationStatus::Live, SubmissionKind::Request) => true,
            (ModerationStatus::Approved, SubmissionKind::Offer) => true,
            _ => false,
        }
    }
}

/// Pricing plan of the submitter when the item was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitterTier {
    Free,
    Paid,
}

impl SubmitterTier {
    pub const fn label(self) -> &'static str {
        match self {
            SubmitterTier::Free => "free",
            SubmitterTier::Paid => "paid",
        }
    }
}

/// Trust snapshot captured at submission time. Never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustContext {
    pub submitter_verified: bool,
    pub submitter_tier: SubmitterTier,
}

/// Pointer to an uploaded media object; the upload itself happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub name: String,
    pub storage_key: String,
}

/// User-authored content shared by requests and offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionContent {
    pub title: String,
    pub description: String,
    pub category: String,
    /// Budget for requests, quoted price for offers, in whole currency units.
    pub price: u64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub media: Vec<MediaReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SubmissionContent {
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Payment details supplied by paid-tier submitters before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub amount: u64,
    pub payer_reference: String,
}

/// Inbound submission before validation and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub kind: SubmissionKind,
    pub owner_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<SubmissionId>,
    pub content: SubmissionContent,
    pub trust: TrustContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Who wrote the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Automated,
    Reviewer,
}

/// Moderation annotations carried on every submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationMetadata {
    pub is_duplicate: bool,
    pub duplicate_matches: Vec<SubmissionId>,
    pub requires_manual_review: bool,
    pub moderator_notes: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub decided_by: Option<DecisionSource>,
    pub oracle: Option<OracleAssessment>,
}

/// Store document for a single request or offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub kind: SubmissionKind,
    pub owner_id: UserId,
    pub request_id: Option<SubmissionId>,
    pub content: SubmissionContent,
    pub trust: TrustContext,
    pub status: ModerationStatus,
    pub moderation: ModerationMetadata,
    /// Approved offers counted against this request. Always zero on offers.
    pub response_count: u32,
    /// Post-approval channel between buyer and seller. Offers only.
    pub chat_enabled: bool,
    pub payment: Option<PaymentReceipt>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn status_view(&self) -> SubmissionStatusView {
        SubmissionStatusView {
            submission_id: self.id.clone(),
            kind: self.kind.label(),
            status: self.status.label(),
            message: self.user_message().to_string(),
            requires_manual_review: self.moderation.requires_manual_review,
            response_count: match self.kind {
                SubmissionKind::Request => Some(self.response_count),
                SubmissionKind::Offer => None,
            },
        }
    }

    /// Neutral, submitter-facing wording. Never carries upstream error text.
    pub fn user_message(&self) -> &'static str {
        match (self.status, self.kind) {
            (ModerationStatus::Pending, _) if self.moderation.requires_manual_review => {
                "Pending manual review"
            }
            (ModerationStatus::Pending, _) => "Under review",
            (ModerationStatus::Live, _) => "Your request is live and visible to sellers",
            (ModerationStatus::Approved, _) => "Your offer has been approved",
            (ModerationStatus::Rejected, SubmissionKind::Request) => {
                "Your request was not approved"
            }
            (ModerationStatus::Rejected, SubmissionKind::Offer) => "Your offer was not approved",
        }
    }
}

/// Sanitized representation of a submission's exposed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionStatusView {
    pub submission_id: SubmissionId,
    pub kind: &'static str,
    pub status: &'static str,
    pub message: String,
    pub requires_manual_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_count: Option<u32>,
}
