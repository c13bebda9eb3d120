use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::domain::{SubmitterTier, TrustContext};
use super::oracle::{OracleAssessment, OracleVerdict};

pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 80;

/// Operator-tunable moderation dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationSettings {
    pub confidence_threshold: u8,
    pub auto_approve_free: bool,
    pub auto_approve_paid: bool,
    /// Master switch for oracle-driven decisions. Verified submitters bypass it.
    pub automation_enabled: bool,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            auto_approve_free: true,
            auto_approve_paid: true,
            automation_enabled: true,
        }
    }
}

impl ModerationSettings {
    pub fn auto_approves(&self, tier: SubmitterTier) -> bool {
        match tier {
            SubmitterTier::Free => self.auto_approve_free,
            SubmitterTier::Paid => self.auto_approve_paid,
        }
    }

    pub(crate) fn sanitized(mut self) -> Self {
        self.confidence_threshold = self.confidence_threshold.min(100);
        self
    }
}

/// Shared, runtime-editable settings. Each decision reads one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<ModerationSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: ModerationSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.sanitized())),
        }
    }

    pub fn snapshot(&self) -> ModerationSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace(&self, settings: ModerationSettings) -> ModerationSettings {
        let settings = settings.sanitized();
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
        settings
    }
}

/// Everything the engine looks at for one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyInputs {
    pub is_duplicate: bool,
    pub requires_manual_review: bool,
    pub verdict: OracleVerdict,
    pub confidence: u8,
    pub submitter_verified: bool,
    pub submitter_tier: SubmitterTier,
}

impl PolicyInputs {
    pub fn new(
        is_duplicate: bool,
        requires_manual_review: bool,
        assessment: &OracleAssessment,
        trust: &TrustContext,
    ) -> Self {
        Self {
            is_duplicate,
            requires_manual_review,
            verdict: assessment.verdict,
            confidence: assessment.confidence,
            submitter_verified: trust.submitter_verified,
            submitter_tier: trust.submitter_tier,
        }
    }
}

/// Outcome of the policy engine for one pending submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationDecision {
    AutoApprove { reason: String },
    AutoReject { reason: String },
    Escalate { reasons: Vec<String> },
}

impl ModerationDecision {
    pub fn summary(&self) -> String {
        match self {
            ModerationDecision::AutoApprove { reason } => format!("auto-approved: {reason}"),
            ModerationDecision::AutoReject { reason } => format!("auto-rejected: {reason}"),
            ModerationDecision::Escalate { reasons } => {
                if reasons.is_empty() {
                    "escalated for manual review".to_string()
                } else {
                    format!("escalated for manual review: {}", reasons.join("; "))
                }
            }
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, ModerationDecision::Escalate { .. })
    }
}

/// Pure decision function. The first matching rule wins.
pub fn decide(inputs: &PolicyInputs, settings: &ModerationSettings) -> ModerationDecision {
    if inputs.submitter_verified {
        return ModerationDecision::AutoApprove {
            reason: "verified submitter".to_string(),
        };
    }

    if inputs.is_duplicate || inputs.requires_manual_review {
        let mut reasons = Vec::new();
        if inputs.is_duplicate {
            reasons.push("possible duplicate".to_string());
        }
        if inputs.requires_manual_review && !inputs.is_duplicate {
            reasons.push("flagged for manual review".to_string());
        }
        return ModerationDecision::Escalate { reasons };
    }

    let threshold = settings.confidence_threshold;
    let confident = inputs.confidence >= threshold;

    if !settings.automation_enabled {
        return ModerationDecision::Escalate {
            reasons: vec!["automated moderation disabled".to_string()],
        };
    }

    match inputs.verdict {
        OracleVerdict::Approve if confident && settings.auto_approves(inputs.submitter_tier) => {
            ModerationDecision::AutoApprove {
                reason: format!(
                    "oracle approved at {}% (threshold {threshold}%)",
                    inputs.confidence
                ),
            }
        }
        OracleVerdict::Approve if confident => ModerationDecision::Escalate {
            reasons: vec![format!(
                "auto-approval disabled for {} tier",
                inputs.submitter_tier.label()
            )],
        },
        OracleVerdict::Reject if confident => ModerationDecision::AutoReject {
            reason: format!(
                "oracle rejected at {}% (threshold {threshold}%)",
                inputs.confidence
            ),
        },
        OracleVerdict::Uncertain => ModerationDecision::Escalate {
            reasons: vec![format!("oracle uncertain at {}%", inputs.confidence)],
        },
        verdict => ModerationDecision::Escalate {
            reasons: vec![format!(
                "oracle {} at {}% below threshold {threshold}%",
                verdict.label(),
                inputs.confidence
            )],
        },
    }
}
