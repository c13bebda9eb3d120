mod rules;

pub use rules::{RuleBasedOracle, RuleSignal};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{SubmissionContent, TrustContext};

/// Verdict returned by an automated scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleVerdict {
    Approve,
    Reject,
    Uncertain,
}

impl OracleVerdict {
    pub const fn label(self) -> &'static str {
        match self {
            OracleVerdict::Approve => "approve",
            OracleVerdict::Reject => "reject",
            OracleVerdict::Uncertain => "uncertain",
        }
    }
}

/// Scorer output. `confidence` is a percentage in `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleAssessment {
    pub verdict: OracleVerdict,
    pub confidence: u8,
    pub notes: String,
}

impl OracleAssessment {
    pub fn new(verdict: OracleVerdict, confidence: u8, notes: impl Into<String>) -> Self {
        Self {
            verdict,
            confidence: confidence.min(100),
            notes: notes.into(),
        }
    }

    /// Stand-in used whenever the scorer cannot answer. Always escalates.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(OracleVerdict::Uncertain, 0, reason)
    }
}

/// Opaque automated content classifier.
///
/// Implementations may be rule-based, model-backed, or a staffed queue; the policy engine only
/// ever sees the returned [`OracleAssessment`].
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn score(
        &self,
        content: &SubmissionContent,
        trust: &TrustContext,
    ) -> Result<OracleAssessment, OracleError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("scoring oracle unreachable: {0}")]
    Unreachable(String),
    #[error("scoring oracle returned malformed output: {0}")]
    Malformed(String),
}

/// Call the oracle with a deadline. Errors and timeouts collapse into
/// [`OracleAssessment::unavailable`].
pub async fn assess<O>(
    oracle: &O,
    content: &SubmissionContent,
    trust: &TrustContext,
    timeout: Duration,
) -> OracleAssessment
where
    O: ScoringOracle + ?Sized,
{
    match tokio::time::timeout(timeout, oracle.score(content, trust)).await {
        Ok(Ok(assessment)) => OracleAssessment::new(
            assessment.verdict,
            assessment.confidence,
            assessment.notes,
        ),
        Ok(Err(err)) => {
            warn!(error = %err, "scoring oracle failed; treating as uncertain");
            OracleAssessment::unavailable("automated scoring unavailable")
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "scoring oracle timed out");
            OracleAssessment::unavailable("automated scoring timed out")
        }
    }
}
