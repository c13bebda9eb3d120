use async_trait::async_trait;

use super::{OracleAssessment, OracleError, OracleVerdict, ScoringOracle};
use crate::workflows::moderation::domain::{SubmissionContent, TrustContext};

const SPAM_PHRASES: &[&str] = &[
    "free",
    "urgent",
    "easy money",
    "get rich",
    "click here",
    "buy now",
];
const INAPPROPRIATE_PHRASES: &[&str] = &["adult", "explicit", "illegal", "fraud", "scam"];

const APPROVE_FLOOR: u8 = 80;
const REJECT_CONFIDENCE: u8 = 90;
const MAX_PRICE: u64 = 1_000_000;

/// One weighted content check, kept for transparent audits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSignal {
    pub rule: &'static str,
    pub weight: u8,
    pub passed: bool,
}

/// Deterministic keyword and completeness scorer.
///
/// Confidence is the summed weight of the passing checks. Inappropriate content is rejected
/// outright, a clean and complete submission scoring at least 80 is approved, and everything
/// else is left uncertain for the policy engine to escalate.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedOracle;

impl RuleBasedOracle {
    pub fn new() -> Self {
        Self
    }

    pub fn signals(&self, content: &SubmissionContent) -> Vec<RuleSignal> {
        let title = content.title.trim();
        let description = content.description.trim();
        let text = normalized_text(&content.searchable_text());

        vec![
            RuleSignal {
                rule: "title_length",
                weight: 15,
                passed: (10..=200).contains(&title.chars().count()),
            },
            RuleSignal {
                rule: "description_length",
                weight: 20,
                passed: (20..=2000).contains(&description.chars().count()),
            },
            RuleSignal {
                rule: "category_present",
                weight: 10,
                passed: !content.category.trim().is_empty(),
            },
            RuleSignal {
                rule: "price_range",
                weight: 15,
                passed: content.price > 0 && content.price <= MAX_PRICE,
            },
            RuleSignal {
                rule: "location_format",
                weight: 5,
                passed: content
                    .location
                    .as_deref()
                    .map(|location| (2..=100).contains(&location.trim().chars().count()))
                    .unwrap_or(true),
            },
            RuleSignal {
                rule: "not_spam",
                weight: 15,
                passed: !contains_any(&text, SPAM_PHRASES),
            },
            RuleSignal {
                rule: "appropriate",
                weight: 15,
                passed: !contains_any(&text, INAPPROPRIATE_PHRASES),
            },
            RuleSignal {
                rule: "complete",
                weight: 5,
                passed: !title.is_empty() && !description.is_empty() && content.price > 0,
            },
        ]
    }

    pub fn evaluate(&self, content: &SubmissionContent) -> OracleAssessment {
        let signals = self.signals(content);
        let confidence: u8 = signals
            .iter()
            .filter(|signal| signal.passed)
            .map(|signal| signal.weight)
            .sum();

        let failed: Vec<&str> = signals
            .iter()
            .filter(|signal| !signal.passed)
            .map(|signal| signal.rule)
            .collect();

        if failed.contains(&"appropriate") {
            return OracleAssessment::new(
                OracleVerdict::Reject,
                REJECT_CONFIDENCE,
                "inappropriate content detected",
            );
        }

        let notes = if failed.is_empty() {
            format!("all content checks passed ({confidence}%)")
        } else {
            format!("failed checks: {} ({confidence}%)", failed.join(", "))
        };

        let verdict = if failed.is_empty()
            || (confidence >= APPROVE_FLOOR && !failed.contains(&"not_spam"))
        {
            OracleVerdict::Approve
        } else {
            OracleVerdict::Uncertain
        };

        OracleAssessment::new(verdict, confidence, notes)
    }
}

#[async_trait]
impl ScoringOracle for RuleBasedOracle {
    async fn score(
        &self,
        content: &SubmissionContent,
        _trust: &TrustContext,
    ) -> Result<OracleAssessment, OracleError> {
        Ok(self.evaluate(content))
    }
}

fn normalized_text(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|phrase| text.contains(&format!(" {phrase} ")))
}
