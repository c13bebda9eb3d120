use std::collections::BTreeSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{ModerationStatus, SubmissionId, SubmissionRecord, UserId};
use super::store::{StoreError, SubmissionFilter, SubmissionPatch, SubmissionStore};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 95.0;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// One older submission that looks like the same content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub submission_id: SubmissionId,
    pub owner_id: UserId,
    pub similarity: f64,
    pub same_owner: bool,
}

/// Result of a duplicate scan, highest similarity first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub matches: Vec<DuplicateMatch>,
}

impl DuplicateReport {
    pub fn is_duplicate(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn ids(&self) -> Vec<SubmissionId> {
        self.matches
            .iter()
            .map(|candidate| candidate.submission_id.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        match self.matches.first() {
            None => "no duplicates found".to_string(),
            Some(best) => format!(
                "possible duplicate of {} ({:.1}% similar{}); {} match(es) in window",
                best.submission_id,
                best.similarity,
                if best.same_owner { ", same owner" } else { "" },
                self.matches.len()
            ),
        }
    }
}

/// Near-duplicate scanner over a trailing time window.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    threshold: f64,
    lookback: Duration,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_SIMILARITY_THRESHOLD,
            Duration::hours(DEFAULT_LOOKBACK_HOURS),
        )
    }
}

impl DuplicateDetector {
    pub fn new(threshold: f64, lookback: Duration) -> Self {
        let threshold = if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
            threshold
        } else {
            DEFAULT_SIMILARITY_THRESHOLD
        };
        let lookback = if lookback > Duration::zero() {
            lookback
        } else {
            Duration::hours(DEFAULT_LOOKBACK_HOURS)
        };
        Self {
            threshold,
            lookback,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn is_match(&self, similarity: f64) -> bool {
        similarity >= self.threshold
    }

    /// Scan strictly older, non-rejected submissions of the same kind and category.
    pub fn check<S>(&self, store: &S, record: &SubmissionRecord) -> Result<DuplicateReport, StoreError>
    where
        S: SubmissionStore + ?Sized,
    {
        let filter = SubmissionFilter {
            kind: Some(record.kind),
            category: Some(record.content.category.clone()),
            created_from: record.created_at.checked_sub_signed(self.lookback),
            created_before: Some(record.created_at),
            statuses: Some(vec![
                ModerationStatus::Pending,
                ModerationStatus::Live,
                ModerationStatus::Approved,
            ]),
            ..SubmissionFilter::default()
        };

        let text = record.content.searchable_text();
        let mut matches: Vec<DuplicateMatch> = store
            .query(&filter)?
            .into_iter()
            .filter(|candidate| candidate.id != record.id)
            .filter_map(|candidate| {
                let similarity = word_overlap(&text, &candidate.content.searchable_text());
                self.is_match(similarity).then(|| DuplicateMatch {
                    same_owner: candidate.owner_id == record.owner_id,
                    submission_id: candidate.id,
                    owner_id: candidate.owner_id,
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.submission_id.cmp(&b.submission_id))
        });

        Ok(DuplicateReport { matches })
    }

    /// Run the scan and write the flags onto the record. Failures count as "not a duplicate".
    pub fn annotate<S>(&self, store: &S, record: &SubmissionRecord) -> SubmissionRecord
    where
        S: SubmissionStore + ?Sized,
    {
        let report = match self.check(store, record) {
            Ok(report) => report,
            Err(err) => {
                warn!(submission_id = %record.id, error = %err, "duplicate scan failed; continuing");
                return record.clone();
            }
        };

        if !report.is_duplicate() {
            return record.clone();
        }

        info!(
            submission_id = %record.id,
            matches = report.matches.len(),
            "flagged as possible duplicate"
        );

        let patch = SubmissionPatch {
            is_duplicate: Some(true),
            duplicate_matches: Some(report.ids()),
            requires_manual_review: Some(true),
            moderator_notes: Some(report.summary()),
            only_if_pending: true,
            ..SubmissionPatch::default()
        };

        match store.update(&record.id, patch) {
            Ok(updated) => updated,
            Err(err) => {
                warn!(submission_id = %record.id, error = %err, "could not persist duplicate flags");
                record.clone()
            }
        }
    }
}

/// Percentage of shared words across both texts (Jaccard index of the word sets).
pub fn word_overlap(left: &str, right: &str) -> f64 {
    let left = word_set(left);
    let right = word_set(right);
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }

    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    (shared as f64 * 100.0) / union as f64
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
