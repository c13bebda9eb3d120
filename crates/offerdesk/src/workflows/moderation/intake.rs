use super::domain::{NewSubmission, SubmissionKind, SubmitterTier};

/// Validation errors raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeViolation {
    #[error("title is required")]
    MissingTitle,
    #[error("title exceeds {max} characters (found {found})")]
    TitleTooLong { max: usize, found: usize },
    #[error("description is required")]
    MissingDescription,
    #[error("description exceeds {max} characters (found {found})")]
    DescriptionTooLong { max: usize, found: usize },
    #[error("category is required")]
    MissingCategory,
    #[error("price must be greater than zero")]
    InvalidPrice,
    #[error("offers must reference a request")]
    MissingRequestReference,
    #[error("requests cannot reference another request")]
    UnexpectedRequestReference,
    #[error("paid tier submissions require payment details")]
    MissingPayment,
    #[error("payment amount must be greater than zero")]
    InvalidPaymentAmount,
}

const DEFAULT_MAX_TITLE: usize = 200;
const DEFAULT_MAX_DESCRIPTION: usize = 2000;

/// Length limits backing intake validation.
#[derive(Debug, Clone)]
pub struct IntakeLimits {
    max_title_chars: usize,
    max_description_chars: usize,
}

impl IntakeLimits {
    pub fn new(max_title_chars: usize, max_description_chars: usize) -> Self {
        Self {
            max_title_chars: if max_title_chars == 0 {
                DEFAULT_MAX_TITLE
            } else {
                max_title_chars
            },
            max_description_chars: if max_description_chars == 0 {
                DEFAULT_MAX_DESCRIPTION
            } else {
                max_description_chars
            },
        }
    }
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TITLE, DEFAULT_MAX_DESCRIPTION)
    }
}

/// Guard producing trimmed, validated submissions.
#[derive(Debug, Clone, Default)]
pub struct IntakeGuard {
    limits: IntakeLimits,
}

impl IntakeGuard {
    pub fn with_limits(limits: IntakeLimits) -> Self {
        Self { limits }
    }

    /// Validate an inbound submission and return it with whitespace trimmed.
    pub fn validate(&self, mut submission: NewSubmission) -> Result<NewSubmission, IntakeViolation> {
        let content = &mut submission.content;
        content.title = content.title.trim().to_string();
        content.description = content.description.trim().to_string();
        content.category = content.category.trim().to_string();
        content.notes = content.notes.trim().to_string();
        content.location = content
            .location
            .take()
            .map(|location| location.trim().to_string())
            .filter(|location| !location.is_empty());

        if content.title.is_empty() {
            return Err(IntakeViolation::MissingTitle);
        }
        let title_chars = content.title.chars().count();
        if title_chars > self.limits.max_title_chars {
            return Err(IntakeViolation::TitleTooLong {
                max: self.limits.max_title_chars,
                found: title_chars,
            });
        }

        if content.description.is_empty() {
            return Err(IntakeViolation::MissingDescription);
        }
        let description_chars = content.description.chars().count();
        if description_chars > self.limits.max_description_chars {
            return Err(IntakeViolation::DescriptionTooLong {
                max: self.limits.max_description_chars,
                found: description_chars,
            });
        }

        if content.category.is_empty() {
            return Err(IntakeViolation::MissingCategory);
        }

        if content.price == 0 {
            return Err(IntakeViolation::InvalidPrice);
        }

        match (submission.kind, &submission.request_id) {
            (SubmissionKind::Offer, None) => return Err(IntakeViolation::MissingRequestReference),
            (SubmissionKind::Request, Some(_)) => {
                return Err(IntakeViolation::UnexpectedRequestReference)
            }
            _ => {}
        }

        if submission.trust.submitter_tier == SubmitterTier::Paid {
            match &submission.payment {
                None => return Err(IntakeViolation::MissingPayment),
                Some(payment) if payment.amount == 0 => {
                    return Err(IntakeViolation::InvalidPaymentAmount)
                }
                Some(_) => {}
            }
        }

        Ok(submission)
    }
}
