//! Submission moderation and status synchronization for marketplace requests and offers.
//!
//! A submission is validated, persisted as `pending`, annotated for near-duplicates, scored by
//! an opaque oracle, and then either decided automatically by the policy engine or escalated
//! to the manual review queue. Every terminal write goes through one compare-and-swap, so the
//! policy engine and a reviewer racing on the same item produce a single winner.

pub mod clock;
pub mod domain;
pub mod duplicates;
pub mod idempotency;
pub mod intake;
pub mod notify;
pub mod oracle;
pub mod payments;
pub mod pipeline;
pub mod policy;
pub mod review;
pub mod router;
pub mod store;
pub mod sync;
mod transition;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    DecisionSource, MediaReference, ModerationMetadata, ModerationStatus, NewSubmission,
    PaymentDetails, SubmissionContent, SubmissionId, SubmissionKind, SubmissionRecord,
    SubmissionStatusView, SubmitterTier, TrustContext, UserId,
};
pub use duplicates::{word_overlap, DuplicateDetector, DuplicateMatch, DuplicateReport};
pub use idempotency::{
    FlowError, FlowGate, FlowState, IdempotencyKey, IdempotencyLedger, SubmissionFlow,
};
pub use intake::{IntakeGuard, IntakeLimits, IntakeViolation};
pub use notify::{Notification, NotificationDispatcher, NotificationKind, NotifyError};
pub use oracle::{
    OracleAssessment, OracleError, OracleVerdict, RuleBasedOracle, RuleSignal, ScoringOracle,
};
pub use payments::{ChargeRequest, PaymentError, PaymentGateway, PaymentReceipt};
pub use pipeline::{
    ModerationPipeline, ModerationReport, PipelineError, PipelineOptions, ResultCode,
    SubmitReceipt,
};
pub use policy::{
    decide, ModerationDecision, ModerationSettings, PolicyInputs, SettingsHandle,
};
pub use review::{
    ManualReviewQueue, ReviewCommand, ReviewEvent, ReviewOutcome, ReviewWorklist,
    WorklistRow, WorklistState,
};
pub use router::{moderation_router, ModerationState};
pub use store::{
    Created, MemorySubmissionStore, StatusTransition, StoreError, SubmissionFilter,
    SubmissionPatch, SubmissionStore, TransitionOutcome,
};
pub use sync::{
    ClientEffects, Merge, Navigation, Reconciler, StatusSynchronizer, SyncHandle, SyncReport,
    SyncStop, TerminalOutcome,
};
pub use transition::TerminalAction;
