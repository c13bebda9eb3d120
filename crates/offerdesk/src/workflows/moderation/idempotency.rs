//! Exactly-once guards for one logical submit action.
//!
//! Two layers cooperate. [`SubmissionFlow`] is the client-side state machine for a single
//! form lifecycle: it hands out one [`IdempotencyKey`] and refuses to start a second create
//! or payment once the first one committed. The key travels with the submission, and the
//! server side ([`IdempotencyLedger`] plus the store's key index) turns network retries of
//! the same action into replays of the original record.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{ModerationStatus, SubmissionId};
use super::payments::PaymentReceipt;

/// Client-generated token identifying one logical submit action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl IdempotencyKey {
    pub fn generate() -> Self {
        let seq = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self(format!("idem-{stamp:x}-{seq}"))
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// States of one submission flow on the client.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Idle,
    Submitting,
    AwaitingPayment,
    /// A charge call is outstanding.
    Paying,
    Persisted { submission_id: SubmissionId },
    AwaitingDecision { submission_id: SubmissionId },
    Terminal {
        submission_id: SubmissionId,
        status: ModerationStatus,
    },
}

impl FlowState {
    pub const fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Submitting => "submitting",
            FlowState::AwaitingPayment => "awaiting_payment",
            FlowState::Paying => "paying",
            FlowState::Persisted { .. } => "persisted",
            FlowState::AwaitingDecision { .. } => "awaiting_decision",
            FlowState::Terminal { .. } => "terminal",
        }
    }
}

/// Answer from a guarded flow transition.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowGate {
    Proceed(IdempotencyKey),
    /// A repeat of an action that is already running or already committed.
    Blocked,
}

/// Illegal transition attempted on a [`SubmissionFlow`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while {state}")]
pub struct FlowError {
    pub action: &'static str,
    pub state: &'static str,
}

/// Client-side state machine guarding one form submission.
///
/// `committed` is set the moment a submission is known to exist and is never cleared for the
/// lifetime of the flow, so neither a double click nor a late retry can create or pay twice.
#[derive(Debug)]
pub struct SubmissionFlow {
    state: FlowState,
    key: IdempotencyKey,
    requires_payment: bool,
    payment: Option<PaymentReceipt>,
    committed: bool,
}

impl SubmissionFlow {
    pub fn new(requires_payment: bool) -> Self {
        Self::with_key(IdempotencyKey::generate(), requires_payment)
    }

    pub fn with_key(key: IdempotencyKey, requires_payment: bool) -> Self {
        Self {
            state: FlowState::Idle,
            key,
            requires_payment,
            payment: None,
            committed: false,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn payment(&self) -> Option<&PaymentReceipt> {
        self.payment.as_ref()
    }

    /// Start the create call. Any repeat while running or after commit is blocked silently.
    pub fn begin_submit(&mut self) -> FlowGate {
        if self.committed || self.state != FlowState::Idle {
            return FlowGate::Blocked;
        }

        self.state = if self.requires_payment && self.payment.is_none() {
            FlowState::AwaitingPayment
        } else {
            FlowState::Submitting
        };
        FlowGate::Proceed(self.key.clone())
    }

    /// Start a charge. Only one charge may be outstanding, and a confirmed payment is never
    /// charged again.
    pub fn begin_payment(&mut self) -> FlowGate {
        if self.committed || self.payment.is_some() || self.state != FlowState::AwaitingPayment {
            return FlowGate::Blocked;
        }
        self.state = FlowState::Paying;
        FlowGate::Proceed(self.key.clone())
    }

    pub fn payment_confirmed(&mut self, receipt: PaymentReceipt) -> Result<(), FlowError> {
        if self.state != FlowState::Paying {
            return Err(self.illegal("confirm payment"));
        }
        self.payment = Some(receipt);
        self.state = FlowState::Submitting;
        Ok(())
    }

    pub fn persisted(&mut self, submission_id: SubmissionId) -> Result<(), FlowError> {
        if self.state != FlowState::Submitting {
            return Err(self.illegal("record persistence"));
        }
        self.committed = true;
        self.state = FlowState::Persisted { submission_id };
        Ok(())
    }

    pub fn awaiting_decision(&mut self) -> Result<(), FlowError> {
        match &self.state {
            FlowState::Persisted { submission_id } => {
                self.state = FlowState::AwaitingDecision {
                    submission_id: submission_id.clone(),
                };
                Ok(())
            }
            _ => Err(self.illegal("await decision")),
        }
    }

    /// Record the terminal moderation state. Repeats with the same outcome are no-ops.
    pub fn settle(&mut self, status: ModerationStatus) -> Result<(), FlowError> {
        if !status.is_terminal() {
            return Err(self.illegal("settle on a non-terminal status"));
        }

        match &self.state {
            FlowState::Persisted { submission_id }
            | FlowState::AwaitingDecision { submission_id } => {
                self.state = FlowState::Terminal {
                    submission_id: submission_id.clone(),
                    status,
                };
                Ok(())
            }
            FlowState::Terminal { status: current, .. } if *current == status => Ok(()),
            _ => Err(self.illegal("settle")),
        }
    }

    /// A create or charge call failed before anything was committed; allow a retry with the
    /// same key. A failed charge returns to `AwaitingPayment`. After commit this does nothing.
    pub fn failed(&mut self) {
        if self.committed {
            return;
        }
        match self.state {
            FlowState::Paying => self.state = FlowState::AwaitingPayment,
            FlowState::Submitting | FlowState::AwaitingPayment => self.state = FlowState::Idle,
            _ => {}
        }
    }

    fn illegal(&self, action: &'static str) -> FlowError {
        FlowError {
            action,
            state: self.state.label(),
        }
    }
}

/// Server-side set of idempotency keys whose submit is currently executing.
#[derive(Debug, Default, Clone)]
pub struct IdempotencyLedger {
    in_flight: Arc<Mutex<HashSet<IdempotencyKey>>>,
}

impl IdempotencyLedger {
    /// Claim a key for the duration of one submit. `None` means another call holds it.
    pub fn claim(&self, key: &IdempotencyKey) -> Option<LedgerClaim> {
        let mut guard = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !guard.insert(key.clone()) {
            return None;
        }
        Some(LedgerClaim {
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, key: &IdempotencyKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(key)
    }
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct LedgerClaim {
    key: IdempotencyKey,
    in_flight: Arc<Mutex<HashSet<IdempotencyKey>>>,
}

impl Drop for LedgerClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&self.key);
    }
}
