use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{SubmissionId, UserId};

/// Outbound notification hook (push, e-mail, in-app inbox adapters).
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SubmissionApproved,
    SubmissionRejected,
    /// Sent to both parties once an offer approval opens the chat channel.
    NewChat,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::SubmissionApproved => "submission_approved",
            NotificationKind::SubmissionRejected => "submission_rejected",
            NotificationKind::NewChat => "new_chat",
        }
    }
}

/// Notification payload so routes/tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub submission_id: SubmissionId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget delivery: failures are logged, never returned to the caller.
pub(crate) fn dispatch<N>(notifier: &N, notification: Notification)
where
    N: NotificationDispatcher + ?Sized,
{
    let user_id = notification.user_id.clone();
    let kind = notification.kind;
    if let Err(err) = notifier.notify(notification) {
        warn!(%user_id, kind = kind.label(), error = %err, "notification dropped");
    }
}
