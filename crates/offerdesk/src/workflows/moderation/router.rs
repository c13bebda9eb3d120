use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{
    NewSubmission, PaymentDetails, SubmissionContent, SubmissionId, SubmissionKind,
    TrustContext, UserId,
};
use super::idempotency::IdempotencyKey;
use super::notify::NotificationDispatcher;
use super::pipeline::{ModerationPipeline, PipelineError, ResultCode};
use super::policy::ModerationSettings;
use super::review::{ManualReviewQueue, ReviewOutcome};
use super::store::SubmissionStore;
use super::transition::TerminalAction;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Shared handler state: the intake pipeline plus the admin queue over the same store.
pub struct ModerationState<S, N> {
    pub pipeline: ModerationPipeline<S, N>,
    pub queue: ManualReviewQueue<S, N>,
}

impl<S, N> ModerationState<S, N>
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(pipeline: ModerationPipeline<S, N>) -> Self {
        let queue = ManualReviewQueue::new(
            Arc::clone(pipeline.store()),
            Arc::clone(pipeline.notifier()),
            Arc::clone(pipeline.clock()),
        );
        Self { pipeline, queue }
    }
}

/// Router builder exposing submission intake, status, and admin endpoints.
pub fn moderation_router<S, N>(state: Arc<ModerationState<S, N>>) -> Router
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/requests", post(submit_request_handler::<S, N>))
        .route("/api/v1/offers", post(submit_offer_handler::<S, N>))
        .route(
            "/api/v1/submissions/:submission_id",
            get(status_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/review-queue",
            get(review_queue_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/submissions/:submission_id/approve",
            post(approve_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/submissions/:submission_id/reject",
            post(reject_handler::<S, N>),
        )
        .route("/api/v1/admin/submissions", delete(purge_handler::<S, N>))
        .route(
            "/api/v1/admin/settings",
            get(settings_handler::<S, N>).put(update_settings_handler::<S, N>),
        )
        .with_state(state)
}

/// Inbound body shared by request and offer intake; the route decides the kind.
#[derive(Debug, Deserialize)]
pub struct SubmissionBody {
    pub owner_id: UserId,
    #[serde(default)]
    pub request_id: Option<SubmissionId>,
    pub content: SubmissionContent,
    pub trust: TrustContext,
    #[serde(default)]
    pub payment: Option<PaymentDetails>,
}

impl SubmissionBody {
    fn into_submission(
        self,
        kind: SubmissionKind,
        idempotency_key: Option<IdempotencyKey>,
    ) -> NewSubmission {
        NewSubmission {
            kind,
            owner_id: self.owner_id,
            request_id: self.request_id,
            content: self.content,
            trust: self.trust,
            payment: self.payment,
            idempotency_key,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewBody {
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueParams {
    pub limit: Option<usize>,
}

pub(crate) async fn submit_request_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<SubmissionBody>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    submit(&state, body.into_submission(SubmissionKind::Request, idempotency_key(&headers))).await
}

pub(crate) async fn submit_offer_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<SubmissionBody>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    submit(&state, body.into_submission(SubmissionKind::Offer, idempotency_key(&headers))).await
}

async fn submit<S, N>(state: &ModerationState<S, N>, submission: NewSubmission) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match state.pipeline.submit(submission).await {
        Ok(receipt) => {
            let status = if receipt.replayed {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            (status, axum::Json(receipt.record.status_view())).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match state.pipeline.get(&SubmissionId(submission_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_queue_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    Query(params): Query<QueueParams>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match state.queue.pending(params.limit) {
        Ok(items) => {
            let payload = json!({
                "count": items.len(),
                "items": items,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    Path(submission_id): Path<String>,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    review(&state, submission_id, TerminalAction::Accept, body.notes)
}

pub(crate) async fn reject_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    Path(submission_id): Path<String>,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    review(&state, submission_id, TerminalAction::Reject, body.notes)
}

fn review<S, N>(
    state: &ModerationState<S, N>,
    submission_id: String,
    action: TerminalAction,
    notes: String,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let id = SubmissionId(submission_id);
    let result = match action {
        TerminalAction::Accept => state.queue.approve(&id, &notes),
        TerminalAction::Reject => state.queue.reject(&id, &notes),
    };

    match result {
        Ok(event) => {
            let (status, code) = match event.outcome {
                ReviewOutcome::Applied => (StatusCode::OK, ResultCode::Success),
                ReviewOutcome::AlreadyTerminal => {
                    (StatusCode::CONFLICT, ResultCode::AlreadyTerminal)
                }
            };
            let payload = json!({
                "code": code.label(),
                "submission_id": event.submission_id,
                "action": event.action.label(),
                "status": event.status.label(),
            });
            (status, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn purge_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    match state.queue.purge_all() {
        Ok(purged) => {
            let payload = json!({
                "code": ResultCode::Success.label(),
                "purged": purged,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn settings_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let settings = state.pipeline.settings().snapshot();
    (StatusCode::OK, axum::Json(settings)).into_response()
}

pub(crate) async fn update_settings_handler<S, N>(
    State(state): State<Arc<ModerationState<S, N>>>,
    axum::Json(settings): axum::Json<ModerationSettings>,
) -> Response
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let applied = state.pipeline.settings().replace(settings);
    (StatusCode::OK, axum::Json(applied)).into_response()
}

fn idempotency_key(headers: &HeaderMap) -> Option<IdempotencyKey> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| IdempotencyKey(value.to_string()))
}

fn error_response(error: PipelineError) -> Response {
    let code = error.code();
    let status = match code {
        ResultCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        ResultCode::NotFound => StatusCode::NOT_FOUND,
        ResultCode::AlreadyTerminal => StatusCode::CONFLICT,
        ResultCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ResultCode::Success => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if let PipelineError::Payment(err) = &error {
        warn!(error = %err, "charge not completed");
    }
    let payload = json!({
        "code": code.label(),
        "error": error.public_message(),
    });
    (status, axum::Json(payload)).into_response()
}
