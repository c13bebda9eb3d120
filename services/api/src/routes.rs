use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use offerdesk::workflows::moderation::{
    moderation_router, ModerationState, NotificationDispatcher, SubmissionStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_moderation_routes<S, N>(state: Arc<ModerationState<S, N>>) -> axum::Router
where
    S: SubmissionStore + 'static,
    N: NotificationDispatcher + 'static,
{
    moderation_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_pipeline;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use offerdesk::config::ModerationConfig;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn moderation_config() -> ModerationConfig {
        ModerationConfig {
            confidence_threshold: 80,
            auto_approve_free: true,
            auto_approve_paid: true,
            automation_enabled: true,
            lookback_hours: 24,
            similarity_threshold: 95.0,
            oracle_timeout_ms: 5_000,
        }
    }

    fn app(ready: bool) -> axum::Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let moderation = Arc::new(ModerationState::new(build_pipeline(&moderation_config())));
        with_moderation_routes(moderation).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
        app.oneshot(
            axum::http::Request::get(uri)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes")
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        assert_eq!(get(app(false), "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(app(true), "/ready").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_and_moderation_routes_share_one_router() {
        let app = app(true);
        assert_eq!(get(app.clone(), "/health").await.status(), StatusCode::OK);
        assert_eq!(
            get(app.clone(), "/api/v1/admin/review-queue").await.status(),
            StatusCode::OK
        );
        assert_eq!(
            get(app, "/api/v1/submissions/req-missing").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
