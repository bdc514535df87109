use crate::app::AppContext;
use crate::snapshot::Gauges;
use crate::ticket::{SubmitError, TicketOutcome, TicketRequest};
use crate::update::{UpdateError, UpdateState};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct HttpAppState {
    pub ctx: Arc<AppContext>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateStatus {
    current_version: String,
    #[serde(flatten)]
    state: UpdateState,
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/gauges", get(gauges_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/ticket", post(ticket_handler))
        .route("/api/update", get(update_status_handler))
        .route("/api/update/check", post(update_check_handler))
        .route("/api/update/download", post(update_download_handler))
        .route("/api/update/install", post(update_install_handler))
        .route("/api/remote-support", post(remote_support_handler))
        .with_state(HttpAppState { ctx })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    let metrics = &state.ctx.metrics;
    metrics.inc_scrape_count();
    match metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn snapshot_handler(State(state): State<HttpAppState>) -> Response {
    let latest = state.ctx.latest().await;
    let status = if latest.snapshot.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(latest)).into_response()
}

async fn gauges_handler(State(state): State<HttpAppState>) -> Response {
    let latest = state.ctx.latest().await;
    match latest.snapshot {
        Some(snapshot) => Json(Gauges::from_snapshot(&snapshot)).into_response(),
        None => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            latest
                .error
                .unwrap_or_else(|| "no snapshot collected yet".to_string()),
        ),
    }
}

async fn refresh_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    state.ctx.request_refresh();
    StatusCode::ACCEPTED
}

async fn ticket_handler(
    State(state): State<HttpAppState>,
    Json(request): Json<TicketRequest>,
) -> Response {
    let result = state.ctx.tickets.submit(&request).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(SubmitError::Invalid(_)) => StatusCode::BAD_REQUEST,
        Err(SubmitError::Collection(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Err(SubmitError::Delivery(_)) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(TicketOutcome::from(result))).into_response()
}

fn update_status(ctx: &AppContext) -> UpdateStatus {
    UpdateStatus {
        current_version: ctx.updates.current_version().to_string(),
        state: ctx.updates.state(),
    }
}

fn update_error(err: UpdateError) -> Response {
    let status = match err {
        UpdateError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        UpdateError::InvalidTransition { .. }
        | UpdateError::NoUpdateAvailable
        | UpdateError::NotDownloaded => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    api_error(status, err.to_string())
}

async fn update_status_handler(State(state): State<HttpAppState>) -> Response {
    Json(update_status(&state.ctx)).into_response()
}

async fn update_check_handler(State(state): State<HttpAppState>) -> Response {
    match state.ctx.updates.check().await {
        Ok(_) => Json(update_status(&state.ctx)).into_response(),
        Err(err) => update_error(err),
    }
}

async fn update_download_handler(State(state): State<HttpAppState>) -> Response {
    if !matches!(state.ctx.updates.state(), UpdateState::Available { .. }) {
        return update_error(UpdateError::NoUpdateAvailable);
    }
    let updates = state.ctx.updates.clone();
    tokio::spawn(async move {
        if let Err(err) = updates.download_and_install().await {
            warn!(error = %err, "update download failed");
        }
    });
    (StatusCode::ACCEPTED, Json(update_status(&state.ctx))).into_response()
}

async fn update_install_handler(State(state): State<HttpAppState>) -> Response {
    if !matches!(state.ctx.updates.state(), UpdateState::Downloaded { .. }) {
        return update_error(UpdateError::NotDownloaded);
    }
    let updates = state.ctx.updates.clone();
    tokio::spawn(async move {
        if let Err(err) = updates.install().await {
            warn!(error = %err, "update install failed");
        }
    });
    (StatusCode::ACCEPTED, Json(update_status(&state.ctx))).into_response()
}

async fn remote_support_handler(State(state): State<HttpAppState>) -> Response {
    match state.ctx.remote.launch().await {
        Ok(launch) => Json(launch).into_response(),
        Err(err) => {
            warn!(error = %err, "remote support launch failed");
            api_error(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_context;
    use crate::normalize::{normalize, tests::blank_probes};
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = build_router(test_context());
        let (status, body) = call(app, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn metrics_exposes_desk_series() {
        let ctx = test_context();
        ctx.metrics.observe_snapshot(&normalize(&blank_probes()));
        let (status, body) = call(build_router(ctx), "GET", "/metrics", None).await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("desk_memory_usage_percent"));
        assert!(text.contains("desk_scrape_count_total"));
    }

    #[tokio::test]
    async fn snapshot_and_gauges_wait_for_first_poll() {
        let ctx = test_context();
        let (status, _) = call(build_router(ctx.clone()), "GET", "/api/snapshot", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = call(build_router(ctx.clone()), "GET", "/api/gauges", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(&body)["error"], "no snapshot collected yet");

        let snapshot = ctx.collector.collect().await.unwrap();
        ctx.store(Ok(snapshot)).await;

        let (status, body) = call(build_router(ctx.clone()), "GET", "/api/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["snapshot"]["hostname"], "desk-01");

        let (status, body) = call(build_router(ctx), "GET", "/api/gauges", None).await;
        assert_eq!(status, StatusCode::OK);
        let gauges = json(&body);
        for bar in ["disk", "memory", "cpu"] {
            assert!(gauges[bar]["severity"].is_string(), "{bar}");
        }
    }

    #[tokio::test]
    async fn refresh_is_accepted() {
        let (status, _) = call(build_router(test_context()), "POST", "/api/refresh", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn ticket_reports_validation_and_success() {
        let ctx = test_context();
        let (status, body) = call(
            build_router(ctx.clone()),
            "POST",
            "/api/ticket",
            Some(r#"{"fullName":"","email":"x@y.z"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let outcome = json(&body);
        assert_eq!(outcome["success"], false);
        assert_eq!(outcome["error"], "Please enter your full name");

        let (status, body) = call(
            build_router(ctx),
            "POST",
            "/api/ticket",
            Some(r#"{"fullName":"Sipho Dlamini","email":"sipho@example.com","phone":"0825551234","description":"VPN drops"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let outcome = json(&body);
        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["messageId"], "<ticket-1@desk.example>");
    }

    #[tokio::test]
    async fn update_endpoints_follow_lifecycle() {
        let ctx = test_context();
        let (status, body) = call(build_router(ctx.clone()), "GET", "/api/update", None).await;
        assert_eq!(status, StatusCode::OK);
        let state = json(&body);
        assert_eq!(state["state"], "idle");
        assert_eq!(state["currentVersion"], env!("CARGO_PKG_VERSION"));

        let (status, _) = call(build_router(ctx.clone()), "POST", "/api/update/check", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, _) = call(build_router(ctx.clone()), "POST", "/api/update/download", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = call(build_router(ctx), "POST", "/api/update/install", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
