//! REST API handlers.
//!
//! Each handler calls into [`Lifecycle`](smartops_lifecycle::Lifecycle)
//! and maps the result onto a JSON response.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartops_lifecycle::{AppUpdate, LifecycleError, LifecycleResult, NewCapacityPlan};
use smartops_state::{AppId, CapacityPlanId};
use tracing::{error, info};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

/// HTTP status for a handler error.
pub fn error_status(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Blueprint(_) => StatusCode::NOT_ACCEPTABLE,
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::NotEditable(_) | LifecycleError::Absorbed(_) => StatusCode::FORBIDDEN,
        LifecycleError::Duplicate(_) => StatusCode::CONFLICT,
        LifecycleError::State(_) | LifecycleError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: LifecycleResult<T>, status: StatusCode) -> Response {
    match result {
        Ok(data) => (status, ApiResponse::ok(data)).into_response(),
        Err(e) => {
            let code = error_status(&e);
            if code.is_server_error() {
                error!(error = %e, "request failed");
            }
            error_response(&e.to_string(), code)
        }
    }
}

// ── Apps ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
}

/// GET /api/v1/apps
pub async fn list_apps(State(state): State<ApiState>) -> Response {
    respond(state.lifecycle.list_apps(), StatusCode::OK)
}

/// POST /api/v1/apps
pub async fn create_app(
    State(state): State<ApiState>,
    Json(req): Json<CreateAppRequest>,
) -> Response {
    respond(state.lifecycle.create_app(&req.name), StatusCode::CREATED)
}

/// GET /api/v1/apps/:id
pub async fn get_app(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.get_app(id), StatusCode::OK)
}

/// PATCH /api/v1/apps/:id
pub async fn update_app(
    State(state): State<ApiState>,
    Path(id): Path<AppId>,
    Json(update): Json<AppUpdate>,
) -> Response {
    respond(state.lifecycle.update_app(id, update), StatusCode::OK)
}

/// DELETE /api/v1/apps/:id
pub async fn delete_app(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.delete_app(id).map(|_| "deleted"), StatusCode::OK)
}

// ── Status ─────────────────────────────────────────────────────

/// GET /api/v1/apps/:id/status
pub async fn get_status(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.get_status(id), StatusCode::OK)
}

/// POST /api/v1/apps/:id/status/reset
pub async fn reset_status(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.reset_status(id), StatusCode::OK)
}

// ── SLA ────────────────────────────────────────────────────────

/// GET /api/v1/apps/:id/sla
pub async fn get_sla(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.get_sla(id), StatusCode::OK)
}

/// PUT /api/v1/apps/:id/sla
pub async fn put_sla(
    State(state): State<ApiState>,
    Path(id): Path<AppId>,
    Json(req): Json<Value>,
) -> Response {
    respond(state.lifecycle.upsert_sla(id, &req), StatusCode::OK)
}

// ── Blueprint ──────────────────────────────────────────────────

/// GET /api/v1/apps/:id/blueprint
pub async fn get_blueprint(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.get_blueprint(id), StatusCode::OK)
}

/// PUT /api/v1/apps/:id/blueprint
///
/// The body is the manifest text itself.
pub async fn put_blueprint(
    State(state): State<ApiState>,
    Path(id): Path<AppId>,
    body: String,
) -> Response {
    respond(
        state.lifecycle.validate_and_upsert_blueprint(id, &body),
        StatusCode::OK,
    )
}

/// GET /api/v1/apps/:id/blueprint/raw
pub async fn get_raw_blueprint(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    match state.lifecycle.get_raw_blueprint(id) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => error_response(&e.to_string(), error_status(&e)),
    }
}

/// GET /api/v1/apps/:id/plan
pub async fn get_base_plan(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.dry_run_base_plan(id), StatusCode::OK)
}

// ── Dispatch ───────────────────────────────────────────────────

/// POST /api/v1/apps/:id/deploy
pub async fn deploy_app(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    let result = state.lifecycle.request_deploy(id, state.queue.as_ref());
    if let Ok(receipt) = &result {
        info!(app_id = id, task_id = receipt.task_id, "deploy accepted");
    }
    respond(result, StatusCode::ACCEPTED)
}

/// POST /api/v1/apps/:id/dryrun
pub async fn dry_run(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    let result = state.lifecycle.request_dry_run(id, state.queue.as_ref());
    if let Ok(receipt) = &result {
        info!(app_id = id, task_id = receipt.task_id, "dry run accepted");
    }
    respond(result, StatusCode::ACCEPTED)
}

// ── Capacity plans ─────────────────────────────────────────────

/// GET /api/v1/apps/:id/capacity-plans
pub async fn list_capacity_plans(State(state): State<ApiState>, Path(id): Path<AppId>) -> Response {
    respond(state.lifecycle.list_capacity_plans(id), StatusCode::OK)
}

/// POST /api/v1/apps/:id/capacity-plans
pub async fn record_capacity_plan(
    State(state): State<ApiState>,
    Path(id): Path<AppId>,
    Json(plan): Json<NewCapacityPlan>,
) -> Response {
    respond(state.lifecycle.record_capacity_plan(id, plan), StatusCode::CREATED)
}

/// GET /api/v1/capacity-plans/:id
pub async fn get_capacity_plan(
    State(state): State<ApiState>,
    Path(id): Path<CapacityPlanId>,
) -> Response {
    respond(state.lifecycle.get_capacity_plan(id), StatusCode::OK)
}
