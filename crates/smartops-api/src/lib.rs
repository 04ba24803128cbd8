//! smartops-api — REST API for SmartOps.
//!
//! Thin axum handlers over [`Lifecycle`]. Deploy and dry-run requests
//! only enqueue a task and answer `202 Accepted`; progress is read back
//! through the status endpoint.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/apps` | List apps |
//! | POST | `/api/v1/apps` | Create an app |
//! | GET | `/api/v1/apps/{id}` | Get an app with its status |
//! | PATCH | `/api/v1/apps/{id}` | Rename, select entrypoint, set test plan |
//! | DELETE | `/api/v1/apps/{id}` | Delete an app and everything it owns |
//! | GET | `/api/v1/apps/{id}/status` | Current status |
//! | POST | `/api/v1/apps/{id}/status/reset` | Operator reset |
//! | GET, PUT | `/api/v1/apps/{id}/sla` | Read or post the SLA |
//! | GET, PUT | `/api/v1/apps/{id}/blueprint` | Read or upload the blueprint |
//! | GET | `/api/v1/apps/{id}/blueprint/raw` | Blueprint as uploaded |
//! | GET | `/api/v1/apps/{id}/plan` | Base capacity plan |
//! | POST | `/api/v1/apps/{id}/deploy` | Queue a deploy |
//! | POST | `/api/v1/apps/{id}/dryrun` | Queue a capacity planner run |
//! | GET, POST | `/api/v1/apps/{id}/capacity-plans` | List or record capacity plans |
//! | GET | `/api/v1/capacity-plans/{id}` | Get one capacity plan |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use smartops_lifecycle::{Lifecycle, TaskQueue};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: Lifecycle,
    pub queue: Arc<dyn TaskQueue>,
}

/// Build the complete API router.
pub fn build_router(lifecycle: Lifecycle, queue: Arc<dyn TaskQueue>) -> Router {
    let state = ApiState { lifecycle, queue };

    let api_routes = Router::new()
        .route("/apps", get(handlers::list_apps).post(handlers::create_app))
        .route(
            "/apps/{id}",
            get(handlers::get_app)
                .patch(handlers::update_app)
                .delete(handlers::delete_app),
        )
        .route("/apps/{id}/status", get(handlers::get_status))
        .route("/apps/{id}/status/reset", post(handlers::reset_status))
        .route("/apps/{id}/sla", get(handlers::get_sla).put(handlers::put_sla))
        .route(
            "/apps/{id}/blueprint",
            get(handlers::get_blueprint).put(handlers::put_blueprint),
        )
        .route("/apps/{id}/blueprint/raw", get(handlers::get_raw_blueprint))
        .route("/apps/{id}/plan", get(handlers::get_base_plan))
        .route("/apps/{id}/deploy", post(handlers::deploy_app))
        .route("/apps/{id}/dryrun", post(handlers::dry_run))
        .route(
            "/apps/{id}/capacity-plans",
            get(handlers::list_capacity_plans).post(handlers::record_capacity_plan),
        )
        .route("/capacity-plans/{id}", get(handlers::get_capacity_plan))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
