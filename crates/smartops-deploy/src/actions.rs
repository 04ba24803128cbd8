//! The deploy actions a worker runs for each task.
//!
//! Every action takes the app's serialized action lock first. If the lock
//! is held the action is abandoned without touching the cluster or the
//! store. Failures after that point end up in the app status; they are
//! never handed back to the queue, so a task is never retried.

use smartops_lifecycle::{DeployArgs, Lifecycle, Task, TaskKind};
use smartops_state::AppId;
use tracing::{error, info, warn};

use crate::error::LockError;
use crate::lock::{ActionLockGuard, SerializedActionLock};
use crate::orchestrator::{DeploymentOrchestrator, app_namespace};
use crate::planner::{CapacityPlannerConfig, planner_document, planner_name};

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// The app status was moved to `ERROR` with this message.
    Failed(String),
    /// The lock was held elsewhere; nothing was done.
    Abandoned,
}

#[derive(Clone)]
pub struct DeployActions {
    lifecycle: Lifecycle,
    orchestrator: DeploymentOrchestrator,
    lock: SerializedActionLock,
    planner: CapacityPlannerConfig,
}

impl DeployActions {
    pub fn new(
        lifecycle: Lifecycle,
        orchestrator: DeploymentOrchestrator,
        lock: SerializedActionLock,
        planner: CapacityPlannerConfig,
    ) -> Self {
        Self {
            lifecycle,
            orchestrator,
            lock,
            planner,
        }
    }

    pub async fn run(&self, task: &Task) -> ActionOutcome {
        let app_id = task.args.app_id;
        let Some(guard) = self.lock(app_id, task.kind).await else {
            return ActionOutcome::Abandoned;
        };

        let outcome = match task.kind {
            TaskKind::DeployApp => self.deploy_app(&task.args).await,
            TaskKind::DeployCapacityPlanner => self.deploy_capacity_planner(&task.args).await,
        };

        if let Err(e) = guard.release().await {
            warn!(app_id, error = %e, "failed to release lock");
        }
        outcome
    }

    async fn lock(&self, app_id: AppId, kind: TaskKind) -> Option<ActionLockGuard> {
        match self.lock.acquire(app_id).await {
            Ok(guard) => Some(guard),
            Err(LockError::Unavailable { name, .. }) => {
                info!(app_id, task = kind.as_str(), lock = %name, "action already in progress, abandoning");
                None
            }
            Err(e) => {
                error!(app_id, task = kind.as_str(), error = %e, "cannot take action lock, abandoning");
                None
            }
        }
    }

    async fn deploy_app(&self, args: &DeployArgs) -> ActionOutcome {
        let app_id = args.app_id;
        info!(app_id, documents = args.blueprint.len(), "deploying application");

        match self.orchestrator.deploy_blueprint(app_id, &args.blueprint).await {
            Ok(report) => {
                let outcome = report.outcome();
                match self.lifecycle.mark_launched(app_id, &outcome) {
                    Ok(status) => {
                        info!(app_id, state = %status.state, severity = ?status.severity, "deploy finished");
                        ActionOutcome::Completed
                    }
                    Err(e) => self.fail(app_id, format!("Failed to record deployment result: {e}")),
                }
            }
            Err(e) => self.fail(app_id, format!("Failed to deploy application: {e}")),
        }
    }

    async fn deploy_capacity_planner(&self, args: &DeployArgs) -> ActionOutcome {
        let app_id = args.app_id;
        let name = planner_name(app_id);
        let namespace = app_namespace(app_id);
        info!(app_id, %name, %namespace, "deploying capacity planner");

        let document = match planner_document(&self.planner, args) {
            Ok(document) => document,
            Err(e) => return self.fail(app_id, format!("Failed to deploy capacity planner: {e}")),
        };

        match self.orchestrator.deploy_pod(&document, &name, &namespace).await {
            Ok(resource) => match resource.result {
                // The planner moves the app on by posting a capacity plan.
                Ok(_) => ActionOutcome::Completed,
                Err(e) => self.fail(app_id, format!("Failed to deploy capacity planner: {e}")),
            },
            Err(e) => self.fail(app_id, format!("Failed to deploy capacity planner: {e}")),
        }
    }

    fn fail(&self, app_id: AppId, message: String) -> ActionOutcome {
        error!(app_id, %message, "deploy action failed");
        if let Err(e) = self.lifecycle.mark_error(app_id, &message) {
            warn!(app_id, error = %e, "could not record failure");
        }
        ActionOutcome::Failed(message)
    }
}
