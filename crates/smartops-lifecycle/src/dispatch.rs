//! Deployment requests and the worker-side status reports.
//!
//! A request persists its task and moves the app to `LAUNCHING` or
//! `PLANNING` in one transaction, handing the task to the queue before
//! committing. If the queue refuses the task, nothing is written.

use serde::{Deserialize, Serialize};
use smartops_state::{
    App, AppId, AppState, AppStatus, Blueprint, Status, TaskRecord, WriteTxn, epoch_secs,
};
use tracing::{info, warn};

use crate::Lifecycle;
use crate::blueprint::missing_blueprint;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::{self, Transition};
use crate::task::{DeployArgs, TaskKind, TaskQueue, TaskReceipt};

/// What a full deploy managed to create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchOutcome {
    /// Names of created resources.
    pub created: Vec<String>,
    /// Names of resources the cluster refused.
    pub failed: Vec<String>,
}

impl LaunchOutcome {
    fn transition(&self) -> Transition {
        if self.failed.is_empty() {
            Transition::info(AppState::Launched, "Application launched")
        } else if self.created.is_empty() {
            Transition::error(
                AppState::Launched,
                format!("Failed to create every resource: {}", self.failed.join(", ")),
            )
        } else {
            Transition::warning(
                AppState::Launched,
                format!(
                    "Launched with {} failed resource(s): {}",
                    self.failed.len(),
                    self.failed.join(", ")
                ),
            )
        }
    }
}

/// Build, persist and hand off a task for `app_id`, then apply `transition`.
fn enqueue(
    txn: &mut WriteTxn,
    queue: &dyn TaskQueue,
    app_id: AppId,
    kind: TaskKind,
    transition: Transition,
) -> LifecycleResult<TaskRecord> {
    let app: App = txn.require(app_id)?;
    let status: AppStatus = txn.require(app_id)?;
    machine::ensure_editable(&app.name, &status.status)?;

    let blueprint_id = app.blueprint_id.ok_or_else(|| missing_blueprint(app_id))?;
    let blueprint: Blueprint = txn.require(blueprint_id)?;

    let args = DeployArgs {
        app_id,
        entrypoint: app.entrypoint,
        blueprint: blueprint.content,
        test_plan: app.test_plan,
    };
    let record = TaskRecord {
        id: txn.next_id::<TaskRecord>()?,
        name: kind.as_str().to_string(),
        args: args.to_value(),
        enqueued_at: epoch_secs(),
    };
    txn.put(&record)?;
    machine::transition(txn, app_id, transition)?;

    queue.send(&record)?;
    Ok(record)
}

impl Lifecycle {
    /// Queue a full deploy of the app's blueprint.
    pub fn request_deploy(&self, app_id: AppId, queue: &dyn TaskQueue) -> LifecycleResult<TaskReceipt> {
        let record = self.store.write(|txn| {
            enqueue(
                txn,
                queue,
                app_id,
                TaskKind::DeployApp,
                Transition::info(AppState::Launching, "Deployment task sent"),
            )
        })?;

        info!(app_id, task_id = record.id, "sending deploy app task");
        Ok(TaskReceipt {
            message: "Deployment task sent.".to_string(),
            app_id,
            task_id: record.id,
        })
    }

    /// Queue a capacity planner run for the app.
    pub fn request_dry_run(&self, app_id: AppId, queue: &dyn TaskQueue) -> LifecycleResult<TaskReceipt> {
        let record = self.store.write(|txn| {
            enqueue(
                txn,
                queue,
                app_id,
                TaskKind::DeployCapacityPlanner,
                Transition::info(AppState::Planning, "Probing best capacity plans"),
            )
        })?;

        info!(app_id, task_id = record.id, "sending deploy capacity planner task");
        Ok(TaskReceipt {
            message: "Capacity Planner deployment task sent.".to_string(),
            app_id,
            task_id: record.id,
        })
    }

    /// Operator action: leave any state, including `ERROR`, for `CREATING_STEP_0`.
    pub fn reset_status(&self, app_id: AppId) -> LifecycleResult<Status> {
        let status = self.store.write(|txn| {
            let mut record: AppStatus = txn.require(app_id)?;
            let from = record.status.state;
            record.status = machine::reset();
            txn.put(&record)?;
            info!(app_id, %from, "status reset");
            Ok::<_, LifecycleError>(record.status)
        })?;
        Ok(status)
    }

    /// Record the result of a full deploy.
    pub fn mark_launched(&self, app_id: AppId, outcome: &LaunchOutcome) -> LifecycleResult<Status> {
        let transition = outcome.transition();
        if !outcome.failed.is_empty() {
            warn!(app_id, failed = ?outcome.failed, "deploy finished with failures");
        }
        self.store
            .write(|txn| machine::transition(txn, app_id, transition))
    }

    /// Record a failed deployment action.
    pub fn mark_error(&self, app_id: AppId, message: &str) -> LifecycleResult<Status> {
        self.store.write(|txn| {
            machine::transition(txn, app_id, Transition::error(AppState::Error, message))
        })
    }
}
