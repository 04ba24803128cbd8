//! Deployment tasks handed from the request path to the worker pool.
//!
//! A task is a name plus a positional argument array
//! `[app_id, entrypoint, blueprint, test_plan]`. Handlers persist the
//! [`TaskRecord`] in the same transaction as the status transition that
//! accompanies it, then pass it to a [`TaskQueue`] for delivery.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smartops_blueprint::ResourceDocument;
use smartops_state::{AppId, TaskId, TaskRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("malformed task arguments: {0}")]
    MalformedArgs(String),
}

/// Delivery channel between the request path and the workers.
pub trait TaskQueue: Send + Sync {
    /// Hand an already-persisted task to the workers.
    fn send(&self, task: &TaskRecord) -> Result<(), QueueError>;
}

/// The registered task names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    DeployApp,
    DeployCapacityPlanner,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::DeployApp => "smartops.tasks.deploy_app",
            TaskKind::DeployCapacityPlanner => "smartops.tasks.deploy_capacity_planner",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, QueueError> {
        match name {
            "smartops.tasks.deploy_app" => Ok(TaskKind::DeployApp),
            "smartops.tasks.deploy_capacity_planner" => Ok(TaskKind::DeployCapacityPlanner),
            other => Err(QueueError::UnknownTask(other.to_string())),
        }
    }
}

/// Arguments shared by both deployment tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployArgs {
    pub app_id: AppId,
    pub entrypoint: Option<String>,
    pub blueprint: Vec<ResourceDocument>,
    pub test_plan: Map<String, Value>,
}

type DeployTuple = (AppId, Option<String>, Vec<ResourceDocument>, Map<String, Value>);

impl DeployArgs {
    /// Positional wire form.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::from(self.app_id),
            self.entrypoint.clone().map_or(Value::Null, Value::String),
            Value::Array(self.blueprint.iter().map(ResourceDocument::to_value).collect()),
            Value::Object(self.test_plan.clone()),
        ])
    }

    pub fn from_value(args: &Value) -> Result<Self, QueueError> {
        let (app_id, entrypoint, blueprint, test_plan): DeployTuple =
            serde_json::from_value(args.clone())
                .map_err(|e| QueueError::MalformedArgs(e.to_string()))?;
        Ok(Self {
            app_id,
            entrypoint,
            blueprint,
            test_plan,
        })
    }
}

/// A decoded task ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub args: DeployArgs,
}

impl TryFrom<&TaskRecord> for Task {
    type Error = QueueError;

    fn try_from(record: &TaskRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            kind: TaskKind::from_name(&record.name)?,
            args: DeployArgs::from_value(&record.args)?,
        })
    }
}

/// Returned to the caller once a task has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub message: String,
    pub app_id: AppId,
    pub task_id: TaskId,
}
