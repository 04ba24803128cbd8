//! smartops-deploy — the asynchronous half of SmartOps.
//!
//! Request handlers hand tasks to a [`LocalTaskQueue`]; a [`WorkerPool`]
//! picks them up, takes the app's [`SerializedActionLock`] and runs the
//! matching [`DeployActions`] against the cluster through the
//! [`DeploymentOrchestrator`]. Results land in the app status.

pub mod actions;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod planner;
pub mod queue;
pub mod worker;

pub use actions::{ActionOutcome, DeployActions};
pub use error::{DeployError, DeployResult, LockError};
pub use lock::{ActionLockGuard, LockConfig, SerializedActionLock};
pub use orchestrator::{
    DeployReport, DeploymentOrchestrator, ResourceSummary, app_namespace, resource_name,
};
pub use planner::{CapacityPlannerConfig, planner_document, planner_name};
pub use queue::{LocalTaskQueue, TaskReceiver};
pub use worker::{DEFAULT_WORKERS, WorkerPool};
